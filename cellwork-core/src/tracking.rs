use std::{cell::RefCell, rc::Rc};

use crate::node::{Node, NodeId};

/// One level of the argument-tracking stack: a
/// set of `(node id, node handle)` pairs discovered while a compute
/// function (or a watch/effect callback) ran.
#[derive(Default)]
struct Frame {
    touched: RefCell<Vec<(NodeId, Rc<dyn Node>)>>,
}

thread_local! {
    static STACK: RefCell<Vec<Rc<Frame>>> = const { RefCell::new(Vec::new()) };
}

/// A reusable handle onto one tracking frame.
///
/// Plain synchronous compute functions never need this directly (see
/// [`track`]), but anything that suspends across an `.await` -- an
/// asynchronous compute function, or a wait cell polling its source's
/// awaitable -- must keep one `TrackingFrame` alive for the whole
/// computation and call [`TrackingFrame::enter`] around *each* poll, so
/// that dependencies discovered before and after a suspension point land
/// in the same set.
#[derive(Clone, Default)]
pub struct TrackingFrame(Rc<Frame>);

impl TrackingFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes this the innermost tracking frame for the duration of `f`.
    /// Reentrant-safe: nested `track`/`enter` calls push their own frame
    /// and dependencies recorded while they are innermost land there, not
    /// in this frame.
    pub fn enter<T>(&self, f: impl FnOnce() -> T) -> T {
        STACK.with(|s| s.borrow_mut().push(self.0.clone()));
        let result = f();
        STACK.with(|s| {
            let popped = s.borrow_mut().pop();
            debug_assert!(popped.is_some_and(|p| Rc::ptr_eq(&p, &self.0)));
        });
        result
    }

    /// Snapshot of the dependencies discovered so far in this frame, in
    /// first-touched order.
    pub fn touched(&self) -> Vec<(NodeId, Rc<dyn Node>)> {
        self.0.touched.borrow().clone()
    }
}

/// Runs `f` inside a fresh tracking frame and returns its result together
/// with the dependency set discovered while it ran. This is what a
/// [`Computed`](crate) cell (or a watch) calls each time it (re)computes.
pub fn track<T>(f: impl FnOnce() -> T) -> (T, Vec<(NodeId, Rc<dyn Node>)>) {
    let frame = TrackingFrame::new();
    let result = frame.enter(f);
    (result, frame.touched())
}

/// Records `node` as a dependency of the innermost tracking frame, if any.
/// A read performed outside of any frame (a "detached"/inactive read, or a
/// direct value access outside `call()`) does not register a dependency,
/// as soon as it reads them.
pub fn record_dependency(id: NodeId, node: Rc<dyn Node>) {
    STACK.with(|s| {
        if let Some(frame) = s.borrow().last() {
            let mut touched = frame.touched.borrow_mut();
            if !touched.iter().any(|(existing, _)| *existing == id) {
                touched.push((id, node));
            }
        }
    });
}

/// Whether a compute function is currently running on this thread. Used by
/// peek cells and others that want to behave differently when read inside
/// vs. outside dependency tracking.
pub fn is_tracking() -> bool {
    STACK.with(|s| !s.borrow().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{key::CellKey, node::ObserverList};
    use std::rc::Weak;

    struct Leaf {
        id: NodeId,
        key: CellKey,
        observers: ObserverList,
    }
    impl Node for Leaf {
        fn node_id(&self) -> NodeId {
            self.id
        }
        fn cell_key(&self) -> CellKey {
            self.key.clone()
        }
        fn add_observer(&self, id: NodeId, observer: Weak<dyn crate::observer::Observer>) {
            self.observers.add(id, observer);
        }
        fn remove_observer(&self, id: NodeId) {
            self.observers.remove(id);
        }
        fn is_active(&self) -> bool {
            !self.observers.is_empty()
        }
    }

    #[test]
    fn track_collects_deps_deduped() {
        let leaf = Rc::new(Leaf {
            id: 1,
            key: CellKey::fresh_identity(),
            observers: ObserverList::new(),
        });
        let (value, deps) = track(|| {
            record_dependency(leaf.node_id(), leaf.clone());
            record_dependency(leaf.node_id(), leaf.clone());
            42
        });
        assert_eq!(value, 42);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn reads_outside_track_do_not_register() {
        let leaf = Rc::new(Leaf {
            id: 2,
            key: CellKey::fresh_identity(),
            observers: ObserverList::new(),
        });
        assert!(!is_tracking());
        record_dependency(leaf.node_id(), leaf.clone());
        // No panic, no-op: nothing to assert on directly since there is no
        // outer frame, which is exactly the point.
    }

    #[test]
    fn frame_survives_reentry_across_suspension() {
        let leaf_a = Rc::new(Leaf {
            id: 3,
            key: CellKey::fresh_identity(),
            observers: ObserverList::new(),
        });
        let leaf_b = Rc::new(Leaf {
            id: 4,
            key: CellKey::fresh_identity(),
            observers: ObserverList::new(),
        });
        let frame = TrackingFrame::new();
        frame.enter(|| record_dependency(leaf_a.node_id(), leaf_a.clone()));
        // Simulate a suspension point: the frame is re-entered later.
        frame.enter(|| record_dependency(leaf_b.node_id(), leaf_b.clone()));
        assert_eq!(frame.touched().len(), 2);
    }
}
