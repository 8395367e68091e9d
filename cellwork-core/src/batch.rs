use std::cell::Cell;

/// The batch coordinator: while a batch is active, `will_update`
/// announcements still fire immediately (so staleness propagates through
/// the graph right away), but resolution -- the stale-queue sweep in
/// `crate::propagation` that actually recomputes things and fires watch
/// callbacks -- is suppressed until the outermost batch scope exits. Because every node enqueues itself in the stale queue at most
/// once per wave regardless of how many of its dependencies wrote during
/// the batch, this gives "exactly one resolution per observer" for free.
thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Runs `f` inside a batch scope. Nested calls are no-ops except for the
/// outermost one, which runs the stale-queue sweep on exit.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let is_outermost = DEPTH.with(|d| {
        d.set(d.get() + 1);
        d.get() == 1
    });
    let result = f();
    DEPTH.with(|d| d.set(d.get() - 1));
    if is_outermost {
        crate::propagation::run_sweep();
    }
    result
}

/// RAII alternative to [`batch`] for callers that can't structure their
/// writes as a single closure.
#[must_use = "dropping this immediately ends the batch scope"]
pub struct BatchGuard {
    _private: (),
}

impl BatchGuard {
    pub fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        Self { _private: () }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let is_outermost = DEPTH.with(|d| {
            d.set(d.get() - 1);
            d.get() == 0
        });
        if is_outermost {
            crate::propagation::run_sweep();
        }
    }
}

/// Whether a batch is currently active on this thread.
pub fn is_active() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        key::CellKey,
        node::{Node, NodeId, ObserverList},
        observer::Observer,
        propagation::{self, StaleTracker},
    };
    use std::{cell::RefCell, rc::{Rc, Weak}};

    struct Recorder {
        id: NodeId,
        key: CellKey,
        observers: ObserverList,
        tracker: StaleTracker,
        log: RefCell<Vec<bool>>,
        self_weak: RefCell<Weak<Recorder>>,
    }
    impl Node for Recorder {
        fn node_id(&self) -> NodeId {
            self.id
        }
        fn cell_key(&self) -> CellKey {
            self.key.clone()
        }
        fn add_observer(&self, id: NodeId, observer: Weak<dyn Observer>) {
            self.observers.add(id, observer);
        }
        fn remove_observer(&self, id: NodeId) {
            self.observers.remove(id);
        }
        fn is_active(&self) -> bool {
            !self.observers.is_empty()
        }
    }
    impl Observer for Recorder {
        fn will_update(&self, source: NodeId) {
            if self.tracker.mark() {
                let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
                propagation::enqueue_stale(self.id, weak);
                self.observers.notify_will_update(source);
            }
        }
        fn did_update(&self, _source: NodeId, changed: bool) {
            self.tracker.resolve();
            self.log.borrow_mut().push(changed);
        }
    }

    fn new_recorder(id: NodeId) -> Rc<Recorder> {
        Rc::new_cyclic(|weak| Recorder {
            id,
            key: CellKey::fresh_identity(),
            observers: ObserverList::new(),
            tracker: StaleTracker::new(),
            log: RefCell::new(Vec::new()),
            self_weak: RefCell::new(weak.clone()),
        })
    }

    #[test]
    fn batch_resolves_once_per_observer() {
        let rec = new_recorder(1);
        batch(|| {
            Observer::will_update(&*rec, 100);
            Observer::will_update(&*rec, 101);
            assert!(rec.log.borrow().is_empty(), "must defer until batch exits");
        });
        assert_eq!(*rec.log.borrow(), vec![true]);
    }

    #[test]
    fn nested_batches_resolve_only_on_outermost_exit() {
        let rec = new_recorder(2);
        batch(|| {
            batch(|| {
                Observer::will_update(&*rec, 200);
            });
            assert!(rec.log.borrow().is_empty());
        });
        assert_eq!(*rec.log.borrow(), vec![true]);
    }
}
