use std::rc::Weak;

use cellwork_core::{next_node_id, CellKey, CellResult, Node, NodeId, Observer, ObserverList};

use crate::cell::{Cell, CellInner};

/// Wraps a target cell, keeping it active without forwarding its
/// change notifications. A computed cell that reads a
/// value only via `.peek()` stays subscribed to the peek cell (which
/// never reports a change), so the target is kept alive but never wakes
/// the reader.
struct PeekNode<T> {
    id: NodeId,
    key: CellKey,
    target: Cell<T>,
    self_weak: std::cell::RefCell<Weak<PeekNode<T>>>,
    observers: ObserverList,
}

impl<T: Clone + 'static> CellInner<T> for PeekNode<T> {
    fn read(&self) -> CellResult<T> {
        // Delegates to the target's value but -- per `Cell::value` already
        // having recorded *this* node, not the target, as the caller's
        // dependency -- reads the target untracked so no second,
        // unwanted subscription is created against it directly.
        self.target.read_untracked()
    }
}

impl<T: 'static> Node for PeekNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn cell_key(&self) -> CellKey {
        self.key.clone()
    }

    fn add_observer(&self, id: NodeId, observer: Weak<dyn Observer>) {
        if self.observers.add(id, observer) {
            // 0->1 transition: install our own no-op observer on the
            // target so it stays active.
            let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
            self.target.node().add_observer(self.id, weak);
        }
    }

    fn remove_observer(&self, id: NodeId) {
        if self.observers.remove(id) {
            self.target.node().remove_observer(self.id);
        }
    }

    fn is_active(&self) -> bool {
        !self.observers.is_empty()
    }
}

impl<T> Observer for PeekNode<T> {
    fn will_update(&self, _source: NodeId) {
        // Deliberately does nothing: a peek cell never forwards upstream
        // announcements to its own observers. It is never enqueued into the stale queue
        // either, so `did_update` below is never actually reached.
    }

    fn did_update(&self, _source: NodeId, _changed: bool) {}
}

/// Wraps `target` in a peek cell: reading the
/// result yields `target`'s value, and keeps `target` active for as long
/// as the peek cell itself is observed, but never propagates `target`'s
/// changes onward.
pub fn peek<T: Clone + 'static>(target: &Cell<T>) -> Cell<T> {
    let node = std::rc::Rc::new_cyclic(|weak| PeekNode {
        id: next_node_id(),
        key: CellKey::structural("peek", vec![target.key()]),
        target: target.clone(),
        self_weak: std::cell::RefCell::new(weak.clone()),
        observers: ObserverList::new(),
    });
    Cell::from_concrete(node)
}
