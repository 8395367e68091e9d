use std::rc::Rc;

use cellwork_core::{next_node_id, CellKey, CellResult, Node, NodeId};

use crate::cell::{Cell, CellInner};

/// A constant cell. Its value is fixed at construction, so it treats
/// itself as always "active" in the trivial sense that reading one never
/// depends on subscriber count.
struct Constant<T> {
    id: NodeId,
    key: CellKey,
    value: T,
}

impl<T: Clone> CellInner<T> for Constant<T> {
    fn read(&self) -> CellResult<T> {
        Ok(self.value.clone())
    }
}

impl<T> Node for Constant<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn cell_key(&self) -> CellKey {
        self.key.clone()
    }

    fn add_observer(&self, _id: NodeId, _observer: std::rc::Weak<dyn cellwork_core::Observer>) {
        // A constant never changes, so there is nothing to notify; we still
        // accept (and silently drop) registrations so that a constant cell
        // can stand in anywhere a `Cell<T>` is expected.
    }

    fn remove_observer(&self, _id: NodeId) {}

    fn is_active(&self) -> bool {
        true
    }
}

/// Creates a constant cell holding `value`.
pub fn value<T: Clone + 'static>(value: T) -> Cell<T> {
    let concrete = Rc::new(Constant {
        id: next_node_id(),
        key: CellKey::fresh_identity(),
        value,
    });
    Cell::from_concrete(concrete)
}
