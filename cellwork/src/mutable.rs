use std::{cell::RefCell, rc::Weak};

use cellwork_core::{next_node_id, CellKey, CellResult, Node, NodeId, ObserverList, Observer};

use crate::cell::{Cell, CellInner};

/// The writable leaf. Unlike computed/peek/wait
/// cells, a mutable cell is never itself an [`Observer`] -- it originates
/// writes, it does not react to anything.
struct MutableNode<T> {
    id: NodeId,
    key: CellKey,
    value: RefCell<T>,
    observers: ObserverList,
}

impl<T: Clone> CellInner<T> for MutableNode<T> {
    fn read(&self) -> CellResult<T> {
        Ok(self.value.borrow().clone())
    }
}

impl<T> Node for MutableNode<T> {
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

impl<T: Clone + PartialEq> MutableNode<T> {
    fn set(&self, v: T) {
        if *self.value.borrow() == v {
            return;
        }
        self.observers.notify_will_update(self.id);
        *self.value.borrow_mut() = v;
        cellwork_core::propagation::drain_unless_batched();
    }
}

/// A writable cell. `Mutable<T>` is a thin handle around the
/// underlying node plus a [`Cell<T>`] view for passing into compute
/// functions.
pub struct Mutable<T> {
    cell: Cell<T>,
    node: std::rc::Rc<MutableNode<T>>,
}

impl<T> Clone for Mutable<T> {
    fn clone(&self) -> Self {
        Mutable {
            cell: self.cell.clone(),
            node: self.node.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Mutable<T> {
    /// Writes a new value. A no-op if `v` equals the current
    /// value under `PartialEq`.
    pub fn set(&self, v: T) {
        self.node.set(v);
    }

    /// Reads the current value, registering a dependency if called from
    /// inside a compute/watch frame.
    pub fn value(&self) -> CellResult<T> {
        self.cell.value()
    }

    /// Synonym for [`Mutable::value`] for use inside a compute function.
    pub fn call(&self) -> CellResult<T> {
        self.cell.call()
    }

    /// Borrows this mutable cell as a plain [`Cell<T>`] handle, for passing
    /// into APIs (like `computed`) that are agnostic to the concrete cell
    /// variant.
    pub fn cell(&self) -> Cell<T> {
        self.cell.clone()
    }
}

/// Creates a writable cell seeded with `v`.
pub fn mutable<T: Clone + PartialEq + 'static>(v: T) -> Mutable<T> {
    let node = std::rc::Rc::new(MutableNode {
        id: next_node_id(),
        key: CellKey::fresh_identity(),
        value: RefCell::new(v),
        observers: ObserverList::new(),
    });
    let cell = Cell::from_concrete(node.clone());
    Mutable { cell, node }
}
