use std::rc::Rc;

use cellwork_core::{CellKey, CellResult, Node, NodeId};

/// The uniform read surface every concrete cell variant's inner type
/// implements (constant, mutable, computed, peek, wait). Subscription
/// management lives on [`cellwork_core::Node`] instead.
pub trait CellInner<T> {
    /// Reads the current value. Dependency registration against the
    /// caller's tracking frame is handled once, uniformly, by
    /// [`Cell::value`] -- this only has to produce the value itself.
    fn read(&self) -> CellResult<T>;
}

/// A handle to any cell: constant, mutable, computed, peek or wait. This
/// is the crate's single public cell type.
///
/// `Cell<T>` is cheap to clone (an `Rc` pair) and every clone refers to the
/// same underlying node.
pub struct Cell<T> {
    inner: Rc<dyn CellInner<T>>,
    node: Rc<dyn Node>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Cell {
            inner: self.inner.clone(),
            node: self.node.clone(),
        }
    }
}

impl<T: Clone + 'static> Cell<T> {
    /// Wraps a concrete cell implementation. `concrete` must implement both
    /// [`CellInner<T>`] and [`Node`] (every cell variant in this crate
    /// does); the two trait objects stored here always point at the same
    /// allocation.
    pub(crate) fn from_concrete<C>(concrete: Rc<C>) -> Self
    where
        C: CellInner<T> + Node + 'static,
    {
        let inner: Rc<dyn CellInner<T>> = concrete.clone();
        let node: Rc<dyn Node> = concrete;
        Cell { inner, node }
    }

    pub(crate) fn node(&self) -> &Rc<dyn Node> {
        &self.node
    }

    /// Reads the current value without registering a dependency, even if
    /// called from inside a compute/watch frame. Used by peek and wait
    /// cells, which manage their own subscription to a
    /// target/source explicitly rather than through argument tracking.
    pub(crate) fn read_untracked(&self) -> CellResult<T> {
        self.inner.read()
    }

    /// The cell's identity: either the fixed identity assigned
    /// at construction, or, for operator-sugar cells, a structural key that
    /// makes repeated calls like `a + b` return the same cell.
    pub fn key(&self) -> CellKey {
        self.node.cell_key()
    }

    /// Reads the current value, registering this cell as a dependency of
    /// the innermost compute/watch frame if one is active.
    /// This is the method a compute function calls on its dependencies.
    pub fn value(&self) -> CellResult<T> {
        cellwork_core::tracking::record_dependency(self.node.node_id(), self.node.clone());
        self.inner.read()
    }

    /// Synonym for [`Cell::value`], for dependency reads made from inside
    /// a compute function.
    pub fn call(&self) -> CellResult<T> {
        self.value()
    }

    fn node_id(&self) -> NodeId {
        self.node.node_id()
    }
}
