use std::{cell::RefCell, rc::Weak};

use crate::{key::CellKey, observer::Observer};

/// A dense, per-process-thread identifier used to deduplicate dependency
/// registrations and to remove a specific observer registration again.
///
/// Distinct from [`CellKey`](crate::key::CellKey): the node id is an
/// internal bookkeeping handle, the key is the user-visible, structurally
/// comparable identity.
pub type NodeId = u64;

pub fn next_node_id() -> NodeId {
    thread_local! {
        static COUNTER: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
    }
    COUNTER.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

/// Type-erased identity and observer-registration surface shared by every
/// cell variant (the common contract, minus value access which stays
/// generic over `T` and lives on each concrete cell type).
pub trait Node {
    fn node_id(&self) -> NodeId;
    fn cell_key(&self) -> CellKey;
    fn add_observer(&self, id: NodeId, observer: Weak<dyn Observer>);
    fn remove_observer(&self, id: NodeId);
    /// Whether this cell currently has at least one (possibly transitive,
    /// via a liveness-only peek) observer.
    fn is_active(&self) -> bool;

    /// Whether this node suppresses `changed=false` duplicates. Only
    /// computed cells ever report `true`; every other variant keeps the
    /// default.
    fn changes_only(&self) -> bool {
        false
    }
}

/// Bookkeeping shared by every concrete cell type that can have observers:
/// a flat list of `(NodeId, Weak<dyn Observer>)` pairs plus activation
/// callbacks fired on the 0->1 and 1->0 observer-count transitions.
#[derive(Default)]
pub struct ObserverList {
    entries: RefCell<Vec<(NodeId, Weak<dyn Observer>)>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers `observer` under `id`. Returns `true` if this was the
    /// first registration (i.e. the owner should run its activation hook).
    pub fn add(&self, id: NodeId, observer: Weak<dyn Observer>) -> bool {
        let mut entries = self.entries.borrow_mut();
        let was_empty = entries.is_empty();
        entries.retain(|(existing, _)| *existing != id);
        entries.push((id, observer));
        was_empty
    }

    /// Unregisters `id`. Returns `true` if the list is now empty (i.e. the
    /// owner should run its deactivation hook).
    pub fn remove(&self, id: NodeId) -> bool {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(existing, _)| *existing != id);
        entries.is_empty()
    }

    /// Calls `will_update(source)` on every live observer, in registration
    /// order. This is the whole of the mark phase: resolution
    /// (`did_update`) is driven separately, once per node, by the stale
    /// queue in `crate::propagation`.
    pub fn notify_will_update(&self, source: NodeId) {
        for observer in self.live_observers() {
            observer.will_update(source);
        }
    }

    fn live_observers(&self) -> Vec<std::rc::Rc<dyn Observer>> {
        let mut dead = Vec::new();
        let live: Vec<_> = {
            let entries = self.entries.borrow();
            entries
                .iter()
                .filter_map(|(id, weak)| match weak.upgrade() {
                    Some(strong) => Some(strong),
                    None => {
                        dead.push(*id);
                        None
                    }
                })
                .collect()
        };
        if !dead.is_empty() {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|(id, _)| !dead.contains(id));
        }
        live
    }
}
