use std::{
    any::Any,
    cell::RefCell,
    rc::{Rc, Weak},
};

use cellwork_core::{
    next_node_id, propagation::StaleTracker, CellError, CellKey, CellResult, Node, NodeId,
    Observer, ObserverList,
};

use crate::cell::{Cell, CellInner};

struct ComputedState<T> {
    /// `None` until the first recomputation. Holds `Err` when the compute
    /// function's last run raised an ordinary error,
    /// which is re-raised on every subsequent read until a later
    /// recomputation succeeds.
    cached: Option<CellResult<T>>,
    deps: Vec<(NodeId, Rc<dyn Node>)>,
}

/// A derived cell with a dynamically discovered dependency set. See
/// implements: activation, caching and abort semantics.
struct ComputedNode<T> {
    id: NodeId,
    key: CellKey,
    self_weak: RefCell<Weak<ComputedNode<T>>>,
    compute: RefCell<Box<dyn FnMut() -> CellResult<T>>>,
    changes_only: bool,
    observers: ObserverList,
    tracker: StaleTracker,
    state: RefCell<ComputedState<T>>,
}

impl<T: Clone + PartialEq + 'static> ComputedNode<T> {
    fn strong(&self) -> Rc<Self> {
        self.self_weak
            .borrow()
            .upgrade()
            .expect("ComputedNode method called without a live Rc handle")
    }

    /// Runs the compute function inside a fresh tracking frame, interprets
    /// its outcome, and (when `persist_deps` is true, i.e.
    /// this cell is active) diffs and re-subscribes to the discovered
    /// dependency set. Returns the resulting value/error together with
    /// whether it should be forwarded to this cell's own observers: for an
    /// ordinary return that's the `changes_only` equality gate; for an
    /// abort it's unconditional unless `changes_only` is set (an abort
    /// always retains the prior value, so it's only ever a "no new value"
    /// situation the same way an equal-valued `changes_only` recomputation
    /// is); for an error it's unconditional.
    fn recompute(self: &Rc<Self>, persist_deps: bool) -> (CellResult<T>, bool) {
        let (outcome, touched) = cellwork_core::tracking::track(|| {
            let mut compute = self.compute.borrow_mut();
            compute()
        });

        let mut state = self.state.borrow_mut();
        let (result, notify) = match outcome {
            Ok(v) => {
                let notify = if self.changes_only {
                    !matches!(&state.cached, Some(Ok(prev)) if *prev == v)
                } else {
                    true
                };
                state.cached = Some(Ok(v.clone()));
                (Ok(v), notify)
            }
            Err(CellError::Abort(payload)) => {
                let value = match &state.cached {
                    Some(Ok(prev)) => prev.clone(),
                    _ => payload.downcast_ref::<T>().cloned().unwrap_or_else(|| {
                        panic!(
                            "abort sentinel default did not match this computed cell's value type"
                        )
                    }),
                };
                state.cached = Some(Ok(value.clone()));
                (Ok(value), !self.changes_only)
            }
            Err(e) => {
                state.cached = Some(Err(e.clone()));
                (Err(e), true)
            }
        };
        drop(state);
        if persist_deps {
            self.update_subscriptions(touched);
        }
        (result, notify)
    }

    fn update_subscriptions(self: &Rc<Self>, new_deps: Vec<(NodeId, Rc<dyn Node>)>) {
        let mut state = self.state.borrow_mut();
        let new_ids: Vec<NodeId> = new_deps.iter().map(|(id, _)| *id).collect();
        let old_ids: Vec<NodeId> = state.deps.iter().map(|(id, _)| *id).collect();
        for (id, node) in state.deps.iter() {
            if !new_ids.contains(id) {
                node.remove_observer(self.id);
            }
        }
        for (id, node) in new_deps.iter() {
            if !old_ids.contains(id) {
                let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
                node.add_observer(self.id, weak);
            }
        }
        state.deps = new_deps;
    }

    fn activate(&self) {
        let strong = self.strong();
        let _ = strong.recompute(true);
    }

    fn deactivate(&self) {
        let mut state = self.state.borrow_mut();
        for (_, node) in state.deps.drain(..) {
            node.remove_observer(self.id);
        }
    }
}

impl<T: Clone + PartialEq + 'static> CellInner<T> for ComputedNode<T> {
    fn read(&self) -> CellResult<T> {
        if self.is_active() {
            self.state
                .borrow()
                .cached
                .clone()
                .expect("active computed cell always has a cached value")
        } else {
            // Inactive read: recompute without installing subscriptions
            //. Argument tracking still runs so
            // an outer compute function discovers this cell as a
            // dependency through `Cell::value`, even though this cell
            // itself doesn't subscribe to what it read.
            let (result, _notify) = self.strong().recompute(false);
            result
        }
    }
}

impl<T: Clone + PartialEq + 'static> Node for ComputedNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn cell_key(&self) -> CellKey {
        self.key.clone()
    }

    fn add_observer(&self, id: NodeId, observer: Weak<dyn Observer>) {
        if self.observers.add(id, observer) {
            self.activate();
        }
    }

    fn remove_observer(&self, id: NodeId) {
        if self.observers.remove(id) {
            self.deactivate();
        }
    }

    fn is_active(&self) -> bool {
        !self.observers.is_empty()
    }

    fn changes_only(&self) -> bool {
        self.changes_only
    }
}

impl<T: Clone + PartialEq + 'static> Observer for ComputedNode<T> {
    fn will_update(&self, _source: NodeId) {
        if self.tracker.mark() {
            let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
            cellwork_core::propagation::enqueue_stale(self.id, weak);
        }
    }

    fn did_update(&self, _source: NodeId, _changed: bool) {
        self.tracker.resolve();
        let (_, notify) = self.strong().recompute(true);
        // A `changes_only` cell whose recomputed value equals the cached
        // one never marks its own observers stale, so they neither
        // recompute nor re-run a watch callback for this wave. Forwarding
        // here instead of from `will_update` is what makes that
        // suppression possible: at `will_update` time the new value isn't
        // known yet, only once `recompute` returns can `notify` be
        // decided. `run_sweep`'s drain loop already tolerates enqueuing
        // more (necessarily larger-id) nodes while it's mid-drain, so
        // deferring the forward this late is still safe. An abort still
        // sets `notify` (unless `changes_only`) even though it retains the
        // previous value -- observers must still see the retained value
        // re-announced.
        if notify {
            self.observers.notify_will_update(self.id);
        }
    }
}

fn computed_internal<T, F>(key: CellKey, changes_only: bool, compute: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> CellResult<T> + 'static,
{
    let node = Rc::new_cyclic(|weak| ComputedNode {
        id: next_node_id(),
        key,
        self_weak: RefCell::new(weak.clone()),
        compute: RefCell::new(Box::new(compute)),
        changes_only,
        observers: ObserverList::new(),
        tracker: StaleTracker::new(),
        state: RefCell::new(ComputedState {
            cached: None,
            deps: Vec::new(),
        }),
    });
    Cell::from_concrete(node)
}

/// Creates a derived cell. `compute` is re-run
/// whenever a dependency it read last time changes while this cell is
/// active, or lazily on read while inactive.
pub fn computed<T, F>(compute: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> CellResult<T> + 'static,
{
    computed_internal(CellKey::fresh_identity(), false, compute)
}

/// Like [`computed`], but observers only see `changed = true` when the
/// recomputed value differs from the previous one.
pub fn computed_changes_only<T, F>(compute: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> CellResult<T> + 'static,
{
    computed_internal(CellKey::fresh_identity(), true, compute)
}

/// Used by `error_cell` (`on_error`/`error`) to build an identity-keyed
/// computed cell with an explicit `changes_only` flag, matching whatever
/// the wrapped source cell was built with.
pub(crate) fn computed_internal_with_flag<T, F>(changes_only: bool, compute: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> CellResult<T> + 'static,
{
    computed_internal(CellKey::fresh_identity(), changes_only, compute)
}

thread_local! {
    // A weak interning table keyed by structural `CellKey`: the first call to e.g. `a + b` builds and
    // registers a computed cell here; a second, independently constructed
    // `a + b` finds the live entry and shares its propagation state
    // instead of building a second, observationally-identical cell that
    // would defeat structural sharing and the batch-
    // uniqueness property the moment both copies are read in
    // the same wave. Entries are `Weak`, so once every `Cell<T>` handle
    // referencing a given expression is dropped, the table stops pinning
    // it alive.
    static INTERN: RefCell<std::collections::HashMap<CellKey, Weak<dyn Any>>> =
        RefCell::new(std::collections::HashMap::new());
}

/// Used by operator sugar to build a computed cell with a structural
/// key instead of an identity key, so two syntactically identical
/// expressions share the same underlying cell.
///
/// `compute` is only invoked (and a new [`ComputedNode`] only constructed)
/// on an interning-table miss; a hit returns a [`Cell`] pointing at the
/// already-live node.
pub(crate) fn computed_structural<T, F>(key: CellKey, compute: F) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    F: FnMut() -> CellResult<T> + 'static,
{
    if let Some(hit) = INTERN.with(|t| t.borrow().get(&key).and_then(Weak::upgrade)) {
        if let Ok(node) = hit.downcast::<ComputedNode<T>>() {
            return Cell::from_concrete(node);
        }
        // A different `T` hashed to an equal key -- a tag collision bug
        // elsewhere in `ops`, not something to paper over here. Fall
        // through and rebuild/overwrite the entry.
    }
    let node = Rc::new_cyclic(|weak| ComputedNode {
        id: next_node_id(),
        key: key.clone(),
        self_weak: RefCell::new(weak.clone()),
        compute: RefCell::new(Box::new(compute)),
        changes_only: false,
        observers: ObserverList::new(),
        tracker: StaleTracker::new(),
        state: RefCell::new(ComputedState {
            cached: None,
            deps: Vec::new(),
        }),
    });
    let erased: Rc<dyn Any> = node.clone();
    INTERN.with(|t| t.borrow_mut().insert(key, Rc::downgrade(&erased)));
    Cell::from_concrete(node)
}
