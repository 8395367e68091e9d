use std::{
    cell::{Cell as StdCell, RefCell},
    collections::BTreeMap,
    rc::Weak,
};

use crate::{node::NodeId, observer::Observer};

/// Per-node bookkeeping for the mark phase of a propagation wave: a
/// single flag recording whether this node has already been marked stale
/// (and therefore already enqueued/forwarded) during the *current* wave.
/// `will_update` forwarding is idempotent exactly because
/// [`mark`](StaleTracker::mark) only returns `true` the first time.
#[derive(Default)]
pub struct StaleTracker {
    stale: StdCell<bool>,
}

impl StaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call from `will_update`. Returns `true` the first time this is
    /// called since the last resolution -- the caller should forward its
    /// own `will_update` to its observers and enqueue itself for
    /// resolution exactly when this returns `true`.
    pub fn mark(&self) -> bool {
        if self.stale.get() {
            false
        } else {
            self.stale.set(true);
            true
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale.get()
    }

    /// Call once a node has finished recomputing in response to being
    /// popped from the stale queue.
    pub fn resolve(&self) {
        self.stale.set(false);
    }
}

thread_local! {
    // Ordered by `NodeId`, which is assigned at construction time.
    // `tracking::record_dependency` is only ever called while computing a
    // cell that already exists -- so every dependency's id is smaller than
    // its dependent's -- which makes ascending-id order a valid
    // topological order for the whole stale set.
    static STALE_QUEUE: RefCell<BTreeMap<NodeId, Weak<dyn Observer>>> = RefCell::new(BTreeMap::new());
}

/// Registers `id` as newly stale. Called exactly once per node per wave,
/// from that node's own `will_update` the first time [`StaleTracker::mark`]
/// returns `true`.
pub fn enqueue_stale(id: NodeId, observer: Weak<dyn Observer>) {
    tracing::trace!(node = id, "enqueued stale node for this propagation wave");
    STALE_QUEUE.with(|q| {
        q.borrow_mut().insert(id, observer);
    });
}

/// Drains the stale queue in ascending node-id (topological) order,
/// resolving each node by delivering `did_update` to it. Resolving a node
/// never needs to push notifications forward itself: every node reachable
/// from the wave's root write was already discovered and enqueued during
/// the (synchronous, recursive) mark phase, so by the time a node is
/// popped here, all of its dependencies -- which necessarily have smaller
/// ids -- have already been resolved earlier in this same sweep.
///
/// Safe to re-enter: a `did_update` callback that itself writes another
/// cell will enqueue more (necessarily larger-id) entries into the same
/// queue, which this loop will simply continue draining.
pub fn run_sweep() {
    let mut resolved = 0u32;
    loop {
        let next = STALE_QUEUE.with(|q| q.borrow_mut().pop_first());
        match next {
            Some((id, weak)) => {
                if let Some(observer) = weak.upgrade() {
                    observer.did_update(id, true);
                }
                resolved += 1;
            }
            None => break,
        }
    }
    if resolved > 0 {
        tracing::trace!(resolved, "propagation wave finished");
    }
}

/// Runs the sweep unless a batch is currently suppressing it:
/// `will_update`s still fire eagerly and populate the queue, but resolution
/// is deferred until the outermost batch scope exits.
pub fn drain_unless_batched() {
    if !crate::batch::is_active() {
        run_sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_is_idempotent_until_resolved() {
        let tracker = StaleTracker::new();
        assert!(tracker.mark());
        assert!(!tracker.mark());
        tracker.resolve();
        assert!(tracker.mark());
    }
}
