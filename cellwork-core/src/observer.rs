use crate::node::{Node, NodeId};

/// The two-phase notification contract: `will_update` announces that a
/// node has gone stale, `did_update` delivers the resolved value once
/// recomputation finishes.
///
/// `will_update(source)` announces that `source` is about to change;
/// observers mark themselves stale and forward the announcement to their
/// own observers, but do not recompute yet. `did_update(source, changed)`
/// is how an observer actually resolves itself once the whole transitive
/// closure of a propagation wave has been marked: the runtime's stale
/// queue (see `crate::propagation`) delivers it once per node, in
/// dependency order, so that by the time a node resolves, everything it
/// depends on has already resolved too.
///
/// Every observer is itself a [`Node`] (computed/peek/wait cells and watch
/// consumers can all, in turn, be depended on).
pub trait Observer: Node {
    fn will_update(&self, source: NodeId);
    fn did_update(&self, source: NodeId, changed: bool);
}
