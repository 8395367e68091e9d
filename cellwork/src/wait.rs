//! Wait cells: the synchronous view onto an awaitable-valued source
//! cell.

use std::{
    cell::RefCell,
    collections::VecDeque,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use cellwork_core::{
    next_node_id, propagation::StaleTracker, waker, CellError, CellKey, CellResult, Node, NodeId,
    Observer, ObserverList,
};

use crate::cell::{Cell, CellInner};

type BoxFuture<T> = Pin<Box<dyn Future<Output = CellResult<T>>>>;

/// A boxed, type-erased awaitable. `PartialEq` is identity (`Rc::ptr_eq`): every
/// construction is a fresh instance, so writing a new `Awaitable` to a
/// mutable source cell always counts as a change even if it would
/// eventually resolve to a value equal to the outstanding one -- which is
/// exactly what "a new awaitable always supersedes the previous one"
/// requires of the underlying mutable cell's own
/// `PartialEq`-based no-op-write suppression.
pub struct Awaitable<T>(Rc<RefCell<BoxFuture<T>>>);

impl<T> Clone for Awaitable<T> {
    fn clone(&self) -> Self {
        Awaitable(self.0.clone())
    }
}

impl<T> PartialEq for Awaitable<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl<T> Eq for Awaitable<T> {}

impl<T: 'static> Awaitable<T> {
    /// Wraps a plain `Future<Output = T>` (it cannot itself fail).
    pub fn new(fut: impl Future<Output = T> + 'static) -> Self {
        Awaitable(Rc::new(RefCell::new(Box::pin(async move { Ok(fut.await) }))))
    }

    /// Wraps a future that can itself resolve to an error.
    pub fn fallible(fut: impl Future<Output = CellResult<T>> + 'static) -> Self {
        Awaitable(Rc::new(RefCell::new(Box::pin(fut))))
    }

    fn poll(&self, cx: &mut Context<'_>) -> Poll<CellResult<T>> {
        self.0.borrow_mut().as_mut().poll(cx)
    }
}

/// Mirrors `cell.waited(*, reset=true, queue=false)`.
#[derive(Clone, Copy, Debug)]
pub struct WaitOptions {
    pub reset: bool,
    pub queue: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        WaitOptions {
            reset: true,
            queue: false,
        }
    }
}

enum Slot<T> {
    /// `reset=true`, or `reset=false, queue=false`: only ever one
    /// in-flight awaitable; a new source value replaces it outright.
    Single(Option<BoxFuture<T>>),
    /// `reset=false, queue=true`: a FIFO of not-yet-started or
    /// in-flight awaitables, polled strictly in assignment order.
    Queue(VecDeque<BoxFuture<T>>),
}

struct WaitState<T> {
    result: CellResult<T>,
    generation: u64,
    slot: Slot<T>,
}

struct WaitNode<T> {
    id: NodeId,
    key: CellKey,
    self_weak: RefCell<Weak<WaitNode<T>>>,
    source: Cell<Awaitable<T>>,
    opts: WaitOptions,
    observers: ObserverList,
    tracker: StaleTracker,
    state: RefCell<WaitState<T>>,
}

impl<T: Clone + 'static> WaitNode<T> {
    fn strong(&self) -> Rc<Self> {
        self.self_weak
            .borrow()
            .upgrade()
            .expect("WaitNode method called without a live Rc handle")
    }

    /// Delivers a completed (or errored) value to observers. Self-originated,
    /// like a mutable cell's own write -- there is no upstream source write
    /// driving this, the completion itself is the event. Unlike a computed
    /// cell, this node already holds its new value by the time it calls
    /// this, so it only has to notify its own observers and let the sweep
    /// resolve them; it never needs to enqueue itself.
    fn fire_update(self: &Rc<Self>) {
        self.observers.notify_will_update(self.id);
        cellwork_core::propagation::drain_unless_batched();
    }

    /// Polls whatever this node's slot currently considers "active" --
    /// the single in-flight future, or the queue's front -- once, using a
    /// waker keyed to this node's id. On `Ready`, records the result,
    /// fires an update, and (queue mode) advances to the next entry.
    fn poll_active(self: &Rc<Self>) {
        loop {
            let ready = {
                let mut state = self.state.borrow_mut();
                let waker = waker::make_waker(self.id);
                let mut cx = Context::from_waker(&waker);
                match &mut state.slot {
                    Slot::Single(Some(fut)) => match fut.as_mut().poll(&mut cx) {
                        Poll::Ready(result) => {
                            state.slot = Slot::Single(None);
                            Some(result)
                        }
                        Poll::Pending => None,
                    },
                    Slot::Single(None) => None,
                    Slot::Queue(queue) => match queue.front_mut() {
                        Some(fut) => match fut.as_mut().poll(&mut cx) {
                            Poll::Ready(result) => {
                                queue.pop_front();
                                Some(result)
                            }
                            Poll::Pending => None,
                        },
                        None => None,
                    },
                }
            };
            match ready {
                Some(result) => {
                    self.state.borrow_mut().result = result;
                    self.fire_update();
                    // In queue mode, immediately start polling the next
                    // entry (it may resolve synchronously too).
                    let more = matches!(
                        &self.state.borrow().slot,
                        Slot::Queue(q) if !q.is_empty()
                    );
                    if !more {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    /// Called once when a new value lands on `source` (activation, or a
    /// subsequent `did_update` from it).
    fn on_source_changed(self: &Rc<Self>) {
        let mut state = self.state.borrow_mut();
        state.generation += 1;
        drop(state);

        let new_awaitable = match self.source.read_untracked() {
            Ok(a) => a,
            Err(e) => {
                self.state.borrow_mut().result = Err(e);
                self.fire_update();
                return;
            }
        };
        let fut: BoxFuture<T> = Box::pin(SourceAwait(new_awaitable));

        if self.opts.queue {
            self.state.borrow_mut().slot.as_queue_mut().push_back(fut);
        } else if self.opts.reset {
            self.state.borrow_mut().result = Err(CellError::Pending);
            self.state.borrow_mut().slot = Slot::Single(Some(fut));
            self.fire_update();
        } else {
            // reset=false, queue=false: newest supersedes previous
            // silently; dropping the old boxed future discards whatever
            // it would have completed with.
            self.state.borrow_mut().slot = Slot::Single(Some(fut));
        }
        self.poll_active();
    }

    fn activate(self: &Rc<Self>) {
        let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
        self.source.node().add_observer(self.id, weak);
        let wakeable: Weak<dyn waker::Wakeable> = self.self_weak.borrow().clone();
        waker::register(self.id, wakeable);
        self.on_source_changed();
    }

    fn deactivate(&self) {
        self.source.node().remove_observer(self.id);
        waker::unregister(self.id);
    }
}

/// A future that simply forwards to an [`Awaitable`]'s inner poll. Lets
/// [`WaitNode`] store a uniform `BoxFuture<T>` regardless of whether the
/// slot holds the source's own awaitable or (in queue mode) several.
struct SourceAwait<T>(Awaitable<T>);
impl<T> Future for SourceAwait<T> {
    type Output = CellResult<T>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.0.poll(cx)
    }
}

impl<T> Slot<T> {
    fn as_queue_mut(&mut self) -> &mut VecDeque<BoxFuture<T>> {
        match self {
            Slot::Queue(q) => q,
            Slot::Single(_) => unreachable!("queue slot accessed on a non-queued wait cell"),
        }
    }
}

impl<T: Clone + 'static> CellInner<T> for WaitNode<T> {
    fn read(&self) -> CellResult<T> {
        if self.is_active() {
            self.state.borrow().result.clone()
        } else {
            // Inactive read: nothing is polling this node, so do a single
            // untracked poll of the source's *current* awaitable and
            // report whatever that one poll yields, without retaining any
            // state.
            match self.source.read_untracked() {
                Ok(a) => futures_lite::future::poll_once(SourceAwait(a))
                    .map(|r| r)
                    .unwrap_or(Err(CellError::Pending)),
                Err(e) => Err(e),
            }
        }
    }
}

impl<T: 'static> Node for WaitNode<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }
    fn cell_key(&self) -> CellKey {
        self.key.clone()
    }
    fn add_observer(&self, id: NodeId, observer: Weak<dyn Observer>) {
        if self.observers.add(id, observer) {
            // Safe: `activate` only touches `&self` data via `Rc` clones
            // obtained through `self_weak`, same pattern as `ComputedNode`.
            let strong = self
                .self_weak
                .borrow()
                .upgrade()
                .expect("add_observer called before construction finished");
            strong.activate();
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
}

impl<T: Clone + 'static> Observer for WaitNode<T> {
    fn will_update(&self, _source: NodeId) {
        if self.tracker.mark() {
            let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
            cellwork_core::propagation::enqueue_stale(self.id, weak);
        }
    }

    fn did_update(&self, _source: NodeId, _changed: bool) {
        self.tracker.resolve();
        self.strong().on_source_changed();
    }
}

impl<T: Clone + 'static> waker::Wakeable for WaitNode<T> {
    fn woken(self: Rc<Self>) {
        self.poll_active();
    }
}

/// Materializes a cell holding awaitables into a synchronous view of
/// their completions.
pub fn waited<T: Clone + 'static>(source: &Cell<Awaitable<T>>, opts: WaitOptions) -> Cell<T> {
    let node = Rc::new_cyclic(|weak| WaitNode {
        id: next_node_id(),
        key: CellKey::structural(
            if opts.queue {
                "wait_queue"
            } else if opts.reset {
                "wait_reset"
            } else {
                "wait_latest"
            },
            vec![source.key()],
        ),
        self_weak: RefCell::new(weak.clone()),
        source: source.clone(),
        opts,
        observers: ObserverList::new(),
        tracker: StaleTracker::new(),
        state: RefCell::new(WaitState {
            result: Err(CellError::Pending),
            generation: 0,
            slot: if opts.queue {
                Slot::Queue(VecDeque::new())
            } else {
                Slot::Single(None)
            },
        }),
    });
    Cell::from_concrete(node)
}

/// Reads `source.waited(opts)`'s value directly, without building a cell.
pub fn wait_value<T: Clone + 'static>(source: &Cell<Awaitable<T>>, opts: WaitOptions) -> CellResult<T> {
    waited(source, opts).value()
}

/// Homogeneous multi-source wait: resolves
/// once every cell's current awaitable has completed, re-running per
/// `opts` on every subsequent source change, same as the single-source
/// case. Errors propagate from the first (in iteration order) source
/// that raised one.
pub fn wait_all<T: Clone + 'static>(sources: &[Cell<Awaitable<T>>], opts: WaitOptions) -> Cell<Vec<T>> {
    let waits: Vec<Cell<T>> = sources.iter().map(|s| waited(s, opts)).collect();
    crate::computed::computed(move || waits.iter().map(|w| w.value()).collect())
}

/// Two-source heterogeneous wait.
pub fn wait2<A, B>(
    a: &Cell<Awaitable<A>>,
    b: &Cell<Awaitable<B>>,
    opts: WaitOptions,
) -> Cell<(A, B)>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
{
    let wa = waited(a, opts);
    let wb = waited(b, opts);
    crate::computed::computed(move || Ok((wa.value()?, wb.value()?)))
}

/// Three-source variant of [`wait2`].
pub fn wait3<A, B, C>(
    a: &Cell<Awaitable<A>>,
    b: &Cell<Awaitable<B>>,
    c: &Cell<Awaitable<C>>,
    opts: WaitOptions,
) -> Cell<(A, B, C)>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
    C: Clone + PartialEq + 'static,
{
    let wa = waited(a, opts);
    let wb = waited(b, opts);
    let wc = waited(c, opts);
    crate::computed::computed(move || Ok((wa.value()?, wb.value()?, wc.value()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    /// A future resolving to `value` after being polled `ticks` times,
    /// waking itself each time it returns Pending -- the stand-in for
    /// a `delayed(value, d=ticks)` helper.
    struct Delayed<T> {
        value: Option<T>,
        remaining: u32,
    }
    impl<T: Unpin> Future for Delayed<T> {
        type Output = T;
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
            if self.remaining == 0 {
                Poll::Ready(self.value.take().expect("polled again after ready"))
            } else {
                self.remaining -= 1;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
    fn delayed<T: Unpin + 'static>(value: T, ticks: u32) -> Awaitable<T> {
        Awaitable::new(Delayed {
            value: Some(value),
            remaining: ticks,
        })
    }

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    fn pump() {
        // Drives the thread-local waker registry until no wait cell has
        // outstanding wakes, analogous to a host event loop's pump tick.
        for _ in 0..64 {
            waker::drain_wakes();
        }
    }

    /// A wait cell only polls its source while active (subscribed to by
    /// something). A bare `.value()` call from test code never subscribes
    /// to anything -- only a compute/watch frame does, via
    /// `update_subscriptions` -- so these tests keep a throwaway watch
    /// alive for the duration, purely to hold the wait cell active.
    fn keep_active<T: Clone + 'static>(w: &Cell<T>) -> crate::watch::Watch {
        let w = w.clone();
        crate::watch::watch(move || {
            let _ = w.value();
        })
    }

    #[test]
    fn reset_semantics_report_pending_between_completions() {
        let n = mutable(delayed(1i64, 2));
        let w = waited(&n.cell(), WaitOptions::default());
        let _watch = keep_active(&w);
        assert!(w.value().unwrap_err().is_pending());
        pump();
        assert_eq!(w.value().unwrap(), 1);

        n.set(delayed(2i64, 1));
        assert!(w.value().unwrap_err().is_pending(), "reset announces pending immediately");
        pump();
        assert_eq!(w.value().unwrap(), 2);
    }

    #[test]
    fn non_reset_keeps_last_value_until_newest_completes() {
        let n = mutable(delayed(1i64, 1));
        let w = waited(&n.cell(), WaitOptions { reset: false, queue: false });
        let _watch = keep_active(&w);
        pump();
        assert_eq!(w.value().unwrap(), 1);

        n.set(delayed(2i64, 1));
        // Not reset to pending: stays at the last resolved value until
        // the newest awaitable completes.
        assert_eq!(w.value().unwrap(), 1);
        pump();
        assert_eq!(w.value().unwrap(), 2);
    }

    #[test]
    fn queued_wait_preserves_assignment_order() {
        let n = mutable(delayed(1i64, 2));
        let w = waited(&n.cell(), WaitOptions { reset: false, queue: true });
        let _watch = keep_active(&w);

        // Only the queue's front is ever polled, so a later entry can
        // never complete before an earlier one regardless of how quickly
        // it would resolve on its own.
        n.set(delayed(2i64, 1));
        assert_eq!(w.value().unwrap(), 1, "front of the queue resolves first");
        pump();
        assert_eq!(w.value().unwrap(), 2);

        n.set(delayed(3i64, 1));
        assert_eq!(w.value().unwrap(), 2, "third entry waits its turn");
        pump();
        assert_eq!(w.value().unwrap(), 3);
        let _ = noop_waker();
    }
}
