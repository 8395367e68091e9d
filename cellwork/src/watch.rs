//! The watch subsystem: a permanently-active hidden
//! consumer that re-runs a callback whenever its discovered dependencies
//! change, optionally deferring the side-effecting half of the callback
//! through a host-supplied scheduler.

use std::{
    cell::RefCell,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use cellwork_core::{
    next_node_id, propagation::StaleTracker, CellKey, Node, NodeId, Observer, ObserverList,
};

use crate::sink::{self, ErrorSink, PanicPayload};

/// A user-supplied scheduling hook: given a
/// deferred closure that performs the watch's side effect using
/// dependency values already captured at notification time, arrange for
/// it to run later (on a host event loop, a `requestAnimationFrame`, ...).
pub type Schedule = Rc<dyn Fn(Box<dyn FnOnce()>)>;

struct WatchNode<T> {
    id: NodeId,
    key: CellKey,
    self_weak: RefCell<Weak<WatchNode<T>>>,
    fn_pin: RefCell<Box<dyn FnMut() -> T>>,
    effect: RefCell<Box<dyn FnMut(T)>>,
    schedule: Option<Schedule>,
    error_sink: Option<ErrorSink>,
    observers: ObserverList,
    tracker: StaleTracker,
    deps: RefCell<Vec<(NodeId, Rc<dyn Node>)>>,
    dispatching: std::cell::Cell<bool>,
    alive: std::cell::Cell<bool>,
}

impl<T: 'static> WatchNode<T> {
    fn strong(&self) -> Rc<Self> {
        self.self_weak
            .borrow()
            .upgrade()
            .expect("WatchNode method called without a live Rc handle")
    }

    fn update_subscriptions(self: &Rc<Self>, new_deps: Vec<(NodeId, Rc<dyn Node>)>) {
        let mut deps = self.deps.borrow_mut();
        let new_ids: Vec<NodeId> = new_deps.iter().map(|(id, _)| *id).collect();
        let old_ids: Vec<NodeId> = deps.iter().map(|(id, _)| *id).collect();
        for (id, node) in deps.iter() {
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
        *deps = new_deps;
    }

    /// Runs `fn_pin` once inside a tracking frame, then either calls
    /// `effect` immediately or hands a closure that will to `schedule`
    ///. A panic from either closure is caught and funneled to
    /// the per-watch sink or the process-wide hook, and never escapes to
    /// disturb other observers' resolution.
    fn run(self: &Rc<Self>) {
        if !self.alive.get() {
            return;
        }
        if self.dispatching.get() {
            // Reentrant firing during its own dispatch is dropped.
            return;
        }
        self.dispatching.set(true);

        let (outcome, touched) = cellwork_core::tracking::track(|| {
            catch_unwind(AssertUnwindSafe(|| (self.fn_pin.borrow_mut())()))
        });
        self.update_subscriptions(touched);

        match outcome {
            Ok(snapshot) => {
                if let Some(schedule) = &self.schedule {
                    let this = self.strong();
                    schedule(Box::new(move || this.run_effect(snapshot)));
                } else {
                    self.run_effect(snapshot);
                }
            }
            Err(payload) => self.report(payload),
        }

        self.dispatching.set(false);
    }

    fn run_effect(&self, snapshot: T) {
        if !self.alive.get() {
            return;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.effect.borrow_mut())(snapshot)));
        if let Err(payload) = outcome {
            self.report(payload);
        }
    }

    fn report(&self, payload: PanicPayload) {
        sink::report(self.error_sink.as_ref(), &payload);
    }

    fn stop(self: &Rc<Self>) {
        if !self.alive.replace(false) {
            return;
        }
        for (_, node) in self.deps.borrow_mut().drain(..) {
            node.remove_observer(self.id);
        }
        self.observers.remove(self.id);
    }
}

impl<T: 'static> Node for WatchNode<T> {
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
        self.alive.get()
    }
}

impl<T: 'static> Observer for WatchNode<T> {
    fn will_update(&self, _source: NodeId) {
        if !self.alive.get() {
            return;
        }
        if self.tracker.mark() {
            let weak: Weak<dyn Observer> = self.self_weak.borrow().clone();
            cellwork_core::propagation::enqueue_stale(self.id, weak);
        }
    }

    fn did_update(&self, _source: NodeId, _changed: bool) {
        self.tracker.resolve();
        if self.alive.get() {
            self.strong().run();
        }
    }
}

trait WatchControl {
    fn stop(&self);
}

impl<T: 'static> WatchControl for WatchNode<T> {
    fn stop(&self) {
        WatchNode::stop(&self.strong());
    }
}

/// A live watch registration. Dropping it calls [`Watch::stop`].
#[must_use = "watches stop running their callback when dropped"]
pub struct Watch {
    control: Rc<dyn WatchControl>,
}

impl Watch {
    /// Uninstalls every subscription this watch holds. Idempotent;
    /// subsequent source writes never re-trigger the callback.
    pub fn stop(&self) {
        self.control.stop();
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.control.stop();
    }
}

fn watch_full<T: 'static>(
    fn_pin: impl FnMut() -> T + 'static,
    effect: impl FnMut(T) + 'static,
    schedule: Option<Schedule>,
    error_sink: Option<ErrorSink>,
) -> Watch {
    let node = Rc::new_cyclic(|weak| WatchNode {
        id: next_node_id(),
        key: CellKey::fresh_identity(),
        self_weak: RefCell::new(weak.clone()),
        fn_pin: RefCell::new(Box::new(fn_pin)),
        effect: RefCell::new(Box::new(effect)),
        schedule,
        error_sink,
        observers: ObserverList::new(),
        tracker: StaleTracker::new(),
        deps: RefCell::new(Vec::new()),
        dispatching: std::cell::Cell::new(false),
        alive: std::cell::Cell::new(true),
    });
    // A watch always has exactly one observer -- itself -- so it is
    // permanently active: this self-loop is what makes
    // `is_active`/`will_update`/`did_update` flow through the same
    // observer-list bookkeeping every other cell variant uses, without a
    // real external subscriber.
    let weak_self: Weak<dyn Observer> = node.self_weak.borrow().clone();
    node.observers.add(node.id, weak_self);
    node.run();
    Watch { control: node }
}

/// Registers `f` as a watch: runs once immediately
/// to discover dependencies, then again every time one of them changes,
/// for as long as the returned [`Watch`] is alive.
pub fn watch<F: FnMut() + 'static>(mut f: F) -> Watch {
    watch_full(move || f(), |_: ()| {}, None, None)
}

/// Like [`watch`], but splits the callback into a tracked read half
/// (`fn_pin`, returns a snapshot `T`) and an untracked side-effecting half
/// (`effect`). Useful standalone, and the shape [`watch_scheduled`] needs
/// to defer only the effect half.
pub fn watch_with<T, F, E>(f: F, effect: E) -> Watch
where
    T: 'static,
    F: FnMut() -> T + 'static,
    E: FnMut(T) + 'static,
{
    watch_full(f, effect, None, None)
}

/// Like [`watch_with`], but defers the side-effecting half through
/// `schedule`. `f` still runs synchronously at
/// notification time -- its result is the "snapshot current dependency
/// values" `schedule`'s deferred closure must observe,
/// rather than whatever the dependencies hold when the scheduler
/// eventually gets around to running it.
pub fn watch_scheduled<T, F, E, S>(f: F, effect: E, schedule: S) -> Watch
where
    T: 'static,
    F: FnMut() -> T + 'static,
    E: FnMut(T) + 'static,
    S: Fn(Box<dyn FnOnce()>) + 'static,
{
    watch_full(f, effect, Some(Rc::new(schedule)), None)
}

/// Like [`watch_with`], but reports caught callback errors to `error_sink`
/// instead of the process-wide uncaught-error hook.
pub fn watch_with_sink<T, F, E>(f: F, effect: E, error_sink: ErrorSink) -> Watch
where
    T: 'static,
    F: FnMut() -> T + 'static,
    E: FnMut(T) + 'static,
{
    watch_full(f, effect, None, Some(error_sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutable::mutable;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn watch_runs_on_every_relevant_write_and_stops_on_drop() {
        let a = mutable(0i64);
        let b = mutable(1i64);
        let recorded = Rc::new(StdRefCell::new(Vec::new()));
        let recorded2 = recorded.clone();
        let (a2, b2) = (a.clone(), b.clone());
        let w = watch(move || recorded2.borrow_mut().push((a2.value().unwrap(), b2.value().unwrap())));

        a.set(5);
        b.set(10);
        assert_eq!(*recorded.borrow(), vec![(0, 1), (5, 1), (5, 10)]);

        w.stop();
        a.set(999);
        assert_eq!(
            *recorded.borrow(),
            vec![(0, 1), (5, 1), (5, 10)],
            "no further firings once stopped"
        );
    }

    #[test]
    fn dropping_watch_stops_it() {
        let a = mutable(0i64);
        let recorded = Rc::new(StdRefCell::new(0));
        let recorded2 = recorded.clone();
        let a2 = a.clone();
        {
            let _w = watch(move || {
                let _ = a2.value();
                *recorded2.borrow_mut() += 1;
            });
            assert_eq!(*recorded.borrow(), 1);
        }
        a.set(1);
        assert_eq!(*recorded.borrow(), 1, "dropped watch must not re-fire");
    }

    #[test]
    fn panicking_callback_is_caught_and_does_not_poison_other_watches() {
        let a = mutable(0i64); // starts away from the panicking value
        let other_ran = Rc::new(std::cell::Cell::new(0));
        let other_ran2 = other_ran.clone();
        let a2 = a.clone();
        let _panicky = watch(move || {
            let v = a2.value().unwrap();
            if v == 1 {
                panic!("boom");
            }
        });
        let a3 = a.clone();
        let _other = watch(move || {
            let _ = a3.value();
            other_ran2.set(other_ran2.get() + 1);
        });
        a.set(1);
        assert_eq!(other_ran.get(), 2, "the other watch still resolves");
    }

    #[test]
    fn scheduled_watch_defers_effect_with_a_point_in_time_snapshot() {
        let a = mutable(1i64);
        let pending: Rc<StdRefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(StdRefCell::new(Vec::new()));
        let pending_for_schedule = pending.clone();
        let effect_log = Rc::new(StdRefCell::new(Vec::new()));
        let effect_log2 = effect_log.clone();
        let a2 = a.clone();
        let _w = watch_scheduled(
            move || a2.value().unwrap(),
            move |v: i64| effect_log2.borrow_mut().push(v),
            move |job| pending_for_schedule.borrow_mut().push(job),
        );
        a.set(2);
        // The effect has not run yet -- only the read half ran, snapshot
        // captured at notification time.
        assert!(effect_log.borrow().is_empty());
        a.set(3);
        // Draining the deferred jobs in order must reproduce each
        // snapshot as of when it was captured, not the final value.
        let jobs = std::mem::take(&mut *pending.borrow_mut());
        for job in jobs {
            job();
        }
        assert_eq!(*effect_log.borrow(), vec![2, 3]);
    }
}
