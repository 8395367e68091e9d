use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::{Rc, Weak},
    task::{RawWaker, RawWakerVTable, Waker},
};

use crate::node::NodeId;

/// Something a [`Waker`] built by [`make_waker`] can wake back up.
///
/// Implemented by the wait cell that registered itself under a given
/// [`NodeId`]; `woken` is called once [`drain_wakes`] gets around to
/// draining the id this waker was built for.
pub trait Wakeable {
    fn woken(self: Rc<Self>);
}

thread_local! {
    static REGISTRY: RefCell<HashMap<NodeId, Weak<dyn Wakeable>>> = RefCell::new(HashMap::new());
    static PENDING: RefCell<VecDeque<NodeId>> = RefCell::new(VecDeque::new());
}

/// Registers `wakeable` to receive [`Wakeable::woken`] calls when a waker
/// built for `id` fires. Overwrites any previous registration for `id`.
pub fn register(id: NodeId, wakeable: Weak<dyn Wakeable>) {
    REGISTRY.with(|r| {
        r.borrow_mut().insert(id, wakeable);
    });
}

/// Drops the registration for `id`, e.g. when its wait cell deactivates.
pub fn unregister(id: NodeId) {
    REGISTRY.with(|r| {
        r.borrow_mut().remove(&id);
    });
    PENDING.with(|p| p.borrow_mut().retain(|pending| *pending != id));
}

fn queue_wake(id: NodeId) {
    PENDING.with(|p| {
        let mut p = p.borrow_mut();
        if !p.contains(&id) {
            p.push_back(id);
        }
    });
}

/// Builds a [`Waker`] that, once woken, enqueues `id` for the next
/// [`drain_wakes`] call on *this thread*.
///
/// There is no executor here -- a
/// wait cell polls its source awaitable directly, and if it isn't
/// ready yet, hands this waker to it so that whoever eventually drives the
/// future (a host event loop, a green-thread scheduler) has a way to tell
/// this library "something may have changed, go re-poll". The host is
/// expected to call [`drain_wakes`] from its own loop; nothing here spawns
/// a thread or blocks.
///
/// The waker is deliberately not `Send`: everything lives on
/// one designated executor context, so waking from another OS thread is
/// out of scope and would need the host's own cross-thread handoff first.
pub fn make_waker(id: NodeId) -> Waker {
    let data = Box::into_raw(Box::new(id)) as *const ();
    unsafe { Waker::from_raw(RawWaker::new(data, &VTABLE)) }
}

const VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

fn clone_raw(data: *const ()) -> RawWaker {
    let id = unsafe { *(data as *const NodeId) };
    let cloned = Box::into_raw(Box::new(id)) as *const ();
    RawWaker::new(cloned, &VTABLE)
}

fn wake_raw(data: *const ()) {
    let id = unsafe { *Box::from_raw(data as *mut NodeId) };
    queue_wake(id);
}

fn wake_by_ref_raw(data: *const ()) {
    let id = unsafe { *(data as *const NodeId) };
    queue_wake(id);
}

fn drop_raw(data: *const ()) {
    unsafe { drop(Box::from_raw(data as *mut NodeId)) };
}

/// Re-polls every wait cell whose waker has fired since the last call.
///
/// This is the cooperative pump a host event loop calls once per tick (or
/// after polling its own I/O) to let pending wait cells make
/// progress; nothing in this crate calls it on its own.
pub fn drain_wakes() {
    loop {
        let next = PENDING.with(|p| p.borrow_mut().pop_front());
        match next {
            Some(id) => {
                let wakeable = REGISTRY.with(|r| r.borrow().get(&id).cloned());
                if let Some(weak) = wakeable {
                    if let Some(strong) = weak.upgrade() {
                        strong.woken();
                    }
                }
            }
            None => break,
        }
    }
}
