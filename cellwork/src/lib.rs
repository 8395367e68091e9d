//! `cellwork`: a directed-graph reactive-cell library.
//!
//! A computation is modeled as a graph of cells -- named value holders
//! whose value may be observed. When a cell's value changes, dependent
//! cells and observers are notified and updated in a deterministic,
//! glitch-free order. See the crate-level module layout below for where
//! each part of that engine lives; [`cellwork_core`] is the single-
//! threaded propagation engine this crate's cell variants and operator
//! sugar are built on.
//!
//! ```
//! use cellwork::{batch, computed, mutable, watch};
//!
//! let a = mutable(0i64);
//! let b = mutable(1i64);
//! let recorded = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
//! let recorded2 = recorded.clone();
//! let (a2, b2) = (a.clone(), b.clone());
//! let w = watch(move || recorded2.borrow_mut().push((a2.value().unwrap(), b2.value().unwrap())));
//!
//! batch(|| {
//!     a.set(15);
//!     b.set(3);
//! });
//!
//! assert_eq!(*recorded.borrow(), vec![(0, 1), (15, 3)]);
//! w.stop();
//! ```

mod cell;
mod computed;
mod constant;
mod conversions;
mod error_cell;
mod mutable;
mod ops;
mod peek;
pub mod sink;
mod wait;
mod watch;

pub use cellwork_core::{none, none_default, CellError, CellKey, CellResult};

pub use cell::Cell;
pub use computed::{computed, computed_changes_only};
pub use constant::value;
pub use error_cell::{error, error_matching, on_error, on_error_matching, AnyError, ErrorMatch};
pub use mutable::{mutable, Mutable};
pub use peek::peek;
pub use wait::{waited, wait2, wait3, wait_all, wait_value, Awaitable, WaitOptions};
pub use watch::{watch, watch_scheduled, watch_with, watch_with_sink, Schedule, Watch};

pub use cellwork_core::batch::{batch, is_active as is_batching, BatchGuard};

pub use cellwork_core::waker::drain_wakes;

/// The `std::ops`-flavored and logical/comparison operator sugar: `ops::add(a, b)` and friends build a structurally-keyed computed
/// cell, so repeated calls to e.g. `ops::add(&a, &b)` with the same
/// operand cells share one underlying node.
pub mod operators {
    pub use crate::ops::*;
}
