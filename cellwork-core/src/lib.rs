//! The reactive propagation engine backing `cellwork`.
//!
//! This crate is a single-threaded propagation runtime: it owns cell
//! identity (`key`), the observer
//! protocol (`observer`), node/observer-list bookkeeping (`node`), the
//! argument-tracking context (`tracking`), the batch coordinator
//! (`batch`), and the shared error type used by computed, peek and wait
//! cells (`error`). `cellwork` builds the user-facing cell variants and
//! operator sugar on top of these primitives.
//!
//! Everything here assumes a single designated executor context: there
//! is no internal locking, and nothing is `Send`/`Sync`.

pub mod batch;
pub mod error;
pub mod key;
pub mod node;
pub mod observer;
pub mod propagation;
pub mod tracking;
pub mod waker;

pub use error::{none, none_default, CellError, CellResult};
pub use key::CellKey;
pub use node::{next_node_id, Node, NodeId, ObserverList};
pub use observer::Observer;
pub use propagation::StaleTracker;
