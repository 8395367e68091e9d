//! Small `From`/`Debug` plumbing around [`Cell`]. The surface here is one
//! concrete handle type, not a lattice of arc/weak/dyn variants, so there
//! is not much to convert between.

use std::fmt::{self, Debug, Formatter};

use crate::{cell::Cell, constant};

/// `From<T> for Cell<T>` is `value(t)`, so an `impl Into<Cell<T>>`
/// call site can pass either a plain value or an existing cell.
impl<T: Clone + 'static> From<T> for Cell<T> {
    fn from(v: T) -> Self {
        constant::value(v)
    }
}

impl<T: Clone + std::fmt::Debug + 'static> Debug for Cell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(v) => f.debug_tuple("Cell").field(&v).finish(),
            Err(e) => f.debug_tuple("Cell").field(&format_args!("<{e}>")).finish(),
        }
    }
}
