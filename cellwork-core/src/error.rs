use std::{
    any::Any,
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

/// Everything a cell's typed `value()` read can fail with.
///
/// This is intentionally *not* generic over a cell's value type `T`: a
/// compute function composes dependency reads with `?`, and since
/// [`CellError`] carries the abort payload behind `dyn Any` rather than as
/// a type parameter, `dep.value()?` type-checks regardless of what `dep`'s
/// value type is, which is what lets compute functions read
/// heterogeneously-typed dependencies the way argument tracking assumes
/// they will.
///
/// [`CellError::Abort`] must never escape the computed cell
/// that raised it -- [`crate`] callers only ever see it returned from a
/// compute function passed to `computed(...)`, and a conforming computed
/// cell implementation (see `cellwork::Computed`) always intercepts it
/// before it could be observed from the outside.
pub enum CellError {
    /// An ordinary computation error.
    Failed(Rc<dyn std::error::Error>),
    /// A wait cell whose current awaitable has not completed yet. Computed cells never produce this.
    Pending,
    /// The abort sentinel: raised by
    /// `none(default)`. Carries the fallback value, type-erased since
    /// [`CellError`] itself isn't generic; the catching computed cell
    /// downcasts it back to its own value type.
    Abort(Rc<dyn Any>),
}

impl CellError {
    pub fn failed(error: impl std::error::Error + 'static) -> Self {
        CellError::Failed(Rc::new(error))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CellError::Pending)
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, CellError::Abort(_))
    }

    /// Downcasts the ordinary-error payload, if any, to a concrete error
    /// type. Used by `on_error(fallback, type=E)` and `error(type=E)` to
    /// decide whether a given error matches the requested kind.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            CellError::Failed(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Downcasts an abort payload back to its original value type. Only
    /// ever called by the `Computed<T>` that itself produced this value
    /// via `none::<T>(default)`, so a mismatch is a usage bug, not data
    /// this library needs to recover from gracefully.
    pub fn into_abort_default<T: 'static>(self) -> T {
        match self {
            CellError::Abort(payload) => match payload.downcast::<T>() {
                Ok(value) => *value,
                Err(_) => panic!("abort sentinel default did not match the computed cell's value type"),
            },
            _ => panic!("into_abort_default called on a non-Abort CellError"),
        }
    }
}

impl Clone for CellError {
    fn clone(&self) -> Self {
        match self {
            CellError::Failed(e) => CellError::Failed(e.clone()),
            CellError::Pending => CellError::Pending,
            CellError::Abort(payload) => CellError::Abort(payload.clone()),
        }
    }
}

impl Debug for CellError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            CellError::Pending => write!(f, "Pending"),
            CellError::Abort(_) => write!(f, "Abort(..)"),
        }
    }
}

impl Display for CellError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Failed(e) => write!(f, "{e}"),
            CellError::Pending => write!(f, "value not available yet"),
            CellError::Abort(_) => write!(f, "computation aborted, retaining previous value"),
        }
    }
}

impl std::error::Error for CellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CellError::Failed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Raises the abort sentinel: a compute function
/// returns `Err(none(fallback))` to mean "keep whatever value is already
/// cached; if there is no prior value yet, initialize to `fallback`".
pub fn none<T: 'static>(default: T) -> CellError {
    CellError::Abort(Rc::new(default))
}

/// Convenience for `T: Default` compute functions, equivalent to
/// `none(T::default())`.
pub fn none_default<T: Default + 'static>() -> CellError {
    none(T::default())
}

/// The result type every cell's typed `value()` method returns.
pub type CellResult<T> = Result<T, CellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_roundtrips_through_dyn_any() {
        let err = none(7i32);
        assert!(err.is_abort());
        assert_eq!(err.into_abort_default::<i32>(), 7);
    }
}
