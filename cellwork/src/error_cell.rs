//! `on_error`/`error` recovery primitives.

use std::{cell::RefCell, rc::Rc};

use cellwork_core::{CellError, CellResult};

use crate::{cell::Cell, computed::computed_internal_with_flag};

/// Substitutes `fallback`'s value whenever `source` raises any ordinary
/// computation error.
///
/// `changes_only` suppression is only applied to the substituted value
/// when `source` itself was built with `changes_only=true`; `on_error`
/// does not introduce suppression on its own.
pub fn on_error<T: Clone + PartialEq + 'static>(source: &Cell<T>, fallback: Cell<T>) -> Cell<T> {
    on_error_matching::<T, AnyError>(source, fallback)
}

/// Like [`on_error`], but only substitutes `fallback` when the error
/// downcasts to `E`; any other error re-raises unchanged.
pub fn on_error_matching<T, E>(source: &Cell<T>, fallback: Cell<T>) -> Cell<T>
where
    T: Clone + PartialEq + 'static,
    E: ErrorMatch + 'static,
{
    let source = source.clone();
    let changes_only = source.node().changes_only();
    computed_internal_with_flag(changes_only, move || match source.value() {
        Ok(v) => Ok(v),
        Err(CellError::Pending) => Err(CellError::Pending),
        Err(CellError::Abort(payload)) => Err(CellError::Abort(payload)),
        Err(e @ CellError::Failed(_)) => {
            if E::matches(&e) {
                fallback.value()
            } else {
                Err(e)
            }
        }
    })
}

/// Matches any ordinary computation error, used by [`on_error`]'s default.
pub struct AnyError;

/// A type-level predicate for filtering which errors `on_error`/`error`
/// act on. Implemented by [`AnyError`] and, via a blanket impl, by any
/// concrete `std::error::Error` type.
pub trait ErrorMatch {
    fn matches(error: &CellError) -> bool;
}

impl ErrorMatch for AnyError {
    fn matches(_error: &CellError) -> bool {
        true
    }
}

impl<E: std::error::Error + 'static> ErrorMatch for E {
    fn matches(error: &CellError) -> bool {
        error.downcast_ref::<E>().is_some()
    }
}

/// Yields the last error `source` raised (as a type-erased
/// `Rc<dyn std::error::Error>`), or `None` if it has never errored.
///
/// When `all` is `true`, the cell resets to `None` whenever `source`
/// recomputes to a value successfully; when `false`, the last error sticks
/// even across later successful recomputations.
pub fn error<T: Clone + PartialEq + 'static>(
    source: &Cell<T>,
    all: bool,
) -> Cell<Option<Rc<dyn std::error::Error>>> {
    error_matching::<T, AnyError>(source, all)
}

/// Like [`error`], but only records errors downcasting to `E`; any other
/// error still propagates through `source` undisturbed (this cell simply
/// leaves its own last-seen value alone for a non-matching error).
pub fn error_matching<T, E>(source: &Cell<T>, all: bool) -> Cell<Option<Rc<dyn std::error::Error>>>
where
    T: Clone + PartialEq + 'static,
    E: ErrorMatch + 'static,
{
    let source = source.clone();
    let last: Rc<RefCell<Option<Rc<dyn std::error::Error>>>> = Rc::new(RefCell::new(None));
    computed_internal_with_flag(false, move || -> CellResult<Option<Rc<dyn std::error::Error>>> {
        match source.value() {
            Ok(_) => {
                if all {
                    *last.borrow_mut() = None;
                }
                Ok(last.borrow().clone())
            }
            Err(e @ CellError::Failed(_)) if E::matches(&e) => {
                if let CellError::Failed(inner) = &e {
                    *last.borrow_mut() = Some(inner.clone());
                }
                Ok(last.borrow().clone())
            }
            // Non-matching ordinary errors, pending and abort states all
            // leave the recorded error untouched.
            Err(_) => Ok(last.borrow().clone()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{computed::computed, constant::value, mutable::mutable};
    use std::fmt;

    #[derive(Debug)]
    struct ParseIntLike;
    impl fmt::Display for ParseIntLike {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "bad number")
        }
    }
    impl std::error::Error for ParseIntLike {}

    #[test]
    fn on_error_substitutes_fallback() {
        let text = mutable("0".to_string());
        let text_read = text.clone();
        let n = computed(move || -> CellResult<i64> {
            text_read
                .value()?
                .parse::<i64>()
                .map_err(|_| CellError::failed(ParseIntLike))
        });
        let r = on_error(&n, value(-1));

        assert_eq!(r.value().unwrap(), 0);
        text.set("x".to_string());
        assert_eq!(r.value().unwrap(), -1);
        text.set("7".to_string());
        assert_eq!(r.value().unwrap(), 7);
    }
}
