//! The injectable error sink for watch callbacks.

use std::{any::Any, cell::RefCell, rc::Rc};

/// What a watch callback's caught panic payload looks like once it
/// reaches a sink. `std::panic::catch_unwind`'s payload type, kept
/// type-erased since panic payloads in practice are almost always
/// `&'static str`/`String`.
pub type PanicPayload = Box<dyn Any + Send>;

/// A callback invoked with a watch callback's caught error.
pub type ErrorSink = Rc<dyn Fn(&PanicPayload)>;

thread_local! {
    static HOOK: RefCell<ErrorSink> = RefCell::new(Rc::new(default_hook));
}

fn default_hook(payload: &PanicPayload) {
    tracing::warn!(message = %describe(payload), "uncaught error in watch callback");
}

/// Renders a caught panic payload as text for logging, matching the
/// common payload shapes `std::panic::catch_unwind` actually produces.
pub fn describe(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Installs the process-wide default sink for watch callback errors that
/// did not specify their own `error_sink`. Analogous in spirit to
/// `std::panic::set_hook`.
pub fn set_uncaught_error_hook(hook: impl Fn(&PanicPayload) + 'static) {
    HOOK.with(|h| *h.borrow_mut() = Rc::new(hook));
}

/// Restores the default (tracing-based) uncaught-error hook.
pub fn reset_uncaught_error_hook() {
    HOOK.with(|h| *h.borrow_mut() = Rc::new(default_hook));
}

pub(crate) fn report(sink: Option<&ErrorSink>, payload: &PanicPayload) {
    match sink {
        Some(sink) => sink(payload),
        None => HOOK.with(|h| (h.borrow())(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    #[test]
    fn custom_hook_overrides_default() {
        let seen = Rc::new(StdCell::new(false));
        let seen2 = seen.clone();
        set_uncaught_error_hook(move |_| seen2.set(true));
        report(None, &(Box::new("boom") as PanicPayload));
        assert!(seen.get());
        reset_uncaught_error_hook();
    }
}
