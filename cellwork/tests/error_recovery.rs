use std::fmt;

use cellwork::{computed, error, error_matching, mutable, on_error, on_error_matching, value, watch, CellError};

#[derive(Debug)]
struct Overflow;
impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overflow")
    }
}
impl std::error::Error for Overflow {}

#[derive(Debug)]
struct Underflow;
impl fmt::Display for Underflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "underflow")
    }
}
impl std::error::Error for Underflow {}

fn clamped(n: &cellwork::Cell<i64>) -> cellwork::Cell<i64> {
    let n = n.clone();
    computed(move || {
        let v = n.value()?;
        if v > 100 {
            Err(CellError::failed(Overflow))
        } else if v < 0 {
            Err(CellError::failed(Underflow))
        } else {
            Ok(v)
        }
    })
}

#[test]
fn on_error_substitutes_fallback_and_recovers() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let r = on_error(&c, value(-1));

    assert_eq!(r.value().unwrap(), 50);
    n.set(200);
    assert_eq!(r.value().unwrap(), -1, "any ordinary error falls back");
    n.set(70);
    assert_eq!(r.value().unwrap(), 70, "recovers once source succeeds again");
}

#[test]
fn on_error_matching_only_substitutes_for_the_matching_type() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let r = on_error_matching::<i64, Overflow>(&c, value(-1));

    assert_eq!(r.value().unwrap(), 50);

    n.set(200);
    assert_eq!(r.value().unwrap(), -1, "Overflow matches, falls back");

    n.set(-5);
    assert!(
        matches!(r.value(), Err(e) if e.downcast_ref::<Underflow>().is_some()),
        "Underflow does not match the filter, re-raised unchanged"
    );
}

#[test]
fn error_records_last_seen_error_and_clears_when_all_is_true() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let errs = error(&c, true);

    assert!(errs.value().unwrap().is_none());

    n.set(500);
    let e = errs.value().unwrap();
    assert!(e.is_some());
    assert!(e.unwrap().downcast_ref::<Overflow>().is_some());

    n.set(10);
    assert!(
        errs.value().unwrap().is_none(),
        "all=true clears the recorded error on the next successful recomputation"
    );
}

#[test]
fn error_keeps_last_seen_error_when_all_is_false() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let errs = error(&c, false);

    assert!(errs.value().unwrap().is_none());

    n.set(500);
    assert!(errs.value().unwrap().is_some());

    n.set(10);
    assert!(
        errs.value().unwrap().is_some(),
        "all=false keeps the last error sticking across a later success"
    );
}

#[test]
fn error_matching_ignores_non_matching_error_types() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let errs = error_matching::<i64, Overflow>(&c, true);

    n.set(-5);
    assert!(
        errs.value().unwrap().is_none(),
        "Underflow doesn't match the filter, last-seen stays untouched"
    );

    n.set(500);
    assert!(errs.value().unwrap().unwrap().downcast_ref::<Overflow>().is_some());
}

#[test]
fn on_error_reacts_through_a_watch() {
    let n = mutable(50i64);
    let c = clamped(&n.cell());
    let r = on_error(&c, value(-1));
    let observed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let observed2 = observed.clone();
    let r2 = r.clone();
    let w = watch(move || observed2.borrow_mut().push(r2.value().unwrap()));

    n.set(200);
    n.set(-5);
    n.set(30);

    assert_eq!(*observed.borrow(), vec![50, -1, -1, 30]);
    w.stop();
}
