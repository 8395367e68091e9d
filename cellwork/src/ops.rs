//! Operator sugar: arithmetic, bitwise, comparison, `abs`,
//! `round`, logical `logand`/`logor`/`lognot` and `select`, each building
//! a structurally-keyed computed cell through [`computed_structural`] so
//! that two independently written `a + b` expressions share one
//! underlying node. This module stays a thin, repetitive shell around
//! one macro rather than growing its own abstraction.

use crate::{cell::Cell, computed::computed_structural};
use cellwork_core::CellKey;

/// Builds a two-operand structurally-keyed computed cell. `tag` must be
/// stable and unique per operator so unrelated expressions never collide
/// under [`CellKey::structural`].
fn binary<A, B, T>(
    tag: &'static str,
    lhs: &Cell<A>,
    rhs: &Cell<B>,
    f: impl Fn(A, B) -> T + 'static,
) -> Cell<T>
where
    A: Clone + PartialEq + 'static,
    B: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    let key = CellKey::structural(tag, vec![lhs.key(), rhs.key()]);
    let (lhs, rhs) = (lhs.clone(), rhs.clone());
    computed_structural(key, move || Ok(f(lhs.value()?, rhs.value()?)))
}

fn unary<A, T>(tag: &'static str, src: &Cell<A>, f: impl Fn(A) -> T + 'static) -> Cell<T>
where
    A: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
{
    let key = CellKey::structural(tag, vec![src.key()]);
    let src = src.clone();
    computed_structural(key, move || Ok(f(src.value()?)))
}

macro_rules! arith_op {
    ($name:ident, $tag:literal, $trait:ident, $method:ident) => {
        /// Builds a computed cell for `lhs $tag rhs`.
        pub fn $name<A, B, T>(lhs: &Cell<A>, rhs: &Cell<B>) -> Cell<T>
        where
            A: Clone + PartialEq + std::ops::$trait<B, Output = T> + 'static,
            B: Clone + PartialEq + 'static,
            T: Clone + PartialEq + 'static,
        {
            binary($tag, lhs, rhs, |a, b| std::ops::$trait::$method(a, b))
        }
    };
}

arith_op!(add, "add", Add, add);
arith_op!(sub, "sub", Sub, sub);
arith_op!(mul, "mul", Mul, mul);
arith_op!(div, "div", Div, div);
arith_op!(rem, "rem", Rem, rem);
arith_op!(bitand, "bitand", BitAnd, bitand);
arith_op!(bitor, "bitor", BitOr, bitor);
arith_op!(bitxor, "bitxor", BitXor, bitxor);

/// `!source`.
pub fn not<A, T>(source: &Cell<A>) -> Cell<T>
where
    A: Clone + PartialEq + std::ops::Not<Output = T> + 'static,
    T: Clone + PartialEq + 'static,
{
    unary("not", source, std::ops::Not::not)
}

macro_rules! cmp_op {
    ($name:ident, $tag:literal, $op:tt) => {
        /// Builds a boolean computed cell for `lhs $tag rhs`.
        pub fn $name<A, B>(lhs: &Cell<A>, rhs: &Cell<B>) -> Cell<bool>
        where
            A: Clone + PartialEq + PartialOrd<B> + 'static,
            B: Clone + PartialEq + 'static,
        {
            binary($tag, lhs, rhs, |a, b| a $op b)
        }
    };
}

cmp_op!(lt, "lt", <);
cmp_op!(le, "le", <=);
cmp_op!(gt, "gt", >);
cmp_op!(ge, "ge", >=);

/// `lhs == rhs`.
pub fn eq<A, B>(lhs: &Cell<A>, rhs: &Cell<B>) -> Cell<bool>
where
    A: Clone + PartialEq + PartialEq<B> + 'static,
    B: Clone + PartialEq + 'static,
{
    binary("eq", lhs, rhs, |a, b| a == b)
}

/// `lhs != rhs`.
pub fn ne<A, B>(lhs: &Cell<A>, rhs: &Cell<B>) -> Cell<bool>
where
    A: Clone + PartialEq + PartialEq<B> + 'static,
    B: Clone + PartialEq + 'static,
{
    binary("ne", lhs, rhs, |a, b| a != b)
}

/// `source.abs()`.
pub fn abs<A, T>(source: &Cell<A>) -> Cell<T>
where
    A: Clone + PartialEq + 'static,
    T: Clone + PartialEq + 'static,
    A: AbsLike<Output = T>,
{
    unary("abs", source, AbsLike::abs_like)
}

/// `source.round()`.
pub fn round<A>(source: &Cell<A>) -> Cell<A>
where
    A: Clone + PartialEq + RoundLike + 'static,
{
    unary("round", source, RoundLike::round_like)
}

/// A value type that has an absolute value. Implemented for the signed
/// primitive numeric types; floats go through [`f64::abs`] (and
/// `f32::abs`), integers through their inherent `abs`.
pub trait AbsLike {
    type Output;
    fn abs_like(self) -> Self::Output;
}
macro_rules! impl_abs_like {
    ($($t:ty),+) => {
        $(impl AbsLike for $t {
            type Output = $t;
            fn abs_like(self) -> $t { self.abs() }
        })+
    };
}
impl_abs_like!(i8, i16, i32, i64, i128, isize, f32, f64);

/// A value type that can round to the nearest integer-valued self
///.
pub trait RoundLike {
    fn round_like(self) -> Self;
}
impl RoundLike for f32 {
    fn round_like(self) -> Self {
        self.round()
    }
}
impl RoundLike for f64 {
    fn round_like(self) -> Self {
        self.round()
    }
}

/// `lhs || rhs` with short-circuit-free (both sides always tracked)
/// boolean evaluation. Both operands are read every
/// recomputation so that argument tracking always discovers
/// both as dependencies, unlike Rust's short-circuiting `||`.
pub fn logor(lhs: &Cell<bool>, rhs: &Cell<bool>) -> Cell<bool> {
    binary("logor", lhs, rhs, |a, b| a || b)
}

/// `lhs && rhs`, both operands always tracked.
pub fn logand(lhs: &Cell<bool>, rhs: &Cell<bool>) -> Cell<bool> {
    binary("logand", lhs, rhs, |a, b| a && b)
}

/// `!source` on a boolean cell.
pub fn lognot(source: &Cell<bool>) -> Cell<bool> {
    unary("lognot", source, |a| !a)
}

/// `cond.select(if_true, if_false)`: a computed cell
/// that reads `cond` and then exactly one of `if_true`/`if_false`. Only
/// the branch taken on a given recomputation is read, so argument
/// tracking only subscribes to that branch -- selecting the other branch
/// later re-subscribes accordingly.
pub fn select<T: Clone + PartialEq + 'static>(
    cond: &Cell<bool>,
    if_true: &Cell<T>,
    if_false: &Cell<T>,
) -> Cell<T> {
    let key = CellKey::structural(
        "select",
        vec![cond.key(), if_true.key(), if_false.key()],
    );
    let (cond, if_true, if_false) = (cond.clone(), if_true.clone(), if_false.clone());
    computed_structural(key, move || {
        if cond.value()? {
            if_true.value()
        } else {
            if_false.value()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constant::value, mutable::mutable};

    #[test]
    fn structurally_identical_expressions_share_state() {
        let a = mutable(1i64);
        let b = mutable(2i64);
        let sum1 = add(&a.cell(), &b.cell());
        let sum2 = add(&a.cell(), &b.cell());
        assert_eq!(sum1.key(), sum2.key());
        assert!(
            std::rc::Rc::ptr_eq(sum1.node(), sum2.node()),
            "two independently built a+b cells must share one underlying node"
        );
        assert_eq!(sum1.value().unwrap(), 3);
        assert_eq!(sum2.value().unwrap(), 3);
    }

    #[test]
    fn select_only_reads_taken_branch() {
        let cond = mutable(true);
        let c = mutable(1i64);
        let d = mutable(2i64);
        let cell = select(&cond.cell(), &c.cell(), &d.cell());
        assert_eq!(cell.value().unwrap(), 1);
        cond.set(false);
        assert_eq!(cell.value().unwrap(), 2);
        let _ = value(0i64);
    }

    #[test]
    fn logor_tracks_both_operands() {
        let a = mutable(false);
        let b = mutable(false);
        let cond = logor(&a.cell(), &b.cell());
        assert!(!cond.value().unwrap());
        a.set(true);
        assert!(cond.value().unwrap());
        a.set(false);
        b.set(true);
        assert!(cond.value().unwrap());
    }
}
