use std::{
    fmt::{self, Debug, Formatter},
    rc::Rc,
};

/// A stable identity for a cell.
///
/// Two cells with equal keys are semantically interchangeable: reading one
/// is indistinguishable from reading the other. Plain cells (`value`,
/// `mutable`, `computed`) get an [`CellKey::Identity`] key that is unique
/// per construction. Expression-sugar cells built by `cellwork`'s operator
/// module instead carry a [`CellKey::Structural`] key derived from an
/// operator tag plus the keys of their operands, so that two independently
/// written `a + b` expressions compare equal and can share propagation
/// state (see `ops::intern` in the `cellwork` crate).
#[derive(Clone)]
pub enum CellKey {
    Identity(u64),
    Structural(Rc<Structural>),
}

/// The payload of a [`CellKey::Structural`] key: an operator tag and the
/// keys of its operands, in order.
#[derive(PartialEq, Eq, Hash)]
pub struct Structural {
    pub tag: &'static str,
    pub operands: Vec<CellKey>,
}

impl CellKey {
    /// Allocates a fresh identity key. Never equal to any other key,
    /// including one produced by a later call to this function.
    pub fn fresh_identity() -> Self {
        CellKey::Identity(next_identity())
    }

    /// Builds a structural key from an operator tag and operand keys.
    pub fn structural(tag: &'static str, operands: Vec<CellKey>) -> Self {
        CellKey::Structural(Rc::new(Structural { tag, operands }))
    }
}

fn next_identity() -> u64 {
    thread_local! {
        static COUNTER: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
    }
    COUNTER.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

impl PartialEq for CellKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellKey::Identity(a), CellKey::Identity(b)) => a == b,
            (CellKey::Structural(a), CellKey::Structural(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}
impl Eq for CellKey {}

impl std::hash::Hash for CellKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            CellKey::Identity(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            CellKey::Structural(s) => {
                1u8.hash(state);
                s.tag.hash(state);
                s.operands.hash(state);
            }
        }
    }
}

impl Debug for CellKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CellKey::Identity(id) => write!(f, "Identity({id})"),
            CellKey::Structural(s) => {
                f.debug_tuple(s.tag).field(&s.operands).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keys_are_unique() {
        let a = CellKey::fresh_identity();
        let b = CellKey::fresh_identity();
        assert_ne!(a, b);
    }

    #[test]
    fn structural_keys_compare_by_value() {
        let leaf = CellKey::fresh_identity();
        let a = CellKey::structural("add", vec![leaf.clone(), leaf.clone()]);
        let b = CellKey::structural("add", vec![leaf.clone(), leaf.clone()]);
        assert_eq!(a, b);

        let c = CellKey::structural("mul", vec![leaf.clone(), leaf]);
        assert_ne!(a, c);
    }
}
