//! Stamps: the abstraction of a node's possible runtime values.
//!
//! Stamps form a lattice per value category. [`Stamp::meet`] computes the
//! union of two stamps (used when several values flow into a phi) and
//! [`Stamp::join`] their intersection (used to check whether a narrowing is
//! already implied).
//!
//! ```text
//!              Any
//!      ┌────────┼─────────┐
//!    Int      Object     Logic
//!   [lo,hi]  (nullness)
//!      └────────┼─────────┘
//!             Empty
//! ```
//!
//! `Void` is the stamp of nodes that produce no value (control nodes).
//! It only meets with itself.

use crate::op::Constant;

/// What is known about whether an object value is null.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Nullness {
    MaybeNull,
    NonNull,
    AlwaysNull,
}

impl Nullness {
    fn meet(self, other: Nullness) -> Nullness {
        if self == other {
            self
        } else {
            Nullness::MaybeNull
        }
    }

    /// `None` when the two facts contradict each other.
    fn join(self, other: Nullness) -> Option<Nullness> {
        match (self, other) {
            (Nullness::MaybeNull, n) | (n, Nullness::MaybeNull) => Some(n),
            (a, b) if a == b => Some(a),
            _ => None,
        }
    }
}

/// Abstraction of the values a node may produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Stamp {
    /// No value (control nodes, stores).
    Void,
    /// No possible value: the node is unreachable.
    Empty,
    /// Nothing is known.
    Any,
    /// A condition.
    Logic,
    /// An integer in the inclusive range `[lo, hi]`.
    Int { lo: i64, hi: i64 },
    /// An object reference.
    Object(Nullness),
}

impl Stamp {
    /// The unrestricted integer stamp.
    pub const INT: Stamp = Stamp::Int {
        lo: i64::MIN,
        hi: i64::MAX,
    };

    /// Object reference that may be null.
    pub const OBJECT: Stamp = Stamp::Object(Nullness::MaybeNull);

    /// Exact integer stamp.
    #[inline]
    pub const fn int(value: i64) -> Stamp {
        Stamp::Int {
            lo: value,
            hi: value,
        }
    }

    /// Integer range stamp. An inverted range is empty.
    pub fn int_range(lo: i64, hi: i64) -> Stamp {
        if lo > hi {
            Stamp::Empty
        } else {
            Stamp::Int { lo, hi }
        }
    }

    /// The most precise stamp describing `constant`.
    pub fn for_constant(constant: &Constant) -> Stamp {
        match constant {
            Constant::Int(v) => Stamp::int(*v),
            Constant::Null => Stamp::Object(Nullness::AlwaysNull),
            Constant::Object(_) => Stamp::Object(Nullness::NonNull),
        }
    }

    /// The single integer this stamp admits, if any.
    pub fn as_int_constant(&self) -> Option<i64> {
        match *self {
            Stamp::Int { lo, hi } if lo == hi => Some(lo),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Stamp::Empty)
    }

    /// Nullness of an object stamp. `None` for non-object stamps.
    pub fn nullness(&self) -> Option<Nullness> {
        match self {
            Stamp::Object(n) => Some(*n),
            _ => None,
        }
    }

    /// Least upper bound: every value of `self` or `other`.
    #[must_use]
    pub fn meet(&self, other: &Stamp) -> Stamp {
        match (*self, *other) {
            (Stamp::Empty, s) | (s, Stamp::Empty) => s,
            (Stamp::Void, Stamp::Void) => Stamp::Void,
            (Stamp::Logic, Stamp::Logic) => Stamp::Logic,
            (Stamp::Int { lo: a, hi: b }, Stamp::Int { lo: c, hi: d }) => Stamp::Int {
                lo: a.min(c),
                hi: b.max(d),
            },
            (Stamp::Object(a), Stamp::Object(b)) => Stamp::Object(a.meet(b)),
            _ => Stamp::Any,
        }
    }

    /// Greatest lower bound: only values admitted by both.
    #[must_use]
    pub fn join(&self, other: &Stamp) -> Stamp {
        match (*self, *other) {
            (Stamp::Any, s) | (s, Stamp::Any) => s,
            (Stamp::Void, Stamp::Void) => Stamp::Void,
            (Stamp::Logic, Stamp::Logic) => Stamp::Logic,
            (Stamp::Int { lo: a, hi: b }, Stamp::Int { lo: c, hi: d }) => {
                Stamp::int_range(a.max(c), b.min(d))
            }
            (Stamp::Object(a), Stamp::Object(b)) => a.join(b).map_or(Stamp::Empty, Stamp::Object),
            _ => Stamp::Empty,
        }
    }

    /// `true` if every value of `self` is also a value of `other`.
    pub fn is_subset_of(&self, other: &Stamp) -> bool {
        self.join(other) == *self
    }
}
