//! Node kinds.
//!
//! Every node in the graph carries exactly one [`Op`]. The op decides the
//! node's edge layout (which input slots and successor slots it has) and
//! its class: fixed with a `next` edge, control split, end, control sink,
//! or floating.
//!
//! # Edge Layout
//!
//! | Kind | inputs | successors |
//! |---|---|---|
//! | `Start`, `Begin`, `KillingBegin` | – | `[next]` |
//! | `Merge` | forward ends | `[next]` |
//! | `LoopBegin` | `[forward end]` | `[next]` |
//! | `FixedGuard` | `[condition, state?]` | `[next]` |
//! | `Read` | `[object]` | `[next]` |
//! | `Write` | `[object, value]` | `[next]` |
//! | `If` | `[condition]` | `[true, false]` |
//! | `Switch` | `[selector]` | `[key0, .., default]` |
//! | `End` | – | – |
//! | `LoopEnd` | `[loop begin]` | – |
//! | `Return` | `[value?]` | – |
//! | `Deoptimize` | `[state?]` | – |
//! | `Pi` | `[value, anchor]` | – |
//! | `Phi` | `[merge, values..]` | – |
//! | `FrameState` | values | – |
//!
//! All other floating kinds take their operands as inputs in order.

use std::fmt;

/// Field identifier, opaque to the graph.
///
/// Only the analysis providers attach meaning to a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FieldId(u32);

impl FieldId {
    /// Create a field ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Handle to a heap object known at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Create an object handle from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A compile-time constant value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Int(i64),
    Null,
    Object(ObjectId),
}

/// What the runtime should do with the compiled code after a deoptimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum DeoptAction {
    None,
    InvalidateReprofile,
    InvalidateRecompile,
}

/// Why a deoptimization happened. Carried through for failure reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum DeoptReason {
    NullCheckException,
    BoundsCheckException,
    ClassCastException,
    UnreachedCode,
    TransferToInterpreter,
}

/// Integer arithmetic operator for [`Op::Binary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    /// Evaluate on two constants with wrapping semantics.
    ///
    /// Returns `None` where the operation would trap (division by zero).
    pub fn eval(self, x: i64, y: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => Some(x.wrapping_add(y)),
            BinaryOp::Sub => Some(x.wrapping_sub(y)),
            BinaryOp::Mul => Some(x.wrapping_mul(y)),
            BinaryOp::Div => (y != 0).then(|| x.wrapping_div(y)),
            BinaryOp::And => Some(x & y),
            BinaryOp::Or => Some(x | y),
            BinaryOp::Xor => Some(x ^ y),
        }
    }
}

/// Integer comparison for [`Op::Compare`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn eval(self, x: i64, y: i64) -> bool {
        match self {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        }
    }

    /// Result of comparing a value against itself.
    pub fn reflexive(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Le | CompareOp::Ge)
    }
}

/// The kind of a graph node.
///
/// See the module docs for the edge layout of each kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    // ── Fixed, with a `next` successor ──────────────────────────
    /// Entry of a unit.
    Start,
    /// Entry of a control-split successor.
    Begin,
    /// Begin that also kills memory state.
    KillingBegin,
    /// Join point of forward ends.
    Merge,
    /// Loop header. Back edges are `LoopEnd` usages.
    LoopBegin,
    /// Deoptimize unless `condition` (xor `negated`) holds.
    FixedGuard {
        negated: bool,
        action: DeoptAction,
        reason: DeoptReason,
    },
    /// Field load. A checked read carries an implicit null check.
    Read { field: FieldId, checked: bool },
    /// Field store.
    Write { field: FieldId },

    // ── Control splits ──────────────────────────────────────────
    If,
    /// Integer switch. One successor per key, then the default.
    Switch { keys: Box<[i64]> },

    // ── Ends and sinks ──────────────────────────────────────────
    End,
    LoopEnd,
    Return,
    Deoptimize {
        action: DeoptAction,
        reason: DeoptReason,
    },

    // ── Floating ────────────────────────────────────────────────
    Parameter(u32),
    Constant(Constant),
    LogicConstant(bool),
    LogicNegation,
    IsNull,
    Binary(BinaryOp),
    Compare(CompareOp),
    /// Narrows `value` to this node's stamp, anchored to a guard or begin.
    Pi,
    Phi,
    /// Input-free stand-in left behind by a guard that always passes.
    /// Nodes that depend on the guard keep depending on this instead.
    Placeholder,
    /// Interpreter state snapshot used to resume after a deoptimization.
    FrameState { bci: u32 },
}

impl Op {
    /// Fixed nodes take part in the control-flow chain.
    pub fn is_fixed(&self) -> bool {
        !self.is_floating()
    }

    pub fn is_floating(&self) -> bool {
        matches!(
            self,
            Op::Parameter(_)
                | Op::Constant(_)
                | Op::LogicConstant(_)
                | Op::LogicNegation
                | Op::IsNull
                | Op::Binary(_)
                | Op::Compare(_)
                | Op::Pi
                | Op::Phi
                | Op::Placeholder
                | Op::FrameState { .. }
        )
    }

    /// Sequential fixed nodes with exactly one `next` successor.
    pub fn is_fixed_with_next(&self) -> bool {
        matches!(
            self,
            Op::Start
                | Op::Begin
                | Op::KillingBegin
                | Op::Merge
                | Op::LoopBegin
                | Op::FixedGuard { .. }
                | Op::Read { .. }
                | Op::Write { .. }
        )
    }

    pub fn is_control_split(&self) -> bool {
        matches!(self, Op::If | Op::Switch { .. })
    }

    /// Terminal nodes: no successor and no merge to flow into.
    pub fn is_control_sink(&self) -> bool {
        matches!(self, Op::Return | Op::Deoptimize { .. })
    }

    /// Plain begin nodes (successor entries of a split).
    pub fn is_begin(&self) -> bool {
        matches!(self, Op::Begin | Op::KillingBegin)
    }

    /// Merges and loop headers.
    pub fn is_abstract_merge(&self) -> bool {
        matches!(self, Op::Merge | Op::LoopBegin)
    }

    /// Number of successor slots a node of this kind owns.
    pub fn successor_count(&self) -> usize {
        match self {
            Op::If => 2,
            Op::Switch { keys } => keys.len() + 1,
            op if op.is_fixed_with_next() => 1,
            _ => 0,
        }
    }

    /// Whether two nodes of this kind with equal stamps and inputs are
    /// interchangeable.
    ///
    /// Phis are tied to their merge position, frame states to their
    /// bytecode position and placeholders to the guard they replaced, so
    /// none of them is shared.
    pub fn is_value_numberable(&self) -> bool {
        self.is_floating() && !matches!(self, Op::Phi | Op::Placeholder | Op::FrameState { .. })
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::FixedGuard { negated, .. } => {
                write!(f, "FixedGuard{}", if *negated { "(negated)" } else { "" })
            }
            Op::Read { field, checked } => write!(
                f,
                "Read(f{}{})",
                field.raw(),
                if *checked { ", checked" } else { "" }
            ),
            Op::Write { field } => write!(f, "Write(f{})", field.raw()),
            Op::Switch { keys } => write!(f, "Switch({keys:?})"),
            Op::Deoptimize { reason, .. } => write!(f, "Deoptimize({reason:?})"),
            Op::Parameter(index) => write!(f, "Parameter({index})"),
            Op::Constant(c) => write!(f, "Constant({c:?})"),
            Op::LogicConstant(b) => write!(f, "LogicConstant({b})"),
            Op::Binary(op) => write!(f, "Binary({op:?})"),
            Op::Compare(op) => write!(f, "Compare({op:?})"),
            Op::FrameState { bci } => write!(f, "FrameState(@{bci})"),
            other => write!(f, "{other:?}"),
        }
    }
}
