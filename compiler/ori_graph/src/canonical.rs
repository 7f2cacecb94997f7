//! Local rewrite rules.
//!
//! A rewrite rule looks at one node (its kind, stamp and inputs) and
//! proposes an equivalent, simpler node. Rules never edit the graph: they
//! return a [`Canonical`] and the caller decides how to integrate it.
//!
//! Rules receive a [`CanonicalizerTool`], which gives access to the
//! analysis providers and states the policy they must respect:
//!
//! - `canonicalize_reads()`: whether memory reads may be folded.
//! - `all_usages_available()`: whether the node's usage list is final.
//!   When `false`, a rule must not conclude that a node is unused.
//!
//! Which kinds have a rule at all is answered by [`is_canonicalizable`].

use smallvec::SmallVec;

use crate::node::{NewNode, NodeId};
use crate::op::{BinaryOp, CompareOp, Constant, DeoptAction, DeoptReason, FieldId, ObjectId, Op};
use crate::stamp::{Nullness, Stamp};
use crate::Graph;

/// Outcome of running a node's rewrite rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Canonical {
    /// The node is already in canonical form.
    Unchanged,
    /// No replacement yet. The node must stay in place: uses that have not
    /// been built yet may still need to attach to it.
    Defer,
    /// Use this node instead.
    Replace(Replacement),
}

/// A replacement proposed by a rewrite rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Replacement {
    /// A node that is already part of the graph.
    Existing(NodeId),
    /// A node that still has to be added.
    New(NewNode),
}

/// Type questions about the program being compiled.
pub trait MetaAccessProvider {
    /// Whether `field` can never change after its object is constructed.
    fn is_final_field(&self, field: FieldId) -> bool;
}

/// Access to the contents of compile-time constant objects.
pub trait ConstantReflectionProvider {
    /// Current value of `field` in `object`, if it is known.
    fn read_constant_field(&self, object: ObjectId, field: FieldId) -> Option<Constant>;
}

/// Providers with no knowledge: no field is final, no constant is readable.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAnalysis;

impl MetaAccessProvider for NoAnalysis {
    fn is_final_field(&self, _field: FieldId) -> bool {
        false
    }
}

impl ConstantReflectionProvider for NoAnalysis {
    fn read_constant_field(&self, _object: ObjectId, _field: FieldId) -> Option<Constant> {
        None
    }
}

/// Capability handed to rewrite rules.
pub trait CanonicalizerTool {
    fn meta_access(&self) -> &dyn MetaAccessProvider;

    fn constant_reflection(&self) -> &dyn ConstantReflectionProvider;

    /// Whether memory reads may be folded to constants.
    fn canonicalize_reads(&self) -> bool;

    /// Whether every future use of the node being examined already exists.
    fn all_usages_available(&self) -> bool;
}

/// The part of a node a rewrite rule looks at.
///
/// Built either from a live node or from a [`NewNode`] that has not been
/// added yet (in which case `id` is `None`).
#[derive(Clone, Debug)]
pub struct NodeView<'a> {
    pub id: Option<NodeId>,
    pub op: &'a Op,
    pub stamp: Stamp,
    pub inputs: SmallVec<[NodeId; 2]>,
}

impl<'a> NodeView<'a> {
    /// View of a live node.
    pub fn of(graph: &'a Graph, id: NodeId) -> Self {
        Self {
            id: Some(id),
            op: graph.op(id),
            stamp: *graph.stamp(id),
            inputs: graph.inputs(id).into(),
        }
    }

    /// View of a node that is not in the graph. `None` if some of its
    /// inputs are not in the graph either.
    pub fn of_new(node: &'a NewNode) -> Option<Self> {
        Some(Self {
            id: None,
            op: &node.op,
            stamp: node.stamp,
            inputs: node.live_inputs()?,
        })
    }

    fn input(&self, index: usize) -> Option<NodeId> {
        self.inputs.get(index).copied()
    }
}

/// Whether nodes of this kind carry a rewrite rule.
pub fn is_canonicalizable(op: &Op) -> bool {
    matches!(
        op,
        Op::LogicNegation
            | Op::IsNull
            | Op::Binary(_)
            | Op::Compare(_)
            | Op::Pi
            | Op::Placeholder
            | Op::Read { .. }
    )
}

/// Run the rewrite rule of `node`.
///
/// Kinds without a rule are always [`Canonical::Unchanged`].
pub fn canonical(graph: &Graph, node: &NodeView<'_>, tool: &dyn CanonicalizerTool) -> Canonical {
    match node.op {
        Op::LogicNegation => negation(graph, node),
        Op::IsNull => is_null(graph, node),
        Op::Binary(op) => binary(graph, node, *op),
        Op::Compare(op) => compare(graph, node, *op),
        Op::Pi => pi(graph, node),
        Op::Placeholder => Canonical::Defer,
        Op::Read { field, checked } => read(graph, node, *field, *checked, tool),
        _ => Canonical::Unchanged,
    }
}

fn existing(id: NodeId) -> Canonical {
    Canonical::Replace(Replacement::Existing(id))
}

fn new(node: NewNode) -> Canonical {
    Canonical::Replace(Replacement::New(node))
}

fn logic_constant(value: bool) -> Canonical {
    new(NewNode::new(Op::LogicConstant(value), Stamp::Logic))
}

fn int_constant(value: i64) -> NewNode {
    NewNode::new(Op::Constant(Constant::Int(value)), Stamp::int(value))
}

fn as_int(graph: &Graph, id: NodeId) -> Option<i64> {
    match graph.op(id) {
        Op::Constant(Constant::Int(v)) => Some(*v),
        _ => None,
    }
}

fn negation(graph: &Graph, node: &NodeView<'_>) -> Canonical {
    let Some(value) = node.input(0) else {
        return Canonical::Unchanged;
    };
    match graph.op(value) {
        Op::LogicConstant(b) => logic_constant(!b),
        Op::LogicNegation => graph
            .inputs(value)
            .first()
            .map_or(Canonical::Unchanged, |&inner| existing(inner)),
        _ => Canonical::Unchanged,
    }
}

fn is_null(graph: &Graph, node: &NodeView<'_>) -> Canonical {
    let Some(object) = node.input(0) else {
        return Canonical::Unchanged;
    };
    match graph.stamp(object).nullness() {
        Some(Nullness::AlwaysNull) => logic_constant(true),
        Some(Nullness::NonNull) => logic_constant(false),
        _ => Canonical::Unchanged,
    }
}

fn compare(graph: &Graph, node: &NodeView<'_>, op: CompareOp) -> Canonical {
    let (Some(x), Some(y)) = (node.input(0), node.input(1)) else {
        return Canonical::Unchanged;
    };
    if x == y {
        return logic_constant(op.reflexive());
    }
    if let (Some(a), Some(b)) = (as_int(graph, x), as_int(graph, y)) {
        return logic_constant(op.eval(a, b));
    }
    // Decide from disjoint ranges.
    if let (Stamp::Int { lo: xl, hi: xh }, Stamp::Int { lo: yl, hi: yh }) =
        (*graph.stamp(x), *graph.stamp(y))
    {
        let decided = match op {
            CompareOp::Lt if xh < yl => Some(true),
            CompareOp::Lt if xl >= yh => Some(false),
            CompareOp::Gt if xl > yh => Some(true),
            CompareOp::Gt if xh <= yl => Some(false),
            CompareOp::Eq if xh < yl || yh < xl => Some(false),
            CompareOp::Ne if xh < yl || yh < xl => Some(true),
            _ => None,
        };
        if let Some(value) = decided {
            return logic_constant(value);
        }
    }
    Canonical::Unchanged
}

fn binary(graph: &Graph, node: &NodeView<'_>, op: BinaryOp) -> Canonical {
    let (Some(x), Some(y)) = (node.input(0), node.input(1)) else {
        return Canonical::Unchanged;
    };
    match (as_int(graph, x), as_int(graph, y)) {
        (Some(a), Some(b)) => op
            .eval(a, b)
            .map_or(Canonical::Unchanged, |v| new(int_constant(v))),
        (_, Some(0)) if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or) => existing(x),
        (Some(0), _) if matches!(op, BinaryOp::Add | BinaryOp::Or) => existing(y),
        (_, Some(1)) if op == BinaryOp::Mul => existing(x),
        (Some(1), _) if op == BinaryOp::Mul => existing(y),
        (None, Some(c2)) if op == BinaryOp::Add => reassociate_add(graph, node, x, c2),
        _ => Canonical::Unchanged,
    }
}

/// `(v + c1) + c2` → `v + (c1 + c2)`.
fn reassociate_add(graph: &Graph, node: &NodeView<'_>, x: NodeId, c2: i64) -> Canonical {
    if graph.op(x) != &Op::Binary(BinaryOp::Add) {
        return Canonical::Unchanged;
    }
    let [inner, c1] = graph.inputs(x) else {
        return Canonical::Unchanged;
    };
    let Some(c1) = as_int(graph, *c1) else {
        return Canonical::Unchanged;
    };
    new(NewNode::new(Op::Binary(BinaryOp::Add), node.stamp)
        .with_inputs([*inner])
        .with_new_input(int_constant(c1.wrapping_add(c2))))
}

fn pi(graph: &Graph, node: &NodeView<'_>) -> Canonical {
    let Some(value) = node.input(0) else {
        return Canonical::Unchanged;
    };
    if graph.stamp(value).is_subset_of(&node.stamp) {
        existing(value)
    } else {
        Canonical::Unchanged
    }
}

fn read(
    graph: &Graph,
    node: &NodeView<'_>,
    field: FieldId,
    checked: bool,
    tool: &dyn CanonicalizerTool,
) -> Canonical {
    let Some(object) = node.input(0) else {
        return Canonical::Unchanged;
    };
    let nullness = graph.stamp(object).nullness();
    if nullness == Some(Nullness::AlwaysNull) {
        return new(NewNode::new(
            Op::Deoptimize {
                action: DeoptAction::InvalidateReprofile,
                reason: DeoptReason::NullCheckException,
            },
            Stamp::Void,
        ));
    }
    if tool.canonicalize_reads() && tool.meta_access().is_final_field(field) {
        if let Op::Constant(Constant::Object(handle)) = graph.op(object) {
            if let Some(value) = tool.constant_reflection().read_constant_field(*handle, field) {
                return new(NewNode::new(
                    Op::Constant(value),
                    Stamp::for_constant(&value),
                ));
            }
        }
    }
    if checked && nullness == Some(Nullness::NonNull) {
        return new(NewNode::new(
            Op::Read {
                field,
                checked: false,
            },
            node.stamp,
        )
        .with_inputs([object]));
    }
    Canonical::Unchanged
}

#[cfg(test)]
mod tests;
