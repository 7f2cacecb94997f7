#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

//! Shared test utilities for graph tests.
//!
//! Factory functions for the nodes most tests need. Only compiled in test
//! builds.

use crate::node::{NewNode, NodeId};
use crate::op::{Constant, Op};
use crate::stamp::Stamp;
use crate::Graph;

/// Add an integer parameter.
pub(crate) fn param(g: &mut Graph, index: u32) -> NodeId {
    g.add(NewNode::new(Op::Parameter(index), Stamp::INT)).unwrap()
}

/// Add (or reuse) an integer constant.
pub(crate) fn int(g: &mut Graph, value: i64) -> NodeId {
    g.add_or_unique(NewNode::new(
        Op::Constant(Constant::Int(value)),
        Stamp::int(value),
    ))
    .unwrap()
}

/// Add (or reuse) a logic constant.
pub(crate) fn logic(g: &mut Graph, value: bool) -> NodeId {
    g.add_or_unique(NewNode::new(Op::LogicConstant(value), Stamp::Logic))
        .unwrap()
}

/// Add a fixed node with the given inputs and no successors attached.
pub(crate) fn fixed(g: &mut Graph, op: Op, inputs: &[NodeId]) -> NodeId {
    g.add(NewNode::new(op, Stamp::Void).with_inputs(inputs.iter().copied()))
        .unwrap()
}

/// Chain sequential fixed nodes: `nodes[0] → nodes[1] → ...`.
pub(crate) fn chain(g: &mut Graph, nodes: &[NodeId]) {
    for pair in nodes.windows(2) {
        g.set_next(pair[0], Some(pair[1])).unwrap();
    }
}

/// `Start → If(cond)` with both begin successors attached, each begin
/// followed by an `End` flowing into one merge. Returns
/// `(start, if, true_begin, false_begin, merge)`.
pub(crate) fn diamond(g: &mut Graph, cond: NodeId) -> (NodeId, NodeId, NodeId, NodeId, NodeId) {
    let start = fixed(g, Op::Start, &[]);
    let split = fixed(g, Op::If, &[cond]);
    let t = fixed(g, Op::Begin, &[]);
    let f = fixed(g, Op::Begin, &[]);
    let t_end = fixed(g, Op::End, &[]);
    let f_end = fixed(g, Op::End, &[]);
    let merge = fixed(g, Op::Merge, &[t_end, f_end]);
    g.set_next(start, Some(split)).unwrap();
    g.set_successor(split, 0, Some(t)).unwrap();
    g.set_successor(split, 1, Some(f)).unwrap();
    g.set_next(t, Some(t_end)).unwrap();
    g.set_next(f, Some(f_end)).unwrap();
    (start, split, t, f, merge)
}
