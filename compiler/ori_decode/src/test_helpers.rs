#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

//! Shared test utilities for decoder tests.
//!
//! Builders for small encoded regions and one-call decode helpers.

use ori_graph::{
    BinaryOp, CompareOp, Constant, DeoptAction, DeoptReason, Graph, NoAnalysis, Op, Stamp,
};

use crate::decoder::{decode, PlainDecoder};
use crate::encoded::{EncodedGraph, EncodedGraphBuilder, EncodedNode, OrderId};
use crate::scope::RegionScope;
use crate::simplify::{DecodeOptions, SimplifyStats, SimplifyingDecoder};

/// Route decoder logs to the test output. Set `RUST_LOG` to see them.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn int(b: &mut EncodedGraphBuilder, value: i64) -> OrderId {
    b.push(EncodedNode::new(
        Op::Constant(Constant::Int(value)),
        Stamp::int(value),
    ))
}

pub(crate) fn logic(b: &mut EncodedGraphBuilder, value: bool) -> OrderId {
    b.push(EncodedNode::new(Op::LogicConstant(value), Stamp::Logic))
}

pub(crate) fn param(b: &mut EncodedGraphBuilder, index: u32) -> OrderId {
    b.push(EncodedNode::new(Op::Parameter(index), Stamp::INT))
}

pub(crate) fn guard_op(negated: bool) -> Op {
    Op::FixedGuard {
        negated,
        action: DeoptAction::InvalidateRecompile,
        reason: DeoptReason::ClassCastException,
    }
}

/// Order IDs of a region built by [`diamond`].
pub(crate) struct Diamond {
    pub graph: EncodedGraph,
    pub split: OrderId,
    pub then_begin: OrderId,
    pub else_begin: OrderId,
    pub merge: OrderId,
    pub phi: OrderId,
    pub ret: OrderId,
}

/// `Start → If(condition)`, each branch ending in one merge that returns
/// `Phi(then_value, else_value)`.
///
/// `values` pushes the condition and the two values, returning their IDs.
pub(crate) fn diamond(
    values: impl FnOnce(&mut EncodedGraphBuilder) -> (OrderId, OrderId, OrderId),
) -> Diamond {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let split = b.reserve();
    let then_begin = b.reserve();
    let else_begin = b.reserve();
    let then_end = b.reserve();
    let else_end = b.reserve();
    let merge = b.reserve();
    let ret = b.reserve();
    let (condition, then_value, else_value) = values(&mut b);
    let phi = b.push(
        EncodedNode::new(Op::Phi, Stamp::INT).with_inputs([merge, then_value, else_value]),
    );

    b.define(start, EncodedNode::control(Op::Start).with_successors([split]))
        .unwrap();
    b.define(
        split,
        EncodedNode::control(Op::If)
            .with_inputs([condition])
            .with_successors([then_begin, else_begin]),
    )
    .unwrap();
    b.define(then_begin, EncodedNode::control(Op::Begin).with_successors([then_end]))
        .unwrap();
    b.define(else_begin, EncodedNode::control(Op::Begin).with_successors([else_end]))
        .unwrap();
    b.define(then_end, EncodedNode::control(Op::End)).unwrap();
    b.define(else_end, EncodedNode::control(Op::End)).unwrap();
    b.define(
        merge,
        EncodedNode::control(Op::Merge)
            .with_inputs([then_end, else_end])
            .with_successors([ret]),
    )
    .unwrap();
    b.define(ret, EncodedNode::control(Op::Return).with_inputs([phi]))
        .unwrap();

    Diamond {
        graph: b.finish(start).unwrap(),
        split,
        then_begin,
        else_begin,
        merge,
        phi,
        ret,
    }
}

/// Order IDs of a region built by [`guarded`].
pub(crate) struct Guarded {
    pub graph: EncodedGraph,
    pub guard: OrderId,
    pub state: OrderId,
    pub pi: OrderId,
    pub ret: OrderId,
}

/// `Start → FixedGuard(condition, state) → Return(Pi(x, guard))`.
pub(crate) fn guarded(condition: bool, negated: bool) -> Guarded {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let guard = b.reserve();
    let ret = b.reserve();
    let x = param(&mut b, 0);
    let cond = logic(&mut b, condition);
    let state = b.push(EncodedNode::new(Op::FrameState { bci: 7 }, Stamp::Void).with_inputs([x]));
    let pi = b.push(EncodedNode::new(Op::Pi, Stamp::int_range(0, 100)).with_inputs([x, guard]));

    b.define(start, EncodedNode::control(Op::Start).with_successors([guard]))
        .unwrap();
    b.define(
        guard,
        EncodedNode::control(guard_op(negated))
            .with_inputs([cond, state])
            .with_successors([ret]),
    )
    .unwrap();
    b.define(ret, EncodedNode::control(Op::Return).with_inputs([pi]))
        .unwrap();

    Guarded {
        graph: b.finish(start).unwrap(),
        guard,
        state,
        pi,
        ret,
    }
}

/// Order IDs of a region built by [`counting_loop`].
pub(crate) struct CountingLoop {
    pub graph: EncodedGraph,
    pub header: OrderId,
    pub phi: OrderId,
    pub next: OrderId,
    pub ret: OrderId,
}

/// `Start → LoopBegin → If(phi < limit) → (LoopEnd | Return(phi))`, with
/// `phi = Phi(0, phi + 1)`.
///
/// With `condition`, the loop test is that constant instead.
pub(crate) fn counting_loop(condition: Option<bool>) -> CountingLoop {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let fwd = b.reserve();
    let header = b.reserve();
    let split = b.reserve();
    let body = b.reserve();
    let exit = b.reserve();
    let back = b.reserve();
    let ret = b.reserve();
    let zero = int(&mut b, 0);
    let one = int(&mut b, 1);
    let phi = b.reserve();
    let next = b.push(
        EncodedNode::new(Op::Binary(BinaryOp::Add), Stamp::INT).with_inputs([phi, one]),
    );
    let limit = param(&mut b, 0);
    let cmp = b.push(
        EncodedNode::new(Op::Compare(CompareOp::Lt), Stamp::Logic).with_inputs([phi, limit]),
    );
    b.define(phi, EncodedNode::new(Op::Phi, Stamp::INT).with_inputs([header, zero, next]))
        .unwrap();

    b.define(start, EncodedNode::control(Op::Start).with_successors([fwd]))
        .unwrap();
    b.define(fwd, EncodedNode::control(Op::End)).unwrap();
    b.define(
        header,
        EncodedNode::control(Op::LoopBegin)
            .with_inputs([fwd])
            .with_successors([split]),
    )
    .unwrap();
    let condition = match condition {
        Some(value) => logic(&mut b, value),
        None => cmp,
    };
    b.define(
        split,
        EncodedNode::control(Op::If)
            .with_inputs([condition])
            .with_successors([body, exit]),
    )
    .unwrap();
    b.define(body, EncodedNode::control(Op::Begin).with_successors([back]))
        .unwrap();
    b.define(exit, EncodedNode::control(Op::Begin).with_successors([ret]))
        .unwrap();
    b.define(back, EncodedNode::control(Op::LoopEnd).with_inputs([header]))
        .unwrap();
    b.define(ret, EncodedNode::control(Op::Return).with_inputs([phi]))
        .unwrap();

    CountingLoop {
        graph: b.finish(start).unwrap(),
        header,
        phi,
        next,
        ret,
    }
}

pub(crate) fn decode_plain(encoded: &EncodedGraph) -> (Graph, RegionScope) {
    init_tracing();
    let mut graph = Graph::new();
    let scope = decode(&mut PlainDecoder, &mut graph, encoded).unwrap();
    (graph, scope)
}

pub(crate) fn decode_simplifying(encoded: &EncodedGraph) -> (Graph, RegionScope, SimplifyStats) {
    init_tracing();
    let mut graph = Graph::new();
    let mut decoder = SimplifyingDecoder::new(&NoAnalysis, &NoAnalysis, DecodeOptions::default());
    let scope = decode(&mut decoder, &mut graph, encoded).unwrap();
    (graph, scope, decoder.stats())
}

/// Follow `next` edges from `from`, collecting the kinds seen.
pub(crate) fn control_chain(graph: &Graph, from: ori_graph::NodeId) -> Vec<Op> {
    let mut ops = vec![graph.op(from).clone()];
    let mut current = from;
    while let Some(next) = graph.next(current) {
        ops.push(graph.op(next).clone());
        current = next;
    }
    ops
}
