#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use ori_graph::{BinaryOp, Op, Stamp};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{diamond, int, logic, param};

fn reason(result: Result<EncodedGraph, DecodeError>) -> &'static str {
    match result {
        Err(DecodeError::Malformed { reason, .. }) => reason,
        other => panic!("expected a malformed encoding, got {other:?}"),
    }
}

fn start_to(b: &mut EncodedGraphBuilder, next: OrderId) -> OrderId {
    b.push(EncodedNode::control(Op::Start).with_successors([next]))
}

#[test]
fn diamond_indexes_ends_and_phis() {
    let d = diamond(|b| (logic(b, true), int(b, 1), int(b, 2)));
    let merge = d.graph.node(d.merge);

    for &end in &merge.inputs {
        assert_eq!(d.graph.end_target(end), Some(d.merge));
    }
    assert_eq!(d.graph.phis(d.merge), &[d.phi]);
    assert!(d.graph.phis(d.split).is_empty());
    assert_eq!(d.graph.iter().count(), d.graph.len());
}

#[test]
fn reserve_and_define() {
    let mut b = EncodedGraphBuilder::new();
    let ret = b.reserve();
    let start = start_to(&mut b, ret);
    assert!(matches!(
        b.define(OrderId::new(9), EncodedNode::control(Op::Return)),
        Err(DecodeError::Malformed { .. })
    ));
    b.define(ret, EncodedNode::control(Op::Return)).unwrap();
    assert!(b.define(ret, EncodedNode::control(Op::Return)).is_err());

    // Start comes after its successor here.
    assert_eq!(reason(b.finish(start)), "successor precedes its predecessor");
}

#[test]
fn undefined_reservation() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.push(EncodedNode::control(Op::Start));
    let _hole = b.reserve();
    assert!(matches!(
        b.finish(start),
        Err(DecodeError::Malformed { order_id, reason: "reserved but never defined" })
            if order_id == OrderId::new(1)
    ));
}

#[test]
fn start_must_be_a_start_node() {
    let mut b = EncodedGraphBuilder::new();
    let ret = b.push(EncodedNode::control(Op::Return));
    assert_eq!(reason(b.finish(ret)), "region start is not a start node");
}

#[test]
fn successor_count_follows_the_kind() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let split = b.reserve();
    let begin = b.reserve();
    let cond = logic(&mut b, true);
    b.define(start, EncodedNode::control(Op::Start).with_successors([split]))
        .unwrap();
    b.define(
        split,
        EncodedNode::control(Op::If)
            .with_inputs([cond])
            .with_successors([begin]),
    )
    .unwrap();
    b.define(begin, EncodedNode::control(Op::Begin)).unwrap();
    assert_eq!(reason(b.finish(start)), "wrong number of successors");
}

#[test]
fn merge_ends_must_ascend_and_precede() {
    let d = diamond(|b| (logic(b, true), int(b, 1), int(b, 2)));
    let mut nodes: Vec<EncodedNode> = d.graph.iter().map(|(_, n)| n.clone()).collect();
    nodes[d.merge.index()].inputs.reverse();
    assert_eq!(
        reason(EncodedGraph::validated(nodes, d.graph.start())),
        "merge ends are not in ascending order"
    );
}

#[test]
fn phi_needs_one_value_per_end() {
    let d = diamond(|b| (logic(b, true), int(b, 1), int(b, 2)));
    let mut nodes: Vec<EncodedNode> = d.graph.iter().map(|(_, n)| n.clone()).collect();
    nodes[d.phi.index()].inputs.pop();
    assert_eq!(
        reason(EncodedGraph::validated(nodes, d.graph.start())),
        "phi value count does not match its merge"
    );
}

#[test]
fn end_needs_a_merge() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let end = b.reserve();
    b.define(start, EncodedNode::control(Op::Start).with_successors([end]))
        .unwrap();
    b.define(end, EncodedNode::control(Op::End)).unwrap();
    assert_eq!(reason(b.finish(start)), "end does not flow into a merge");
}

#[test]
fn loop_end_must_follow_header() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let fwd = b.reserve();
    let back = b.reserve();
    let header = b.reserve();
    b.define(start, EncodedNode::control(Op::Start).with_successors([fwd]))
        .unwrap();
    b.define(fwd, EncodedNode::control(Op::End)).unwrap();
    b.define(back, EncodedNode::control(Op::LoopEnd).with_inputs([header]))
        .unwrap();
    b.define(
        header,
        EncodedNode::control(Op::LoopBegin)
            .with_inputs([fwd])
            .with_successors([back]),
    )
    .unwrap();
    assert_eq!(reason(b.finish(start)), "loop end must follow its loop header");
}

#[test]
fn loop_end_slots_ascend() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let fwd = b.reserve();
    let header = b.reserve();
    let split = b.reserve();
    let left = b.reserve();
    let right = b.reserve();
    let back_left = b.reserve();
    let back_right = b.reserve();
    let cond = logic(&mut b, true);
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
    b.define(
        split,
        EncodedNode::control(Op::If)
            .with_inputs([cond])
            .with_successors([left, right]),
    )
    .unwrap();
    b.define(left, EncodedNode::control(Op::Begin).with_successors([back_left]))
        .unwrap();
    b.define(right, EncodedNode::control(Op::Begin).with_successors([back_right]))
        .unwrap();
    b.define(back_left, EncodedNode::control(Op::LoopEnd).with_inputs([header]))
        .unwrap();
    b.define(back_right, EncodedNode::control(Op::LoopEnd).with_inputs([header]))
        .unwrap();
    let graph = b.finish(start).unwrap();

    assert_eq!(graph.end_target(fwd), Some(header));
    assert_eq!(graph.loop_end_slot(back_left), Some(0));
    assert_eq!(graph.loop_end_slot(back_right), Some(1));
}

#[test]
fn floating_cycles_are_rejected() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let ret = b.reserve();
    let x = param(&mut b, 0);
    let a = b.reserve();
    let c = b.push(EncodedNode::new(Op::Binary(BinaryOp::Add), Stamp::INT).with_inputs([a, x]));
    b.define(
        a,
        EncodedNode::new(Op::Binary(BinaryOp::Mul), Stamp::INT).with_inputs([c, x]),
    )
    .unwrap();
    b.define(start, EncodedNode::control(Op::Start).with_successors([ret]))
        .unwrap();
    b.define(ret, EncodedNode::control(Op::Return).with_inputs([c]))
        .unwrap();
    assert_eq!(reason(b.finish(start)), "cycle among floating nodes");
}

#[test]
fn references_stay_in_range() {
    let mut b = EncodedGraphBuilder::new();
    let start = b.reserve();
    let ret = b.reserve();
    b.define(start, EncodedNode::control(Op::Start).with_successors([ret]))
        .unwrap();
    b.define(
        ret,
        EncodedNode::control(Op::Return).with_inputs([OrderId::new(40)]),
    )
    .unwrap();
    assert_eq!(reason(b.finish(start)), "reference out of range");
}

#[cfg(feature = "cache")]
#[test]
fn cached_encoding_is_revalidated() {
    let d = diamond(|b| (logic(b, false), int(b, 1), int(b, 2)));
    let bytes = d.graph.to_bytes().unwrap();
    let loaded = EncodedGraph::from_bytes(&bytes).unwrap();
    assert_eq!(loaded.len(), d.graph.len());
    assert_eq!(loaded.node(d.ret), d.graph.node(d.ret));
    assert_eq!(loaded.phis(d.merge), &[d.phi]);

    assert!(matches!(
        EncodedGraph::from_bytes(&bytes[..bytes.len() / 2]),
        Err(DecodeError::Cache(_))
    ));
}
