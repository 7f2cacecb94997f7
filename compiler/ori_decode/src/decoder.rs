//! The decoding walk.
//!
//! [`decode`] rebuilds an [`EncodedGraph`] region inside a [`Graph`]:
//!
//! 1. Fixed nodes are processed in ascending order ID. When a fixed node is
//!    processed its successors are created as stubs (kind and stamp only)
//!    and scheduled; the stub is filled in when its own turn comes.
//! 2. Inputs are resolved through the [`RegionScope`]. A floating input that
//!    has not been decoded yet is decoded on the spot, recursively.
//! 3. An end attaches itself to its merge, creating the merge stub on first
//!    arrival. When the merge is processed its phis are built from the
//!    values of the ends that actually arrived.
//! 4. Loop phis are created at the header with their forward value; each
//!    loop end appends its back-edge value.
//!
//! The walk itself never simplifies anything. Every decision point calls
//! into a [`DecoderHooks`] implementation, and [`PlainDecoder`] is the one
//! that accepts every default.
//!
//! Branches cut off by a hook are never decoded: their stubs are deleted,
//! so the walk skips them when they come up.

use std::collections::BTreeSet;

use ori_graph::{Graph, NewNode, NodeId, Op, Stamp};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::encoded::{EncodedGraph, OrderId};
use crate::error::DecodeError;
use crate::scope::RegionScope;
use crate::stack::ensure_sufficient_stack;

/// Result of the floating pre-insertion hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FloatingNode {
    /// Not added yet. The walk passes it to
    /// [`DecoderHooks::add_floating_node`].
    Pending(NewNode),
    /// Substituted by a node already in the graph.
    Added(NodeId),
}

/// Decision points of the decoding walk.
///
/// Every method has a default that leaves the decoded graph exactly as
/// encoded.
pub trait DecoderHooks {
    /// Whether a phi whose values are all the same node may be skipped,
    /// mapping its order ID directly to that node.
    fn allow_lazy_phis(&self) -> bool {
        false
    }

    /// Called once a merge has all its ends and phis.
    fn handle_merge_node(&mut self, graph: &mut Graph, merge: NodeId) -> Result<(), DecodeError> {
        let _ = (graph, merge);
        Ok(())
    }

    /// Called once a fixed node has its inputs and successor stubs.
    fn handle_fixed_node(
        &mut self,
        graph: &mut Graph,
        scope: &mut RegionScope,
        order_id: OrderId,
        node: NodeId,
    ) -> Result<(), DecodeError> {
        let _ = (graph, scope, order_id, node);
        Ok(())
    }

    /// Called with a floating node whose inputs are decoded but which is
    /// not in the graph yet.
    fn handle_floating_node_before_add(
        &mut self,
        graph: &mut Graph,
        node: NewNode,
    ) -> Result<FloatingNode, DecodeError> {
        let _ = graph;
        Ok(FloatingNode::Pending(node))
    }

    /// Add a floating node that the pre-insertion hook kept.
    fn add_floating_node(&mut self, graph: &mut Graph, node: NewNode) -> Result<NodeId, DecodeError> {
        Ok(graph.add(node)?)
    }

    /// Called once after the whole region is decoded.
    fn cleanup_graph(&mut self, graph: &mut Graph, scope: &RegionScope) -> Result<(), DecodeError> {
        let _ = scope;
        graph.verify()?;
        Ok(())
    }
}

/// Decoder hooks that keep the region exactly as encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainDecoder;

impl DecoderHooks for PlainDecoder {}

/// Decode `encoded` into `graph`, steered by `hooks`.
///
/// Returns the region's scope, which maps every decoded order ID to its
/// final node.
pub fn decode<H: DecoderHooks + ?Sized>(
    hooks: &mut H,
    graph: &mut Graph,
    encoded: &EncodedGraph,
) -> Result<RegionScope, DecodeError> {
    let scope = RegionScope::new(encoded.len(), graph.mark());
    let mut walk = Walk {
        hooks,
        graph,
        encoded,
        scope,
        worklist: BTreeSet::new(),
    };
    walk.run()?;
    let Walk {
        hooks,
        graph,
        scope,
        ..
    } = walk;
    hooks.cleanup_graph(graph, &scope)?;
    debug!(
        nodes = encoded.len(),
        live = graph.new_nodes(scope.start()).len(),
        "decoded region"
    );
    Ok(scope)
}

struct Walk<'a, H: ?Sized> {
    hooks: &'a mut H,
    graph: &'a mut Graph,
    encoded: &'a EncodedGraph,
    scope: RegionScope,
    /// Fixed nodes created but not processed yet.
    worklist: BTreeSet<OrderId>,
}

impl<H: DecoderHooks + ?Sized> Walk<'_, H> {
    fn run(&mut self) -> Result<(), DecodeError> {
        let start_id = self.encoded.start();
        let start = self.graph.add(NewNode::new(Op::Start, Stamp::Void))?;
        self.scope.register(start_id, start, false, false)?;
        self.worklist.insert(start_id);

        while let Some(order_id) = self.worklist.pop_first() {
            let Some(node) = self.scope.lookup(order_id) else {
                continue;
            };
            if !self.graph.is_alive(node) {
                trace!(order_id = ?order_id, "skip cut-off node");
                continue;
            }
            self.process_fixed(order_id, node)?;
        }
        Ok(())
    }

    fn process_fixed(&mut self, order_id: OrderId, node: NodeId) -> Result<(), DecodeError> {
        let encoded = self.encoded;
        let encoded = encoded.node(order_id);
        trace!(order_id = ?order_id, node = ?node, op = %encoded.op, "process fixed node");

        match encoded.op {
            // Ends attach themselves on arrival.
            Op::Merge | Op::LoopBegin => {}
            Op::LoopEnd => {
                let header = self.fixed_input(order_id, encoded.inputs[0])?;
                self.graph.push_input(node, header)?;
                self.complete_loop_phis(order_id, header)?;
            }
            _ => {
                for &input in &encoded.inputs {
                    let input = self.ensure_node_created(input)?;
                    self.graph.push_input(node, input)?;
                }
            }
        }

        match encoded.op {
            Op::Merge => self.finish_merge(order_id, node)?,
            Op::LoopBegin => self.start_loop(order_id, node)?,
            Op::End => self.attach_end(order_id, node)?,
            _ => {}
        }

        self.make_successor_stubs(order_id, node)?;
        self.hooks
            .handle_fixed_node(self.graph, &mut self.scope, order_id, node)
    }

    fn make_successor_stubs(&mut self, order_id: OrderId, node: NodeId) -> Result<(), DecodeError> {
        let encoded = self.encoded;
        for (index, &succ_id) in encoded.node(order_id).successors.iter().enumerate() {
            let stub = self.add_stub(succ_id)?;
            self.graph.set_successor(node, index, Some(stub))?;
        }
        Ok(())
    }

    /// Create and schedule the bare node for a fixed order ID.
    fn add_stub(&mut self, order_id: OrderId) -> Result<NodeId, DecodeError> {
        let encoded = self.encoded.node(order_id);
        let stub = self
            .graph
            .add(NewNode::new(encoded.op.clone(), encoded.stamp))?;
        self.scope.register(order_id, stub, false, false)?;
        self.worklist.insert(order_id);
        Ok(stub)
    }

    fn attach_end(&mut self, order_id: OrderId, end: NodeId) -> Result<(), DecodeError> {
        let Some(merge_id) = self.encoded.end_target(order_id) else {
            return Err(malformed(order_id, "end does not flow into a merge"));
        };
        let merge = match self.scope.resolve(self.graph, merge_id)? {
            Some(merge) => merge,
            None => self.add_stub(merge_id)?,
        };
        self.graph.push_input(merge, end)?;
        Ok(())
    }

    /// Values flowing into `phi_id` through the ends that reached the
    /// merge, in end order.
    fn merge_values(
        &mut self,
        merge_id: OrderId,
        phi_id: OrderId,
    ) -> Result<SmallVec<[NodeId; 4]>, DecodeError> {
        let encoded = self.encoded;
        let ends = &encoded.node(merge_id).inputs;
        let phi_inputs = &encoded.node(phi_id).inputs;
        let mut values = SmallVec::new();
        for (pos, &end_id) in ends.iter().enumerate() {
            let arrived = self
                .scope
                .lookup(end_id)
                .is_some_and(|end| self.graph.is_alive(end));
            if arrived {
                values.push(self.ensure_node_created(phi_inputs[pos + 1])?);
            }
        }
        Ok(values)
    }

    fn finish_merge(&mut self, merge_id: OrderId, merge: NodeId) -> Result<(), DecodeError> {
        let encoded = self.encoded;
        for &phi_id in encoded.phis(merge_id) {
            let values = self.merge_values(merge_id, phi_id)?;
            let first = values.first().copied();
            if self.hooks.allow_lazy_phis() && values.iter().all(|&v| Some(v) == first) {
                if let Some(value) = first {
                    trace!(order_id = ?phi_id, value = ?value, "phi not needed");
                    self.scope.register(phi_id, value, false, true)?;
                    continue;
                }
            }
            let stamp = encoded.node(phi_id).stamp;
            let phi = self.graph.add(
                NewNode::new(Op::Phi, stamp).with_inputs(std::iter::once(merge).chain(values)),
            )?;
            self.scope.register(phi_id, phi, false, false)?;
        }
        self.hooks.handle_merge_node(self.graph, merge)
    }

    /// Loop phis cannot be lazy: their back-edge values are not known yet.
    fn start_loop(&mut self, header_id: OrderId, header: NodeId) -> Result<(), DecodeError> {
        let encoded = self.encoded;
        for &phi_id in encoded.phis(header_id) {
            let phi_node = encoded.node(phi_id);
            let forward = self.ensure_node_created(phi_node.inputs[1])?;
            let phi = self
                .graph
                .add(NewNode::new(Op::Phi, phi_node.stamp).with_inputs([header, forward]))?;
            self.scope.register(phi_id, phi, false, false)?;
            self.scope.add_loop_phi(header, phi_id, phi);
        }
        Ok(())
    }

    fn complete_loop_phis(&mut self, loop_end_id: OrderId, header: NodeId) -> Result<(), DecodeError> {
        let encoded = self.encoded;
        let Some(slot) = encoded.loop_end_slot(loop_end_id) else {
            return Err(malformed(loop_end_id, "loop end without a loop header"));
        };
        for (phi_id, phi) in self.scope.loop_phis(header) {
            let value_id = encoded.node(phi_id).inputs[2 + slot];
            let value = self.ensure_node_created(value_id)?;
            self.graph.push_input(phi, value)?;
        }
        Ok(())
    }

    /// Resolve a reference that must name an already decoded fixed node.
    fn fixed_input(&self, user: OrderId, id: OrderId) -> Result<NodeId, DecodeError> {
        self.scope
            .resolve(self.graph, id)?
            .ok_or_else(|| malformed(user, "fixed input is not decoded yet"))
    }

    /// Resolve `id`, decoding it first if it is a floating node that has
    /// not been decoded yet.
    fn ensure_node_created(&mut self, id: OrderId) -> Result<NodeId, DecodeError> {
        if let Some(node) = self.scope.resolve(self.graph, id)? {
            return Ok(node);
        }
        let encoded = self.encoded;
        let op = &encoded.node(id).op;
        if matches!(op, Op::Phi) {
            return Err(malformed(id, "phi referenced before its merge"));
        }
        if !op.is_floating() {
            return Err(malformed(id, "reference to a fixed node that is not decoded yet"));
        }
        ensure_sufficient_stack(|| self.decode_floating(id))
    }

    fn decode_floating(&mut self, id: OrderId) -> Result<NodeId, DecodeError> {
        let encoded = self.encoded;
        let encoded = encoded.node(id);
        let mut inputs: SmallVec<[NodeId; 2]> = SmallVec::with_capacity(encoded.inputs.len());
        for &input in &encoded.inputs {
            inputs.push(self.ensure_node_created(input)?);
        }
        let node = NewNode::new(encoded.op.clone(), encoded.stamp).with_inputs(inputs);
        let node = match self.hooks.handle_floating_node_before_add(self.graph, node)? {
            FloatingNode::Added(node) => node,
            FloatingNode::Pending(node) => self.hooks.add_floating_node(self.graph, node)?,
        };
        // Distinct order IDs may decode to the same deduplicated node.
        self.scope.register(id, node, false, true)?;
        trace!(order_id = ?id, node = ?node, "decoded floating node");
        Ok(node)
    }
}

fn malformed(order_id: OrderId, reason: &'static str) -> DecodeError {
    DecodeError::Malformed { order_id, reason }
}
