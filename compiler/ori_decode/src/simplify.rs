//! Decoding with simplification.
//!
//! [`SimplifyingDecoder`] plugs into the decoding walk and simplifies the
//! region while it is being built:
//!
//! - A split whose condition is a constant is replaced by its surviving
//!   branch. The other branch has not been decoded yet, so its stub is
//!   simply deleted and the walk never visits it.
//! - A guard whose condition is a constant either becomes a deoptimization
//!   (it always fails) or disappears (it always passes).
//! - Other nodes with a rewrite rule are substituted by their canonical
//!   form, both fixed nodes (after they are built) and floating nodes
//!   (before they are added).
//!
//! After the walk, [`SimplifyingDecoder::cleanup_region`] removes the
//! structure these substitutions left behind.
//!
//! # Uses not built yet
//!
//! Rewrite rules run while later parts of the region are still encoded,
//! so a node's usage list is never final. The tool handed to the rules
//! ([`DecodeCanonicalizerTool`]) says so, and a node replaced while it has
//! pending uses is left as an anchor ([`Op::Placeholder`]) that those uses
//! can still attach to.

use ori_graph::{
    canonical, is_canonicalizable, Canonical, CanonicalizerTool, ConstantReflectionProvider,
    DeoptAction, DeoptReason, Graph, GraphError, Mark, MetaAccessProvider, NewNode, NodeId,
    NodeView, Op, Replacement, Stamp,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::decoder::{DecoderHooks, FloatingNode};
use crate::encoded::OrderId;
use crate::error::DecodeError;
use crate::scope::RegionScope;

/// Options for [`SimplifyingDecoder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Allow rewrite rules to fold memory reads.
    pub canonicalize_reads: bool,
    /// Check edge consistency after cleanup.
    pub verify: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            canonicalize_reads: true,
            verify: true,
        }
    }
}

/// Counters of what a [`SimplifyingDecoder`] changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    /// Splits replaced by one of their successors.
    pub splits_removed: usize,
    /// Nodes substituted after being built (fixed nodes).
    pub fixed_substituted: usize,
    /// Floating nodes substituted before being added.
    pub floating_substituted: usize,
    pub loops_normalized: usize,
    pub merges_reduced: usize,
    pub begins_removed: usize,
    /// Unused floating nodes reclaimed by cleanup.
    pub nodes_killed: usize,
}

/// Rewrite-rule capability used during decoding.
#[derive(Clone, Copy)]
pub struct DecodeCanonicalizerTool<'a> {
    meta_access: &'a dyn MetaAccessProvider,
    constant_reflection: &'a dyn ConstantReflectionProvider,
    canonicalize_reads: bool,
}

impl<'a> DecodeCanonicalizerTool<'a> {
    pub fn new(
        meta_access: &'a dyn MetaAccessProvider,
        constant_reflection: &'a dyn ConstantReflectionProvider,
        canonicalize_reads: bool,
    ) -> Self {
        Self {
            meta_access,
            constant_reflection,
            canonicalize_reads,
        }
    }
}

impl CanonicalizerTool for DecodeCanonicalizerTool<'_> {
    fn meta_access(&self) -> &dyn MetaAccessProvider {
        self.meta_access
    }

    fn constant_reflection(&self) -> &dyn ConstantReflectionProvider {
        self.constant_reflection
    }

    fn canonicalize_reads(&self) -> bool {
        self.canonicalize_reads
    }

    /// Later parts of the region may still add uses.
    fn all_usages_available(&self) -> bool {
        false
    }
}

/// Decoder hooks that simplify while decoding.
pub struct SimplifyingDecoder<'a> {
    meta_access: &'a dyn MetaAccessProvider,
    constant_reflection: &'a dyn ConstantReflectionProvider,
    options: DecodeOptions,
    stats: SimplifyStats,
}

impl<'a> SimplifyingDecoder<'a> {
    pub fn new(
        meta_access: &'a dyn MetaAccessProvider,
        constant_reflection: &'a dyn ConstantReflectionProvider,
        options: DecodeOptions,
    ) -> Self {
        Self {
            meta_access,
            constant_reflection,
            options,
            stats: SimplifyStats::default(),
        }
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn stats(&self) -> SimplifyStats {
        self.stats
    }

    pub fn tool(&self) -> DecodeCanonicalizerTool<'a> {
        DecodeCanonicalizerTool::new(
            self.meta_access,
            self.constant_reflection,
            self.options.canonicalize_reads,
        )
    }

    /// Integrate the rewrite result `canonical` for the fixed node `node`,
    /// decoded from `order_id`.
    ///
    /// A new fixed replacement is spliced in before `node`; a new control
    /// sink takes over `node`'s place and everything after it is cut off.
    /// If `node` is still in place afterwards it is unlinked, its uses move
    /// to the replacement, and it is deleted. Finally `order_id` is
    /// remapped so later references resolve to the replacement.
    pub fn handle_canonicalization(
        &mut self,
        graph: &mut Graph,
        scope: &mut RegionScope,
        order_id: OrderId,
        node: NodeId,
        canonical: Canonical,
    ) -> Result<(), DecodeError> {
        let Canonical::Replace(replacement) = canonical else {
            return Ok(());
        };
        let replacement = match replacement {
            Replacement::Existing(existing) if existing == node => return Ok(()),
            Replacement::Existing(existing) => {
                if !graph.is_alive(existing) {
                    return Err(GraphError::NotAlive(existing).into());
                }
                existing
            }
            Replacement::New(new) => {
                let added = graph.add_or_unique_with_inputs(new)?;
                let op = graph.op(added);
                if op.is_fixed_with_next() {
                    graph.add_before_fixed(node, added)?;
                } else if op.is_control_sink() {
                    cut_off(graph, node, added)?;
                } else if op.is_fixed() {
                    return Err(DecodeError::UnsupportedReplacement {
                        node,
                        replacement: op.to_string(),
                    });
                }
                added
            }
        };

        if graph.is_alive(node) {
            graph.unlink_fixed(node)?;
            graph.replace_at_usages_and_delete(node, replacement)?;
        }

        let current = scope.lookup(order_id);
        if current != Some(node) {
            return Err(DecodeError::OrderIdRemapped {
                order_id,
                expected: node,
                found: current,
            });
        }
        scope.register(order_id, replacement, true, true)?;
        self.stats.fixed_substituted += 1;
        debug!(
            order_id = ?order_id,
            node = ?node,
            replacement = ?replacement,
            op = %graph.op(replacement),
            "substituted fixed node"
        );
        Ok(())
    }

    fn simplify_if(&mut self, graph: &mut Graph, split: NodeId) -> Result<(), DecodeError> {
        if graph.eliminate_negation(split)? {
            trace!(node = ?split, "removed negated if condition");
        }
        let Some(&condition) = graph.inputs(split).first() else {
            return Ok(());
        };
        let Op::LogicConstant(value) = *graph.op(condition) else {
            return Ok(());
        };
        let (survivor, dead) = if value { (0, 1) } else { (1, 0) };
        let survivor = successor(graph, split, survivor)?;
        let dead = successor(graph, split, dead)?;
        self.remove_split(graph, split, survivor, &[dead])
    }

    fn simplify_switch(&mut self, graph: &mut Graph, split: NodeId) -> Result<(), DecodeError> {
        let Some(&selector) = graph.inputs(split).first() else {
            return Ok(());
        };
        let Some(value) = graph.stamp(selector).as_int_constant() else {
            return Ok(());
        };
        let Op::Switch { keys } = graph.op(split) else {
            return Ok(());
        };
        let taken = keys.iter().position(|&k| k == value).unwrap_or(keys.len());
        let survivor = successor(graph, split, taken)?;
        let dead: SmallVec<[NodeId; 4]> = graph
            .successors(split)
            .iter()
            .flatten()
            .copied()
            .filter(|&s| s != survivor)
            .collect();
        self.remove_split(graph, split, survivor, &dead)
    }

    /// Replace `split` by `survivor`. The `dead` successors must still be
    /// bare stubs.
    fn remove_split(
        &mut self,
        graph: &mut Graph,
        split: NodeId,
        survivor: NodeId,
        dead: &[NodeId],
    ) -> Result<(), DecodeError> {
        for &successor in dead {
            if graph.successors(successor).iter().any(Option::is_some) {
                return Err(DecodeError::DeadSuccessorDecoded { split, successor });
            }
        }
        graph.remove_split(split, survivor)?;
        for &successor in dead {
            graph.safe_delete(successor)?;
        }
        self.stats.splits_removed += 1;
        debug!(split = ?split, survivor = ?survivor, "removed constant split");
        Ok(())
    }

    fn simplify_guard(
        &mut self,
        graph: &mut Graph,
        scope: &mut RegionScope,
        order_id: OrderId,
        guard: NodeId,
        (negated, action, reason): (bool, DeoptAction, DeoptReason),
    ) -> Result<(), DecodeError> {
        let Some(&condition) = graph.inputs(guard).first() else {
            return Ok(());
        };
        let Op::LogicConstant(value) = *graph.op(condition) else {
            return Ok(());
        };
        let replacement = if value == negated {
            // Always fails.
            let state = graph.inputs(guard).get(1).copied();
            NewNode::new(Op::Deoptimize { action, reason }, Stamp::Void).with_inputs(state)
        } else {
            // Always passes; uses anchored to the guard move to the placeholder.
            NewNode::new(Op::Placeholder, *graph.stamp(guard))
        };
        self.handle_canonicalization(
            graph,
            scope,
            order_id,
            guard,
            Canonical::Replace(Replacement::New(replacement)),
        )
    }

    /// Region cleanup, in order:
    ///
    /// 1. loop headers without back edges become merges;
    /// 2. merges with a single forward end are removed;
    /// 3. begin nodes that no longer follow a split and anchor nothing are
    ///    removed;
    /// 4. unused floating nodes are deleted.
    ///
    /// Steps 2 to 4 repeat until nothing changes, since deleting a floating
    /// node can free a begin it was anchored to. Only nodes created after
    /// `start` are considered.
    pub fn cleanup_region(&mut self, graph: &mut Graph, start: Mark) -> Result<(), DecodeError> {
        self.stats.loops_normalized += graph.normalize_loops();
        loop {
            let merges = reduce_trivial_merges(graph, start)?;
            let begins = remove_unused_begins(graph, start)?;
            let killed = kill_unused_floating(graph, start)?;
            self.stats.merges_reduced += merges;
            self.stats.begins_removed += begins;
            self.stats.nodes_killed += killed;
            if merges + begins + killed == 0 {
                break;
            }
        }
        if self.options.verify {
            graph.verify()?;
        }
        debug!(
            splits = self.stats.splits_removed,
            merges = self.stats.merges_reduced,
            begins = self.stats.begins_removed,
            killed = self.stats.nodes_killed,
            "region cleanup"
        );
        Ok(())
    }
}

impl DecoderHooks for SimplifyingDecoder<'_> {
    fn allow_lazy_phis(&self) -> bool {
        true
    }

    /// Refine each phi's stamp from its values.
    fn handle_merge_node(&mut self, graph: &mut Graph, merge: NodeId) -> Result<(), DecodeError> {
        for phi in graph.phis(merge) {
            let values = &graph.inputs(phi)[1..];
            let union = values
                .iter()
                .fold(Stamp::Empty, |acc, &v| acc.meet(graph.stamp(v)));
            let refined = graph.stamp(phi).join(&union);
            if !refined.is_empty() && refined != *graph.stamp(phi) {
                trace!(phi = ?phi, stamp = ?refined, "refined phi stamp");
                graph.set_stamp(phi, refined);
            }
        }
        Ok(())
    }

    fn handle_fixed_node(
        &mut self,
        graph: &mut Graph,
        scope: &mut RegionScope,
        order_id: OrderId,
        node: NodeId,
    ) -> Result<(), DecodeError> {
        match *graph.op(node) {
            Op::If => self.simplify_if(graph, node),
            Op::Switch { .. } => self.simplify_switch(graph, node),
            Op::FixedGuard {
                negated,
                action,
                reason,
            } => self.simplify_guard(graph, scope, order_id, node, (negated, action, reason)),
            ref op if is_canonicalizable(op) => {
                let result = canonical(graph, &NodeView::of(graph, node), &self.tool());
                self.handle_canonicalization(graph, scope, order_id, node, result)
            }
            _ => Ok(()),
        }
    }

    /// The node has no id yet, so nothing can be using it.
    fn handle_floating_node_before_add(
        &mut self,
        graph: &mut Graph,
        node: NewNode,
    ) -> Result<FloatingNode, DecodeError> {
        if !is_canonicalizable(&node.op) {
            return Ok(FloatingNode::Pending(node));
        }
        let Some(view) = NodeView::of_new(&node) else {
            return Ok(FloatingNode::Pending(node));
        };
        let result = canonical(graph, &view, &self.tool());
        let replacement = match result {
            Canonical::Unchanged | Canonical::Defer => return Ok(FloatingNode::Pending(node)),
            Canonical::Replace(Replacement::Existing(existing)) => existing,
            Canonical::Replace(Replacement::New(new)) => graph.add_or_unique_with_inputs(new)?,
        };
        self.stats.floating_substituted += 1;
        trace!(op = %node.op, replacement = ?replacement, "substituted floating node");
        Ok(FloatingNode::Added(replacement))
    }

    fn add_floating_node(&mut self, graph: &mut Graph, node: NewNode) -> Result<NodeId, DecodeError> {
        Ok(graph.add_or_unique(node)?)
    }

    fn cleanup_graph(&mut self, graph: &mut Graph, scope: &RegionScope) -> Result<(), DecodeError> {
        self.cleanup_region(graph, scope.start())
    }
}

/// Put `sink` in place of `node` and delete `node` together with its
/// undecoded successor stubs.
fn cut_off(graph: &mut Graph, node: NodeId, sink: NodeId) -> Result<(), DecodeError> {
    graph.replace_at_predecessor(node, Some(sink))?;
    let successors: SmallVec<[NodeId; 2]> =
        graph.successors(node).iter().flatten().copied().collect();
    graph.clear_successors(node);
    graph.safe_delete(node)?;
    for successor in successors {
        graph.safe_delete(successor)?;
    }
    Ok(())
}

fn successor(graph: &Graph, split: NodeId, index: usize) -> Result<NodeId, DecodeError> {
    graph
        .successors(split)
        .get(index)
        .copied()
        .flatten()
        .ok_or(DecodeError::Graph(GraphError::NoSuccessorSlot { node: split, index }))
}

fn reduce_trivial_merges(graph: &mut Graph, start: Mark) -> Result<usize, DecodeError> {
    let mut reduced = 0;
    for node in graph.new_nodes(start) {
        if graph.is_alive(node)
            && matches!(graph.op(node), Op::Merge)
            && graph.forward_end_count(node) == 1
        {
            graph.reduce_trivial_merge(node)?;
            reduced += 1;
        }
    }
    Ok(reduced)
}

/// A begin is only needed right after a split or as an anchor.
fn remove_unused_begins(graph: &mut Graph, start: Mark) -> Result<usize, DecodeError> {
    let mut removed = 0;
    for node in graph.new_nodes(start) {
        if !graph.is_alive(node) || !graph.op(node).is_begin() || !graph.has_no_usages(node) {
            continue;
        }
        let after_split = graph
            .predecessor(node)
            .is_some_and(|p| graph.op(p).is_control_split());
        if !after_split {
            graph.unlink_fixed(node)?;
            graph.safe_delete(node)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn kill_unused_floating(graph: &mut Graph, start: Mark) -> Result<usize, DecodeError> {
    let mut killed = 0;
    for node in graph.new_nodes(start) {
        if graph.is_alive(node) && graph.op(node).is_floating() && graph.has_no_usages(node) {
            killed += graph.kill_unused_floating(node)?;
        }
    }
    Ok(killed)
}
