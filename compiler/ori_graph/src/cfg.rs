//! Structural control-flow edits.
//!
//! These operations restructure the fixed-node chain while keeping every
//! edge consistent. They are shared by the decoder's per-node
//! simplification and by its end-of-region cleanup, so neither has to do
//! raw edge surgery.

use smallvec::SmallVec;

use crate::error::GraphError;
use crate::node::NodeId;
use crate::op::Op;
use crate::Graph;

impl Graph {
    /// Insert the detached sequential node `node` immediately before `anchor`.
    pub fn add_before_fixed(&mut self, anchor: NodeId, node: NodeId) -> Result<(), GraphError> {
        if !self.op(node).is_fixed_with_next() {
            return Err(self.unexpected(node, "fixed node with next"));
        }
        if self.next(node).is_some() {
            return Err(GraphError::EdgeMismatch {
                node,
                detail: "inserted node already has a successor".to_owned(),
            });
        }
        self.replace_at_predecessor(anchor, Some(node))?;
        self.set_next(node, Some(anchor))
    }

    /// Rewrite `If(!c)` as `If(c)` with the successors swapped.
    ///
    /// Repeats while the condition is a negation. Returns `true` if
    /// anything changed. The negation itself is left for cleanup.
    pub fn eliminate_negation(&mut self, split: NodeId) -> Result<bool, GraphError> {
        if !matches!(self.op(split), Op::If) {
            return Err(self.unexpected(split, "if"));
        }
        let mut changed = false;
        while let Some(&condition) = self.inputs(split).first() {
            if !matches!(self.op(condition), Op::LogicNegation) {
                break;
            }
            let Some(&inner) = self.inputs(condition).first() else {
                break;
            };
            self.replace_input(split, condition, inner)?;
            let [t, f] = [self.successors(split)[0], self.successors(split)[1]];
            self.clear_successors(split);
            self.set_successor(split, 0, f)?;
            self.set_successor(split, 1, t)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Remove a sequential node from the control chain, connecting its
    /// predecessor directly to its successor. The node stays alive.
    pub fn unlink_fixed(&mut self, node: NodeId) -> Result<(), GraphError> {
        if !self.op(node).is_fixed_with_next() {
            return Err(self.unexpected(node, "fixed node with next"));
        }
        let next = self.next(node);
        self.set_next(node, None)?;
        self.replace_at_predecessor(node, next)
    }

    /// Replace a control split by the edge to one of its successors.
    ///
    /// The split is deleted. Its other successors are left detached for the
    /// caller to dispose of.
    pub fn remove_split(&mut self, split: NodeId, survivor: NodeId) -> Result<(), GraphError> {
        if !self.op(split).is_control_split() {
            return Err(self.unexpected(split, "control split"));
        }
        if self.predecessor(survivor) != Some(split) {
            return Err(GraphError::EdgeMismatch {
                node: survivor,
                detail: format!("not a successor of {split:?}"),
            });
        }
        self.clear_successors(split);
        self.replace_at_predecessor(split, Some(survivor))?;
        self.safe_delete(split)
    }

    /// Remove a merge that has exactly one forward end.
    ///
    /// Each phi is replaced by its single value. Any other usage of the merge
    /// (nodes anchored to it) moves to the node that ended in the merge.
    /// The end is replaced by the merge's successor.
    pub fn reduce_trivial_merge(&mut self, merge: NodeId) -> Result<(), GraphError> {
        self.check_alive(merge)?;
        if !matches!(self.op(merge), Op::Merge) || self.forward_end_count(merge) != 1 {
            return Err(self.unexpected(merge, "merge with a single forward end"));
        }

        for phi in self.phis(merge) {
            let value = *self.inputs(phi).get(1).ok_or_else(|| GraphError::EdgeMismatch {
                node: phi,
                detail: "phi without a value".to_owned(),
            })?;
            self.replace_at_usages_and_delete(phi, value)?;
        }

        let end = self.inputs(merge)[0];
        let end_pred = self.predecessor(end).ok_or(GraphError::NoPredecessor(end))?;
        for user in self.distinct_usages(merge) {
            self.replace_input(user, merge, end_pred)?;
        }

        let next = self.next(merge);
        self.set_next(merge, None)?;
        self.safe_delete(merge)?;

        self.replace_at_predecessor(end, next)?;
        self.safe_delete(end)?;
        tracing::trace!(merge = ?merge, "reduced trivial merge");
        Ok(())
    }

    /// Normalize loop structure.
    ///
    /// A loop header left without back edges is no longer a loop and
    /// becomes a plain merge. Its phis keep their forward values.
    /// Returns the number of headers rewritten.
    pub fn normalize_loops(&mut self) -> usize {
        let degenerate: Vec<NodeId> = self
            .live_nodes()
            .filter(|&id| matches!(self.op(id), Op::LoopBegin) && self.loop_ends(id).is_empty())
            .collect();
        for &header in &degenerate {
            self.nodes[header.index()].op = Op::Merge;
            tracing::trace!(node = ?header, "degenerate loop header became a merge");
        }
        degenerate.len()
    }

    /// Delete an unused floating node, then every floating input that
    /// becomes unused as a result.
    ///
    /// Returns the number of nodes deleted.
    pub fn kill_unused_floating(&mut self, node: NodeId) -> Result<usize, GraphError> {
        let mut worklist = vec![node];
        let mut killed = 0;
        while let Some(id) = worklist.pop() {
            if !self.is_alive(id) || !self.has_no_usages(id) || !self.op(id).is_floating() {
                continue;
            }
            let inputs: SmallVec<[NodeId; 2]> = self.inputs(id).into();
            self.safe_delete(id)?;
            killed += 1;
            worklist.extend(inputs);
        }
        Ok(killed)
    }
}
