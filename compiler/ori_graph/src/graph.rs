//! The node arena.
//!
//! [`Graph`] owns every node. Nodes are never moved or reused: deletion
//! marks the slot dead and drops its edges. All edge edits go through
//! methods here so the two sides of every edge (input/usage,
//! successor/predecessor) stay in sync.
//!
//! Floating nodes can be inserted through a uniquing path
//! ([`Graph::add_or_unique`]) that returns an existing, structurally
//! identical node instead of adding a duplicate. Structural identity is the
//! op, the stamp and the input list, so two nodes that differ only in stamp
//! are never merged.

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use crate::error::GraphError;
use crate::node::{Input, Mark, NewNode, Node, NodeId};
use crate::op::Op;
use crate::stamp::Stamp;

/// Value-numbering key of a floating node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ValueKey {
    op: Op,
    stamp: Stamp,
    inputs: SmallVec<[NodeId; 2]>,
}

impl ValueKey {
    fn of(node: &NewNode) -> Option<Self> {
        if !node.op.is_value_numberable() {
            return None;
        }
        Some(Self {
            op: node.op.clone(),
            stamp: node.stamp,
            inputs: node.live_inputs()?,
        })
    }
}

/// A mutable program graph.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    /// Value-numbering cache. Entries go stale when a node is deleted or
    /// its inputs change; [`Graph::find_duplicate`] re-checks every hit.
    value_numbers: FxHashMap<ValueKey, NodeId>,
    live: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ─────────────────────────────────────────────────

    /// The node at `id`. Deleted nodes are still addressable.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn op(&self, id: NodeId) -> &Op {
        &self.node(id).op
    }

    #[inline]
    pub fn stamp(&self, id: NodeId) -> &Stamp {
        &self.node(id).stamp
    }

    #[inline]
    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).inputs
    }

    #[inline]
    pub fn successors(&self, id: NodeId) -> &[Option<NodeId>] {
        &self.node(id).successors
    }

    #[inline]
    pub fn usages(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).usages
    }

    #[inline]
    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).predecessor
    }

    #[inline]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len() && self.node(id).alive
    }

    #[inline]
    pub fn has_no_usages(&self, id: NodeId) -> bool {
        self.node(id).usages.is_empty()
    }

    /// The `next` successor of a sequential fixed node.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        if node.op.is_fixed_with_next() {
            node.successors.first().copied().flatten()
        } else {
            None
        }
    }

    /// Distinct users of `id`, in first-use order.
    pub fn distinct_usages(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut users: SmallVec<[NodeId; 4]> = SmallVec::new();
        for &user in &self.node(id).usages {
            if !users.contains(&user) {
                users.push(user);
            }
        }
        users
    }

    /// Phis attached to a merge or loop header.
    pub fn phis(&self, merge: NodeId) -> SmallVec<[NodeId; 4]> {
        self.distinct_usages(merge)
            .into_iter()
            .filter(|&u| {
                matches!(self.op(u), Op::Phi) && self.inputs(u).first() == Some(&merge)
            })
            .collect()
    }

    /// Back edges of a loop header.
    pub fn loop_ends(&self, loop_begin: NodeId) -> SmallVec<[NodeId; 2]> {
        self.distinct_usages(loop_begin)
            .into_iter()
            .filter(|&u| matches!(self.op(u), Op::LoopEnd))
            .collect()
    }

    /// Number of forward ends flowing into a merge or loop header.
    pub fn forward_end_count(&self, merge: NodeId) -> usize {
        if self.op(merge).is_abstract_merge() {
            self.inputs(merge).len()
        } else {
            0
        }
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// All live nodes in creation order.
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.alive)
            .map(|(idx, _)| Self::id_at(idx))
    }

    /// Take a mark at the current end of the arena.
    pub fn mark(&self) -> Mark {
        Mark(Self::id_at(self.nodes.len()).raw())
    }

    /// Live nodes created since `mark`, in creation order.
    ///
    /// Returns a snapshot, so callers may edit the graph while iterating.
    pub fn new_nodes(&self, mark: Mark) -> Vec<NodeId> {
        self.live_nodes().filter(|&id| mark.contains(id)).collect()
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "node counts fit in u32"
    )]
    fn id_at(idx: usize) -> NodeId {
        NodeId::new(idx as u32)
    }

    pub(crate) fn check_alive(&self, id: NodeId) -> Result<(), GraphError> {
        if self.is_alive(id) {
            Ok(())
        } else {
            Err(GraphError::NotAlive(id))
        }
    }

    pub(crate) fn unexpected(&self, node: NodeId, expected: &'static str) -> GraphError {
        GraphError::UnexpectedKind {
            node,
            found: self.op(node).to_string(),
            expected,
        }
    }

    // ── Insertion ───────────────────────────────────────────────

    /// Add a node unconditionally. Every input must already be live.
    ///
    /// Successor slots are created empty according to the op.
    pub fn add(&mut self, node: NewNode) -> Result<NodeId, GraphError> {
        let inputs = node.live_inputs().ok_or(GraphError::UnaddedInput)?;
        for &input in &inputs {
            if !self.is_alive(input) {
                return Err(GraphError::DeadInput { input });
            }
        }

        let id = Self::id_at(self.nodes.len());
        let successors = smallvec![None; node.op.successor_count()];
        for &input in &inputs {
            self.nodes[input.index()].usages.push(id);
        }
        tracing::trace!(node = ?id, op = %node.op, "add node");
        self.nodes.push(Node {
            op: node.op,
            stamp: node.stamp,
            inputs,
            successors,
            predecessor: None,
            usages: SmallVec::new(),
            alive: true,
        });
        self.live += 1;
        Ok(id)
    }

    /// Find a live node structurally identical to `node`.
    ///
    /// Only value-numberable kinds are ever considered duplicates.
    pub fn find_duplicate(&self, node: &NewNode) -> Option<NodeId> {
        let key = ValueKey::of(node)?;
        let &id = self.value_numbers.get(&key)?;
        let existing = self.node(id);
        let same = existing.alive
            && existing.op == key.op
            && existing.stamp == key.stamp
            && existing.inputs == key.inputs;
        same.then_some(id)
    }

    /// Add `node`, or return an existing structurally identical node.
    pub fn add_or_unique(&mut self, node: NewNode) -> Result<NodeId, GraphError> {
        if let Some(existing) = self.find_duplicate(&node) {
            tracing::trace!(node = ?existing, op = %node.op, "reuse identical node");
            return Ok(existing);
        }
        let key = ValueKey::of(&node);
        let id = self.add(node)?;
        if let Some(key) = key {
            self.value_numbers.insert(key, id);
        }
        Ok(id)
    }

    /// Like [`Graph::add_or_unique`], but first materializes nested new
    /// inputs (each of them uniqued as well).
    pub fn add_or_unique_with_inputs(&mut self, node: NewNode) -> Result<NodeId, GraphError> {
        let NewNode { op, stamp, inputs } = node;
        let mut resolved: SmallVec<[Input; 2]> = SmallVec::with_capacity(inputs.len());
        for input in inputs {
            let id = match input {
                Input::Node(id) => id,
                Input::New(nested) => self.add_or_unique_with_inputs(*nested)?,
            };
            resolved.push(Input::Node(id));
        }
        self.add_or_unique(NewNode {
            op,
            stamp,
            inputs: resolved,
        })
    }

    pub fn set_stamp(&mut self, id: NodeId, stamp: Stamp) {
        self.nodes[id.index()].stamp = stamp;
    }

    // ── Input edges ─────────────────────────────────────────────

    /// Append an input edge `node → input`.
    pub fn push_input(&mut self, node: NodeId, input: NodeId) -> Result<(), GraphError> {
        self.check_alive(node)?;
        self.check_alive(input)?;
        self.nodes[node.index()].inputs.push(input);
        self.nodes[input.index()].usages.push(node);
        Ok(())
    }

    /// Redirect every input of `node` that points at `old` to `new`.
    ///
    /// Returns the number of edges redirected.
    pub fn replace_input(
        &mut self,
        node: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<usize, GraphError> {
        self.check_alive(new)?;
        let mut count = 0;
        for input in &mut self.nodes[node.index()].inputs {
            if *input == old {
                *input = new;
                count += 1;
            }
        }
        for _ in 0..count {
            self.remove_usage(old, node);
            self.nodes[new.index()].usages.push(node);
        }
        Ok(count)
    }

    fn remove_usage(&mut self, of: NodeId, user: NodeId) {
        let usages = &mut self.nodes[of.index()].usages;
        if let Some(pos) = usages.iter().position(|&u| u == user) {
            usages.remove(pos);
        }
    }

    /// Redirect every usage of `old` to `new`.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) -> Result<(), GraphError> {
        if old == new {
            return Ok(());
        }
        self.check_alive(old)?;
        self.check_alive(new)?;
        for user in self.distinct_usages(old) {
            self.replace_input(user, old, new)?;
        }
        Ok(())
    }

    /// Redirect every usage of `old` to `new`, then delete `old`.
    pub fn replace_at_usages_and_delete(
        &mut self,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), GraphError> {
        self.replace_at_usages(old, new)?;
        self.safe_delete(old)
    }

    // ── Successor edges ─────────────────────────────────────────

    /// Set successor slot `index` of `node`, keeping predecessor pointers
    /// in sync. The previous occupant of the slot is detached.
    pub fn set_successor(
        &mut self,
        node: NodeId,
        index: usize,
        successor: Option<NodeId>,
    ) -> Result<(), GraphError> {
        self.check_alive(node)?;
        if index >= self.node(node).successors.len() {
            return Err(GraphError::NoSuccessorSlot { node, index });
        }
        if let Some(succ) = successor {
            self.check_alive(succ)?;
            if let Some(predecessor) = self.node(succ).predecessor {
                return Err(GraphError::PredecessorTaken {
                    node: succ,
                    predecessor,
                });
            }
        }
        if let Some(old) = self.nodes[node.index()].successors[index] {
            self.nodes[old.index()].predecessor = None;
        }
        self.nodes[node.index()].successors[index] = successor;
        if let Some(succ) = successor {
            self.nodes[succ.index()].predecessor = Some(node);
        }
        Ok(())
    }

    /// Set the `next` edge of a sequential fixed node.
    pub fn set_next(&mut self, node: NodeId, next: Option<NodeId>) -> Result<(), GraphError> {
        if !self.op(node).is_fixed_with_next() {
            return Err(self.unexpected(node, "fixed node with next"));
        }
        self.set_successor(node, 0, next)
    }

    /// Detach every successor of `node`.
    pub fn clear_successors(&mut self, node: NodeId) {
        let slots = std::mem::take(&mut self.nodes[node.index()].successors);
        for succ in slots.iter().flatten() {
            self.nodes[succ.index()].predecessor = None;
        }
        self.nodes[node.index()].successors = smallvec![None; slots.len()];
    }

    /// Point the predecessor's edge to `node` at `replacement` instead.
    ///
    /// `replacement` must not have a predecessor of its own.
    pub fn replace_at_predecessor(
        &mut self,
        node: NodeId,
        replacement: Option<NodeId>,
    ) -> Result<(), GraphError> {
        let predecessor = self
            .node(node)
            .predecessor
            .ok_or(GraphError::NoPredecessor(node))?;
        let index = self
            .node(predecessor)
            .successors
            .iter()
            .position(|&s| s == Some(node))
            .ok_or_else(|| GraphError::EdgeMismatch {
                node,
                detail: format!("not among the successors of {predecessor:?}"),
            })?;
        self.set_successor(predecessor, index, None)?;
        self.set_successor(predecessor, index, replacement)
    }

    // ── Deletion ────────────────────────────────────────────────

    /// Delete a node that nothing uses and nothing precedes.
    ///
    /// Drops its input edges (removing it from its inputs' usages) and
    /// detaches its successors.
    pub fn safe_delete(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.check_alive(id)?;
        let node = self.node(id);
        if !node.usages.is_empty() {
            return Err(GraphError::HasUsages {
                node: id,
                usages: node.usages.len(),
            });
        }
        if let Some(predecessor) = node.predecessor {
            return Err(GraphError::HasPredecessor {
                node: id,
                predecessor,
            });
        }
        let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
        for input in inputs {
            self.remove_usage(input, id);
        }
        self.clear_successors(id);
        self.nodes[id.index()].alive = false;
        self.live -= 1;
        tracing::trace!(node = ?id, "delete node");
        Ok(())
    }

    // ── Verification ────────────────────────────────────────────

    /// Check that both sides of every edge agree.
    pub fn verify(&self) -> Result<(), GraphError> {
        for id in self.live_nodes() {
            let node = self.node(id);
            for &input in &node.inputs {
                if !self.is_alive(input) {
                    return Err(mismatch(id, format!("input {input:?} is deleted")));
                }
                let edges = node.inputs.iter().filter(|&&i| i == input).count();
                let back = self.usages(input).iter().filter(|&&u| u == id).count();
                if edges != back {
                    return Err(mismatch(
                        id,
                        format!("{edges} edge(s) to {input:?} but {back} usage entries"),
                    ));
                }
            }
            for &user in &node.usages {
                if !self.is_alive(user) || !self.inputs(user).contains(&id) {
                    return Err(mismatch(id, format!("stale usage {user:?}")));
                }
            }
            for succ in node.successors.iter().flatten() {
                if !self.is_alive(*succ) || self.predecessor(*succ) != Some(id) {
                    return Err(mismatch(id, format!("successor {succ:?} points elsewhere")));
                }
            }
            if let Some(pred) = node.predecessor {
                if !self.is_alive(pred) || !self.successors(pred).contains(&Some(id)) {
                    return Err(mismatch(id, format!("stale predecessor {pred:?}")));
                }
            }
        }
        Ok(())
    }
}

fn mismatch(node: NodeId, detail: String) -> GraphError {
    GraphError::EdgeMismatch { node, detail }
}
