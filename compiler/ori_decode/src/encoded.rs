//! Encoded regions.
//!
//! An [`EncodedGraph`] is the compact, position-addressed form of a graph
//! region. Nodes refer to each other by [`OrderId`] (their position in the
//! encoding), which allows forward references: a node may name an input
//! or successor that appears later.
//!
//! Order IDs double as the decoding schedule. The decoder processes fixed
//! nodes in ascending order, so the encoding must be topological for
//! control flow:
//!
//! - every successor comes after its predecessor;
//! - every end comes before the merge or loop header it flows into;
//! - every loop end comes after its loop header.
//!
//! [`EncodedGraphBuilder::finish`] checks these rules (and the edge
//! layout of every node) once, so the decoder can trust the encoding.
//!
//! # Phis
//!
//! A phi's inputs are `[merge, values..]`. For a merge there is one value
//! per end, in the merge's end order. For a loop header there is the
//! forward value followed by one value per loop end, in ascending order
//! ID of the loop ends.

use std::fmt;

use ori_graph::{Op, Stamp};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::DecodeError;

/// Position of a node in an encoded region.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct OrderId(u32);

impl OrderId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "encoded regions have fewer than u32::MAX nodes"
    )]
    pub(crate) fn at(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One node of an encoded region.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedNode {
    pub op: Op,
    pub stamp: Stamp,
    pub inputs: Vec<OrderId>,
    pub successors: Vec<OrderId>,
}

impl EncodedNode {
    pub fn new(op: Op, stamp: Stamp) -> Self {
        Self {
            op,
            stamp,
            inputs: Vec::new(),
            successors: Vec::new(),
        }
    }

    /// A fixed node without a value.
    pub fn control(op: Op) -> Self {
        Self::new(op, Stamp::Void)
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = OrderId>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    #[must_use]
    pub fn with_successors(mut self, successors: impl IntoIterator<Item = OrderId>) -> Self {
        self.successors.extend(successors);
        self
    }
}

/// Lookup tables derived from the nodes when the encoding is validated.
#[derive(Clone, Debug, Default)]
struct Index {
    /// End → the merge or loop header it flows into.
    end_targets: FxHashMap<OrderId, OrderId>,
    /// Merge or loop header → its phis, in order.
    phis: FxHashMap<OrderId, SmallVec<[OrderId; 4]>>,
    /// Loop end → its position among its header's loop ends.
    loop_end_slots: FxHashMap<OrderId, usize>,
}

/// A validated encoded region.
#[derive(Clone, Debug)]
pub struct EncodedGraph {
    nodes: Vec<EncodedNode>,
    start: OrderId,
    index: Index,
}

impl EncodedGraph {
    /// The region's entry node.
    pub fn start(&self) -> OrderId {
        self.start
    }

    pub fn node(&self, id: OrderId) -> &EncodedNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OrderId, &EncodedNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (OrderId::at(idx), node))
    }

    /// The merge or loop header that `end` flows into.
    pub(crate) fn end_target(&self, end: OrderId) -> Option<OrderId> {
        self.index.end_targets.get(&end).copied()
    }

    pub(crate) fn phis(&self, merge: OrderId) -> &[OrderId] {
        self.index.phis.get(&merge).map_or(&[][..], SmallVec::as_slice)
    }

    pub(crate) fn loop_end_slot(&self, loop_end: OrderId) -> Option<usize> {
        self.index.loop_end_slots.get(&loop_end).copied()
    }

    /// Serialize for caching.
    #[cfg(feature = "cache")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        bincode::serialize(&(self.start, &self.nodes))
            .map_err(|e| DecodeError::Cache(format!("failed to serialize encoded graph: {e}")))
    }

    /// Load a cached encoding. The result is validated like a freshly
    /// built one.
    #[cfg(feature = "cache")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (start, nodes): (OrderId, Vec<EncodedNode>) = bincode::deserialize(bytes)
            .map_err(|e| DecodeError::Cache(format!("failed to deserialize encoded graph: {e}")))?;
        Self::validated(nodes, start)
    }

    fn validated(nodes: Vec<EncodedNode>, start: OrderId) -> Result<Self, DecodeError> {
        let index = Validator { nodes: &nodes }.run(start)?;
        Ok(Self {
            nodes,
            start,
            index,
        })
    }
}

/// Incremental construction of an [`EncodedGraph`].
///
/// Forward references are made by reserving an order ID first and
/// defining its node later.
#[derive(Debug, Default)]
pub struct EncodedGraphBuilder {
    nodes: Vec<Option<EncodedNode>>,
}

impl EncodedGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next order ID without defining its node.
    pub fn reserve(&mut self) -> OrderId {
        let id = OrderId::at(self.nodes.len());
        self.nodes.push(None);
        id
    }

    /// Define a previously reserved node.
    pub fn define(&mut self, id: OrderId, node: EncodedNode) -> Result<(), DecodeError> {
        match self.nodes.get_mut(id.index()) {
            Some(slot @ None) => {
                *slot = Some(node);
                Ok(())
            }
            Some(Some(_)) => Err(malformed(id, "node defined twice")),
            None => Err(malformed(id, "order id was never reserved")),
        }
    }

    /// Append a node at the next order ID.
    pub fn push(&mut self, node: EncodedNode) -> OrderId {
        let id = OrderId::at(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    /// Validate and seal the region, with `start` as its entry.
    pub fn finish(self, start: OrderId) -> Result<EncodedGraph, DecodeError> {
        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(idx, node)| node.ok_or_else(|| malformed(OrderId::at(idx), "reserved but never defined")))
            .collect::<Result<Vec<_>, _>>()?;
        EncodedGraph::validated(nodes, start)
    }
}

fn malformed(order_id: OrderId, reason: &'static str) -> DecodeError {
    DecodeError::Malformed { order_id, reason }
}

struct Validator<'a> {
    nodes: &'a [EncodedNode],
}

impl Validator<'_> {
    fn run(&self, start: OrderId) -> Result<Index, DecodeError> {
        if !matches!(self.get(start).map(|n| &n.op), Some(Op::Start)) {
            return Err(malformed(start, "region start is not a start node"));
        }
        let mut index = Index::default();
        let mut loop_ends: FxHashMap<OrderId, Vec<OrderId>> = FxHashMap::default();

        for (idx, node) in self.nodes.iter().enumerate() {
            let id = OrderId::at(idx);
            self.check_layout(id, node)?;
            match node.op {
                Op::Merge | Op::LoopBegin => {
                    for &end in &node.inputs {
                        if index.end_targets.insert(end, id).is_some() {
                            return Err(malformed(end, "end flows into more than one merge"));
                        }
                    }
                }
                Op::LoopEnd => loop_ends.entry(node.inputs[0]).or_default().push(id),
                Op::Phi => index.phis.entry(node.inputs[0]).or_default().push(id),
                _ => {}
            }
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            if matches!(node.op, Op::End) && !index.end_targets.contains_key(&OrderId::at(idx)) {
                return Err(malformed(OrderId::at(idx), "end does not flow into a merge"));
            }
        }

        // Loop ends were collected in ascending order.
        for ends in loop_ends.values() {
            for (slot, &end) in ends.iter().enumerate() {
                index.loop_end_slots.insert(end, slot);
            }
        }

        for phis in index.phis.values() {
            for &phi in phis {
                let node = &self.nodes[phi.index()];
                let merge = &self.nodes[node.inputs[0].index()];
                let expected = match merge.op {
                    Op::LoopBegin => 1 + loop_ends.get(&node.inputs[0]).map_or(0, Vec::len),
                    _ => merge.inputs.len(),
                };
                if node.inputs.len() != expected + 1 {
                    return Err(malformed(phi, "phi value count does not match its merge"));
                }
            }
        }

        self.check_floating_acyclic()?;
        Ok(index)
    }

    fn get(&self, id: OrderId) -> Option<&EncodedNode> {
        self.nodes.get(id.index())
    }

    fn op(&self, id: OrderId) -> &Op {
        &self.nodes[id.index()].op
    }

    fn check_layout(&self, id: OrderId, node: &EncodedNode) -> Result<(), DecodeError> {
        let in_range = |r: &OrderId| r.index() < self.nodes.len();
        if !node.inputs.iter().chain(&node.successors).all(in_range) {
            return Err(malformed(id, "reference out of range"));
        }
        if node.successors.len() != node.op.successor_count() {
            return Err(malformed(id, "wrong number of successors"));
        }
        for &succ in &node.successors {
            let op = self.op(succ);
            if !op.is_fixed() || op.is_abstract_merge() || matches!(op, Op::Start) {
                return Err(malformed(id, "successor must be a fixed node that is not a merge"));
            }
            if succ <= id {
                return Err(malformed(id, "successor precedes its predecessor"));
            }
        }
        match node.op {
            Op::Merge => {
                if node.inputs.is_empty() {
                    return Err(malformed(id, "merge without ends"));
                }
                if !node.inputs.windows(2).all(|w| w[0] < w[1]) {
                    return Err(malformed(id, "merge ends are not in ascending order"));
                }
                self.check_ends(id, node)
            }
            Op::LoopBegin => {
                if node.inputs.len() != 1 {
                    return Err(malformed(id, "loop header needs exactly one forward end"));
                }
                self.check_ends(id, node)
            }
            Op::LoopEnd => match node.inputs.as_slice() {
                [header] if matches!(self.op(*header), Op::LoopBegin) && *header < id => Ok(()),
                _ => Err(malformed(id, "loop end must follow its loop header")),
            },
            Op::Phi => match node.inputs.first() {
                Some(&merge) if self.op(merge).is_abstract_merge() => Ok(()),
                _ => Err(malformed(id, "phi is not attached to a merge")),
            },
            Op::End | Op::Start | Op::Begin | Op::KillingBegin if !node.inputs.is_empty() => {
                Err(malformed(id, "node kind takes no inputs"))
            }
            _ => Ok(()),
        }
    }

    fn check_ends(&self, id: OrderId, node: &EncodedNode) -> Result<(), DecodeError> {
        for &end in &node.inputs {
            if !matches!(self.op(end), Op::End) {
                return Err(malformed(id, "merge input is not an end"));
            }
            if end >= id {
                return Err(malformed(id, "end does not precede its merge"));
            }
        }
        Ok(())
    }

    /// Floating nodes other than phis are decoded by recursing into their
    /// inputs, so they must not form a cycle.
    fn check_floating_acyclic(&self) -> Result<(), DecodeError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let recursive = |id: OrderId| {
            let op = self.op(id);
            op.is_floating() && !matches!(op, Op::Phi)
        };
        let mut color = vec![Color::White; self.nodes.len()];
        let mut stack: Vec<(OrderId, usize)> = Vec::new();

        for idx in 0..self.nodes.len() {
            let root = OrderId::at(idx);
            if !recursive(root) || color[idx] != Color::White {
                continue;
            }
            color[idx] = Color::Gray;
            stack.push((root, 0));
            while let Some((id, next)) = stack.last_mut() {
                let inputs = &self.nodes[id.index()].inputs;
                if let Some(&input) = inputs.get(*next) {
                    *next += 1;
                    if !recursive(input) {
                        continue;
                    }
                    match color[input.index()] {
                        Color::White => {
                            color[input.index()] = Color::Gray;
                            stack.push((input, 0));
                        }
                        Color::Gray => return Err(malformed(input, "cycle among floating nodes")),
                        Color::Black => {}
                    }
                } else {
                    color[id.index()] = Color::Black;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
