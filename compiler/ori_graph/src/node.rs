//! Node storage types.
//!
//! A [`Node`] lives in the graph arena and is addressed by [`NodeId`].
//! Edges are stored as id lists on both ends: inputs on the user with the
//! matching entry in the input's `usages`, successors on the predecessor
//! with the matching `predecessor` back pointer. Redirecting an edge is an
//! id rewrite on both lists.
//!
//! A [`NewNode`] describes a node that is not part of the graph yet, as
//! produced by the decoder or by a rewrite rule.

use std::fmt;

use smallvec::SmallVec;

use crate::op::Op;
use crate::stamp::Stamp;

/// Stable index of a node in the graph arena.
///
/// Deleted nodes keep their slot, so an id is never reused within one graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node ID from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Position in the arena at some point in time.
///
/// Every node created after the mark was taken has an id at or above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mark(pub(crate) u32);

impl Mark {
    /// Whether `node` was created after this mark was taken.
    #[inline]
    pub fn contains(self, node: NodeId) -> bool {
        node.raw() >= self.0
    }
}

/// A graph node.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) op: Op,
    pub(crate) stamp: Stamp,
    pub(crate) inputs: SmallVec<[NodeId; 2]>,
    pub(crate) successors: SmallVec<[Option<NodeId>; 2]>,
    pub(crate) predecessor: Option<NodeId>,
    /// One entry per input edge pointing at this node.
    pub(crate) usages: SmallVec<[NodeId; 4]>,
    pub(crate) alive: bool,
}

impl Node {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn successors(&self) -> &[Option<NodeId>] {
        &self.successors
    }

    pub fn predecessor(&self) -> Option<NodeId> {
        self.predecessor
    }

    pub fn usages(&self) -> &[NodeId] {
        &self.usages
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Input of a node that is not part of the graph yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Input {
    /// A node already in the graph.
    Node(NodeId),
    /// Another new node, added together with its user.
    New(Box<NewNode>),
}

/// A node that has not been added to the graph.
///
/// A `NewNode` has no id and therefore no usages: nothing can reference it
/// until it is added.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NewNode {
    pub op: Op,
    pub stamp: Stamp,
    pub inputs: SmallVec<[Input; 2]>,
}

impl NewNode {
    /// A new node with no inputs.
    pub fn new(op: Op, stamp: Stamp) -> Self {
        Self {
            op,
            stamp,
            inputs: SmallVec::new(),
        }
    }

    /// Add live inputs, in order.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = NodeId>) -> Self {
        self.inputs.extend(inputs.into_iter().map(Input::Node));
        self
    }

    /// Add a nested new input.
    #[must_use]
    pub fn with_new_input(mut self, input: NewNode) -> Self {
        self.inputs.push(Input::New(Box::new(input)));
        self
    }

    /// The input ids, if every input is already part of the graph.
    pub fn live_inputs(&self) -> Option<SmallVec<[NodeId; 2]>> {
        self.inputs
            .iter()
            .map(|input| match input {
                Input::Node(id) => Some(*id),
                Input::New(_) => None,
            })
            .collect()
    }
}
