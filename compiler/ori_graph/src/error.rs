//! Graph consistency errors.
//!
//! Every variant is an internal-consistency fault: a rewrite rule or the
//! decoding walk asked for an edit that would break the graph's structural
//! invariants. Callers are expected to abort the unit, not recover.

use thiserror::Error;

use crate::node::NodeId;

/// An edit that would leave the graph structurally inconsistent.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The node was already deleted.
    #[error("node {0:?} is not alive")]
    NotAlive(NodeId),

    /// Deleting a node that other nodes still use as input.
    #[error("cannot delete {node:?}: still used by {usages} node(s)")]
    HasUsages { node: NodeId, usages: usize },

    /// Deleting a node that is still the successor of another node.
    #[error("cannot delete {node:?}: still attached to predecessor {predecessor:?}")]
    HasPredecessor { node: NodeId, predecessor: NodeId },

    /// Attaching a successor that already has a predecessor.
    #[error("{node:?} already has predecessor {predecessor:?}")]
    PredecessorTaken { node: NodeId, predecessor: NodeId },

    /// A structural edit needs a predecessor and the node has none.
    #[error("{0:?} has no predecessor")]
    NoPredecessor(NodeId),

    /// A successor index outside the node's successor slots.
    #[error("{node:?} has no successor slot {index}")]
    NoSuccessorSlot { node: NodeId, index: usize },

    /// The node does not have the shape this operation needs.
    #[error("{node:?} is a {found}, expected {expected}")]
    UnexpectedKind {
        node: NodeId,
        found: String,
        expected: &'static str,
    },

    /// A node about to be added references a node that is not in the graph.
    #[error("input {input:?} of a new node is not alive")]
    DeadInput { input: NodeId },

    /// A nested not-yet-added input was passed where only live inputs are allowed.
    #[error("new node has inputs that are not part of the graph yet")]
    UnaddedInput,

    /// Edge bookkeeping out of sync, found by [`Graph::verify`](crate::Graph::verify).
    #[error("edge mismatch at {node:?}: {detail}")]
    EdgeMismatch { node: NodeId, detail: String },
}
