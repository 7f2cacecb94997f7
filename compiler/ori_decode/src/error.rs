//! Decode errors.
//!
//! Every variant except [`DecodeError::Malformed`] reports a broken
//! decoder invariant rather than bad input. Decoding stops at the first
//! error and the graph is left as it was at that point.

use ori_graph::{GraphError, NodeId};
use thiserror::Error;

use crate::encoded::OrderId;

/// Failure while building, loading or decoding an encoded region.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The encoding itself is inconsistent.
    #[error("malformed encoding at {order_id:?}: {reason}")]
    Malformed {
        order_id: OrderId,
        reason: &'static str,
    },

    /// A branch proven unreachable already had its own successors decoded.
    #[error("dead successor {successor:?} of {split:?} already has decoded successors")]
    DeadSuccessorDecoded { split: NodeId, successor: NodeId },

    /// The order ID of a node being replaced no longer maps to that node.
    #[error("order id {order_id:?} maps to {found:?}, expected {expected:?}")]
    OrderIdRemapped {
        order_id: OrderId,
        expected: NodeId,
        found: Option<NodeId>,
    },

    /// An order ID was registered twice without permission to overwrite.
    #[error("order id {order_id:?} is already registered to {existing:?}")]
    AlreadyRegistered {
        order_id: OrderId,
        existing: NodeId,
    },

    /// A node was registered under a second order ID without permission.
    #[error("{node:?} is already registered under another order id than {order_id:?}")]
    DuplicateRegistration { order_id: OrderId, node: NodeId },

    /// An order ID resolves to a node that has been deleted.
    #[error("order id {order_id:?} resolves to deleted node {node:?}")]
    DeletedReference { order_id: OrderId, node: NodeId },

    /// A rewrite rule proposed a fixed replacement the decoder cannot splice.
    #[error("cannot substitute {node:?} with a new {replacement} node")]
    UnsupportedReplacement { node: NodeId, replacement: String },

    /// A graph edit failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Serializing or loading a cached encoding failed.
    #[cfg(feature = "cache")]
    #[error("encoded graph cache: {0}")]
    Cache(String),
}
