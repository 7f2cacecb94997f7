//! Program graph for the Ori optimizer.
//!
//! This crate provides:
//!
//! - **Graph** ([`Graph`], [`Node`], [`NodeId`]): an arena of nodes with
//!   two edge kinds: data inputs (mirrored as usages on the input) and
//!   control successors (mirrored as a predecessor pointer). Floating
//!   nodes can be inserted with deduplication ([`Graph::add_or_unique`]).
//!
//! - **Node kinds** ([`Op`]): a closed set covering control nodes
//!   (sequential, splits, merges, guards, ends and sinks) and floating
//!   data nodes. Each kind has a fixed edge layout, documented on [`op`].
//!
//! - **Stamps** ([`Stamp`]): per-node abstraction of possible runtime
//!   values, with `meet`/`join` lattice operations.
//!
//! - **Structural edits**: splice, unlink, split removal, trivial-merge
//!   reduction, loop normalization and unused-node reclamation, all
//!   keeping both sides of every edge in sync.
//!
//! - **Rewrite rules** ([`canonical()`], [`Canonical`], [`CanonicalizerTool`]):
//!   node-local simplifications that propose a replacement without editing
//!   the graph themselves.
//!
//! # Design
//!
//! Nodes reference each other by index, never by pointer. Usage lists hold
//! one entry per input edge, so redirecting or deleting a node is an index
//! rewrite on both ends and a node with a non-empty usage list can never be
//! deleted by accident: [`Graph::safe_delete`] refuses it.

pub mod canonical;
mod cfg;
mod error;
mod graph;
mod node;
pub mod op;
mod stamp;

#[cfg(test)]
mod test_helpers;

pub use canonical::{
    canonical, is_canonicalizable, Canonical, CanonicalizerTool, ConstantReflectionProvider,
    MetaAccessProvider, NoAnalysis, NodeView, Replacement,
};
pub use error::GraphError;
pub use graph::Graph;
pub use node::{Input, Mark, NewNode, Node, NodeId};
pub use op::{
    BinaryOp, CompareOp, Constant, DeoptAction, DeoptReason, FieldId, ObjectId, Op,
};
pub use stamp::{Nullness, Stamp};
