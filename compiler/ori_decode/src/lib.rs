//! Graph decoding for the Ori optimizer.
//!
//! Turns an encoded region ([`EncodedGraph`]) back into nodes of an
//! [`ori_graph::Graph`], optionally simplifying it on the way.
//!
//! This crate provides:
//!
//! - **Encoded regions** ([`EncodedGraph`], [`EncodedGraphBuilder`],
//!   [`OrderId`]): position-addressed nodes with forward references,
//!   validated once when built or loaded.
//!
//! - **The decoding walk** ([`decode`], [`DecoderHooks`]): rebuilds the
//!   region in control-flow order and calls out at every decision point.
//!   [`PlainDecoder`] rebuilds the region unchanged.
//!
//! - **Simplifying decoding** ([`SimplifyingDecoder`]): folds constant
//!   splits and guards, applies rewrite rules to each node as soon as it
//!   is built, then cleans up the region.
//!
//! # Example
//!
//! ```text
//! let mut decoder = SimplifyingDecoder::new(&analysis, &analysis, DecodeOptions::default());
//! let scope = decode(&mut decoder, &mut graph, &encoded)?;
//! let ret = scope.lookup(return_id);
//! ```

mod decoder;
mod encoded;
mod error;
mod scope;
mod simplify;
mod stack;

#[cfg(test)]
mod test_helpers;

pub use decoder::{decode, DecoderHooks, FloatingNode, PlainDecoder};
pub use encoded::{EncodedGraph, EncodedGraphBuilder, EncodedNode, OrderId};
pub use error::DecodeError;
pub use scope::RegionScope;
pub use simplify::{DecodeCanonicalizerTool, DecodeOptions, SimplifyStats, SimplifyingDecoder};
