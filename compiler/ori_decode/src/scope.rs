//! Per-region decoding state.
//!
//! A [`RegionScope`] maps the order IDs of one encoded region to the graph
//! nodes created for them. A mapping is rewritten when a node is replaced
//! during decoding, so later references to the same order ID resolve to
//! the replacement.

use ori_graph::{Graph, Mark, NodeId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::encoded::OrderId;
use crate::error::DecodeError;

/// Order-ID table and bookkeeping for a region being decoded.
#[derive(Clone, Debug)]
pub struct RegionScope {
    created: Vec<Option<NodeId>>,
    /// Number of order IDs currently mapped to each node.
    registrations: FxHashMap<NodeId, u32>,
    /// Graph mark taken before the region's first node was added.
    start: Mark,
    /// Loop header → its phis that still expect back-edge values.
    loop_phis: FxHashMap<NodeId, SmallVec<[(OrderId, NodeId); 2]>>,
}

impl RegionScope {
    /// Scope for a region of `len` nodes, decoded into a graph whose
    /// current end is `start`.
    pub fn new(len: usize, start: Mark) -> Self {
        Self {
            created: vec![None; len],
            registrations: FxHashMap::default(),
            start,
            loop_phis: FxHashMap::default(),
        }
    }

    /// Mark separating pre-existing nodes from nodes this region created.
    pub fn start(&self) -> Mark {
        self.start
    }

    /// Node currently registered for `id`, if any.
    pub fn lookup(&self, id: OrderId) -> Option<NodeId> {
        self.created.get(id.index()).copied().flatten()
    }

    /// Like [`RegionScope::lookup`], but a mapping to a deleted node is an
    /// error.
    pub fn resolve(&self, graph: &Graph, id: OrderId) -> Result<Option<NodeId>, DecodeError> {
        match self.lookup(id) {
            Some(node) if !graph.is_alive(node) => {
                Err(DecodeError::DeletedReference { order_id: id, node })
            }
            found => Ok(found),
        }
    }

    /// Map `id` to `node`.
    ///
    /// Without `allow_overwrite`, `id` must not be mapped yet. Without
    /// `allow_duplicate`, `node` must not be mapped under any other order
    /// ID.
    pub fn register(
        &mut self,
        id: OrderId,
        node: NodeId,
        allow_overwrite: bool,
        allow_duplicate: bool,
    ) -> Result<(), DecodeError> {
        let Some(slot) = self.created.get(id.index()).copied() else {
            return Err(DecodeError::Malformed {
                order_id: id,
                reason: "order id outside the region",
            });
        };
        if let Some(existing) = slot {
            if !allow_overwrite {
                return Err(DecodeError::AlreadyRegistered {
                    order_id: id,
                    existing,
                });
            }
            self.unregister(existing);
        }
        if !allow_duplicate && self.registrations.contains_key(&node) {
            if let Some(previous) = slot {
                // Keep the table unchanged on failure.
                *self.registrations.entry(previous).or_default() += 1;
            }
            return Err(DecodeError::DuplicateRegistration { order_id: id, node });
        }
        *self.registrations.entry(node).or_default() += 1;
        self.created[id.index()] = Some(node);
        tracing::trace!(order_id = ?id, node = ?node, "register");
        Ok(())
    }

    fn unregister(&mut self, node: NodeId) {
        if let Some(count) = self.registrations.get_mut(&node) {
            *count -= 1;
            if *count == 0 {
                self.registrations.remove(&node);
            }
        }
    }

    /// Number of order IDs in the region.
    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    pub(crate) fn add_loop_phi(&mut self, header: NodeId, phi_id: OrderId, phi: NodeId) {
        self.loop_phis.entry(header).or_default().push((phi_id, phi));
    }

    pub(crate) fn loop_phis(&self, header: NodeId) -> SmallVec<[(OrderId, NodeId); 2]> {
        self.loop_phis.get(&header).cloned().unwrap_or_default()
    }
}
