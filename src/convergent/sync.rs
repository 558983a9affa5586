//! Node batches exchanged between replicas
//!
//! The core defines no transport. This is the payload a transport can carry:
//! a batch of nodes, causes first, encoded as CBOR for compact links.

use super::document::{Document, DocumentError};
use super::graph::CausalGraph;
use super::operation::{Node, SeqNum, SiteId};
use super::patch::Patch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Nodes that reached a site after some sync mark
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeBatch {
    /// Site that assembled the batch
    pub from: SiteId,
    /// The sender's clock when the batch was assembled
    pub clock: SeqNum,
    /// The sender's mark after this batch; ask for `since(mark)` next time
    pub mark: usize,
    pub nodes: Vec<Node>,
}

impl NodeBatch {
    /// Everything that reached `doc` after `mark` (see [`Document::mark`])
    pub fn since<G: CausalGraph>(doc: &Document<G>, mark: usize) -> Self {
        Self {
            from: doc.site().clone(),
            clock: doc.clock(),
            mark: doc.mark(),
            nodes: doc.nodes_since(mark).into_iter().cloned().collect(),
        }
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, SyncError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| SyncError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(data: &[u8]) -> Result<Self, SyncError> {
        ciborium::from_reader(data).map_err(|e| SyncError::SerializationError(e.to_string()))
    }

    /// Receive every node into `doc`, folding the patches in order.
    ///
    /// Stops at the first node the graph rejects; patches of the nodes before
    /// it are already applied.
    pub fn apply_to<G: CausalGraph>(self, doc: &mut Document<G>) -> Result<Patch, SyncError> {
        let mut merged = Patch::identity();
        for node in self.nodes {
            let patch = doc.receive(node)?;
            doc.apply_patch(&patch);
            merged = merged.merge(patch);
        }
        log::debug!(
            "{} applied batch from {} ({} entit(ies) changed)",
            doc.site(),
            self.from,
            merged.entities.len()
        );
        Ok(merged)
    }
}
