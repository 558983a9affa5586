//! The causal document: a causal graph plus its cached projection
//!
//! Writes go through [`Document::add_operation`] (local) or
//! [`Document::receive`] (remote). Both insert into the graph and run the
//! reducer on the new node only, returning the resulting [`Patch`]. The
//! cached state moves forward through [`Document::apply_patch`], which swaps
//! in a new snapshot so readers holding an older one never see a half-applied
//! patch.

use super::graph::{CausalGraph, GraphError, MemoryGraph};
use super::operation::{Node, NodeId, Operation, SeqNum, SiteId};
use super::patch::{Entity, Patch, State};
use super::reducer::{project_state, reduce};
use crate::config::DocumentConfig;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node {0} holds a NaN or infinite float")]
    NonFiniteValue(NodeId),
}

/// Result of adding a local operation
#[derive(Clone, Debug, PartialEq)]
pub struct Added {
    /// The node as placed in the graph; use its id as the cause of follow-ups
    pub node: Node,
    /// What the node changed in projected state
    pub patch: Patch,
}

/// A replicated bot document owned by one site
pub struct Document<G: CausalGraph = MemoryGraph> {
    /// This replica's identity
    site: SiteId,

    /// Highest sequence number seen from any site
    clock: SeqNum,

    /// Priority given to local nodes when none is requested
    default_priority: u32,

    graph: G,

    /// Current projection; replaced, never mutated under a reader
    state: Arc<State>,

    /// Incremented on every applied patch
    version: u64,
}

impl Document<MemoryGraph> {
    /// Create an empty document backed by an in-memory graph
    pub fn new(site: impl Into<SiteId>) -> Self {
        Self::with_graph(site, MemoryGraph::new())
    }

    /// Create an empty document from configuration
    pub fn from_config(config: &DocumentConfig) -> Self {
        let mut doc = Self::new(config.site.clone());
        doc.default_priority = config.default_priority;
        doc
    }
}

impl<G: CausalGraph> Document<G> {
    /// Wrap an existing graph; the cached state is projected from scratch
    pub fn with_graph(site: impl Into<SiteId>, graph: G) -> Self {
        let clock = graph.nodes().iter().map(|n| n.id.seq).max().unwrap_or(0);
        let state = project_state(&graph);
        Self {
            site: site.into(),
            clock,
            default_priority: 0,
            graph,
            state: Arc::new(state),
            version: 0,
        }
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    pub fn clock(&self) -> SeqNum {
        self.clock
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Current projected state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// A snapshot that stays valid while the document moves on
    pub fn snapshot(&self) -> Arc<State> {
        Arc::clone(&self.state)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.state.get(id)
    }

    /// Append a local operation under `cause`.
    ///
    /// The node gets the next Lamport counter for this site. The returned
    /// patch is not applied; pass it to [`Document::apply_patch`] (possibly
    /// after merging it with others).
    pub fn add_operation(
        &mut self,
        cause: Option<&NodeId>,
        op: Operation,
        priority: Option<u32>,
    ) -> Result<Added, DocumentError> {
        let id = NodeId::new(self.site.clone(), self.clock + 1);
        if !op.is_well_formed() {
            return Err(DocumentError::NonFiniteValue(id));
        }
        let node = Node::new(id, cause.cloned(), priority.unwrap_or(self.default_priority), op);

        let node = self.graph.insert(node)?;
        self.clock = self.clock.max(node.id.seq);
        log::debug!("{} added {} node {}", self.site, node.op.kind(), node.id);

        let patch = reduce(&self.graph, &node);
        Ok(Added { node, patch })
    }

    /// Add a local operation and apply its patch; returns the new node
    pub fn apply_local(&mut self, cause: Option<&NodeId>, op: Operation) -> Result<Node, DocumentError> {
        let Added { node, patch } = self.add_operation(cause, op, None)?;
        self.apply_patch(&patch);
        Ok(node)
    }

    /// Insert a node authored by another site.
    ///
    /// Its cause must already be present. A node that is already known
    /// produces the identity patch.
    pub fn receive(&mut self, node: Node) -> Result<Patch, DocumentError> {
        if let Some(existing) = self.graph.get_node(&node.id) {
            if existing.hash == node.hash {
                return Ok(Patch::identity());
            }
        }
        if !node.op.is_well_formed() {
            log::warn!("{} rejected remote node {}: non-finite value", self.site, node.id);
            return Err(DocumentError::NonFiniteValue(node.id));
        }

        let node = self.graph.insert(node).map_err(|e| {
            log::warn!("{} rejected remote node: {}", self.site, e);
            e
        })?;
        self.clock = self.clock.max(node.id.seq);

        Ok(reduce(&self.graph, &node))
    }

    /// Receive a remote node and apply its patch
    pub fn apply_remote(&mut self, node: Node) -> Result<(), DocumentError> {
        let patch = self.receive(node)?;
        self.apply_patch(&patch);
        Ok(())
    }

    /// Merge a patch into the cached state
    pub fn apply_patch(&mut self, patch: &Patch) {
        if patch.is_identity() {
            return;
        }
        patch.apply_to(Arc::make_mut(&mut self.state));
        self.version += 1;
    }

    /// Recompute the projection from the graph alone
    pub fn rebuild(&self) -> State {
        project_state(&self.graph)
    }

    /// Number of nodes this replica holds; a sync mark for [`Document::nodes_since`]
    pub fn mark(&self) -> usize {
        self.graph.len()
    }

    /// Nodes that reached this replica after `mark`, in arrival order.
    ///
    /// Arrival order rather than Lamport counters: a site that was offline
    /// can deliver nodes with low counters long after higher ones arrived.
    pub fn nodes_since(&self, mark: usize) -> Vec<&Node> {
        self.graph.nodes().into_iter().skip(mark).collect()
    }
}
