//! The causal graph contract, and an in-memory graph that honours it
//!
//! Everything above this module (reducer, traversal, document) only talks to
//! [`CausalGraph`]. The ordering among siblings is what makes projection
//! deterministic: it must depend on node content alone, never on arrival order.

use super::operation::{Node, NodeId};
use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Cause {cause} of node {node} is not in the graph")]
    MissingCause { node: NodeId, cause: NodeId },

    #[error("Node {0} already exists with different content")]
    ConflictingNode(NodeId),

    #[error("Hash of node {0} does not match its content")]
    HashMismatch(NodeId),
}

/// The four operations the document core needs from a causal graph.
pub trait CausalGraph {
    /// Insert a node, or confirm one that is already present.
    fn insert(&mut self, node: Node) -> Result<Node, GraphError>;

    /// Direct children of `parent` (roots when `None`) in canonical order.
    /// The first element is the tie-break winner of the group.
    fn causal_group(&self, parent: Option<&NodeId>) -> Vec<&Node>;

    /// `[node, parent, grandparent, ...]` up to `depth` entries, `None`
    /// wherever a link is missing.
    fn reference_chain(&self, id: &NodeId, depth: usize) -> Vec<Option<&Node>>;

    fn get_node(&self, id: &NodeId) -> Option<&Node>;

    /// All nodes in insertion order, which puts causes before effects.
    /// Positions in this list never change once assigned.
    fn nodes(&self) -> Vec<&Node>;

    fn len(&self) -> usize {
        self.nodes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical sibling order: higher priority first, then newer (higher Lamport
/// counter) first, then lower hash first.
pub fn sibling_order(a: &Node, b: &Node) -> Ordering {
    sibling_key(a).cmp(&sibling_key(b))
}

fn sibling_key(node: &Node) -> (Reverse<u32>, Reverse<u64>, &str) {
    (Reverse(node.priority), Reverse(node.id.seq), node.hash.as_str())
}

/// Graph held entirely in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryGraph {
    nodes: HashMap<NodeId, Node>,

    /// Children per parent (`None` for roots), kept in canonical order
    children: HashMap<Option<NodeId>, Vec<NodeId>>,

    /// Insertion order; always causally consistent
    order: Vec<NodeId>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CausalGraph for MemoryGraph {
    fn insert(&mut self, node: Node) -> Result<Node, GraphError> {
        if let Some(existing) = self.nodes.get(&node.id) {
            if existing.hash == node.hash {
                return Ok(existing.clone());
            }
            return Err(GraphError::ConflictingNode(node.id));
        }

        if !node.verify_hash() {
            return Err(GraphError::HashMismatch(node.id));
        }

        if let Some(cause) = &node.cause {
            if !self.nodes.contains_key(cause) {
                return Err(GraphError::MissingCause {
                    node: node.id,
                    cause: cause.clone(),
                });
            }
        }

        let nodes = &self.nodes;
        let siblings = self.children.entry(node.cause.clone()).or_default();
        let position = siblings
            .binary_search_by(|id| sibling_order(&nodes[id], &node))
            .unwrap_or_else(|pos| pos);
        siblings.insert(position, node.id.clone());

        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    fn causal_group(&self, parent: Option<&NodeId>) -> Vec<&Node> {
        self.children
            .get(&parent.cloned())
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    fn reference_chain(&self, id: &NodeId, depth: usize) -> Vec<Option<&Node>> {
        let mut chain = Vec::with_capacity(depth);
        let mut next = self.nodes.get(id);
        for _ in 0..depth {
            chain.push(next);
            next = next
                .and_then(|node| node.cause.as_ref())
                .and_then(|cause| self.nodes.get(cause));
        }
        chain
    }

    fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn nodes(&self) -> Vec<&Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}
