//! Convergent bot documents
//!
//! A document is a causal tree of operations. Entities are roots, fields hang
//! off entities, value revisions hang off fields and text edits hang off
//! values. Projected state is derived from the tree alone, so every replica
//! that holds the same nodes holds the same state.

mod document;
mod graph;
mod operation;
mod patch;
mod reducer;
mod sync;
mod traversal;

pub use document::{Added, Document, DocumentError};
pub use graph::{sibling_order, CausalGraph, GraphError, MemoryGraph};
pub use operation::{
    canonical_bytes, content_hash, field_value_hash, EntityId, KeypairMaterial, Node, NodeId,
    Operation, SeqNum, SiteId, Value,
};
pub use patch::{merge_patches, Entity, EntityPatch, FieldPatch, Patch, State};
pub use reducer::{project_entity, project_field, project_state, reduce};
pub use sync::{NodeBatch, SyncError};
pub use traversal::{
    entity_id_for, find_edit_position, find_entity_node, find_field_node, find_value_node,
    first_role_child, is_tombstoned, render_text, role_children, EditPosition,
};
