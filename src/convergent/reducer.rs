//! Projection of the causal graph into entity state
//!
//! [`reduce`] is the incremental path: given the graph and the node that was
//! just inserted, it returns the patch describing exactly what that node
//! changed. [`project_state`] is the from-scratch path and defines what the
//! incremental path must agree with.
//!
//! The single conflict rule is first-sibling-wins: among the role children of
//! an entity or field, the first in the graph's canonical order decides.

use super::graph::CausalGraph;
use super::operation::{Node, Operation};
use super::patch::{Entity, FieldPatch, Patch, State};
use super::traversal::{entity_id_for, find_entity_node, find_field_node, first_role_child, role_children};

/// Projection of one field node: its winning value, or absent
pub fn project_field<G: CausalGraph + ?Sized>(graph: &G, field_node: &Node) -> FieldPatch {
    match first_role_child(graph, field_node).map(|child| &child.op) {
        Some(Operation::SetValue { value }) => FieldPatch::from_value(value),
        _ => FieldPatch::Absent,
    }
}

/// Projection of one entity root, ignoring whether the root itself is live
pub fn project_entity<G: CausalGraph + ?Sized>(graph: &G, root: &Node) -> Entity {
    let mut entity = Entity::new(entity_id_for(root).unwrap_or_default());
    for child in graph.causal_group(Some(&root.id)) {
        let Operation::CreateField { name } = &child.op else {
            continue;
        };
        // Earlier fields shadow later ones with the same name
        if name.is_empty() || find_field_node(graph, root, name).map(|f| &f.id) != Some(&child.id) {
            continue;
        }
        if let FieldPatch::Set(value) = project_field(graph, child) {
            entity.fields.insert(name.clone(), value);
        }
    }
    entity
}

/// Full projection of the graph
pub fn project_state<G: CausalGraph + ?Sized>(graph: &G) -> State {
    let mut state = State::new();
    for root in graph.causal_group(None) {
        let Some(id) = entity_id_for(root) else {
            continue;
        };
        if state.contains_key(&id) {
            continue;
        }
        if find_entity_node(graph, &id).map(|n| &n.id) == Some(&root.id) {
            state.insert(id, project_entity(graph, root));
        }
    }
    state
}

/// The patch produced by inserting `node` into `graph`.
///
/// `node` must already be in `graph`. Malformed or losing nodes yield the
/// identity patch; they stay in the graph but change nothing.
pub fn reduce<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> Patch {
    let patch = match &node.op {
        Operation::CreateEntity { .. } => reduce_entity(graph, node),
        Operation::CreateField { .. } => reduce_field(graph, node),
        Operation::SetValue { .. } => reduce_value(graph, node),
        Operation::DeleteRange {
            start: None,
            end: None,
        } => reduce_tombstone(graph, node),
        Operation::DeleteRange { .. }
        | Operation::InsertText { .. }
        | Operation::CreateCertificate { .. }
        | Operation::CreateSignature { .. }
        | Operation::CreateRevocation { .. }
        | Operation::CreateFieldMask { .. } => Patch::identity(),
    };

    if patch.is_identity() {
        log::trace!("{} node {} changed nothing", node.op.kind(), node.id);
    } else {
        log::debug!(
            "{} node {} patched {} entit(ies)",
            node.op.kind(),
            node.id,
            patch.entities.len()
        );
    }
    patch
}

fn inert(node: &Node, reason: &str) -> Patch {
    log::trace!("inert {} node {}: {}", node.op.kind(), node.id, reason);
    Patch::identity()
}

/// Whether `root` is the root its entity id currently resolves to
fn is_live_root<G: CausalGraph + ?Sized>(graph: &G, root: &Node) -> bool {
    root.cause.is_none()
        && entity_id_for(root)
            .and_then(|id| find_entity_node(graph, &id))
            .is_some_and(|winner| winner.id == root.id)
}

fn is_winning_field<G: CausalGraph + ?Sized>(graph: &G, root: &Node, field: &Node, name: &str) -> bool {
    find_field_node(graph, root, name).is_some_and(|winner| winner.id == field.id)
}

fn reduce_entity<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> Patch {
    if node.cause.is_some() {
        return inert(node, "entity root has a cause");
    }
    if !is_live_root(graph, node) {
        return inert(node, "another root already owns this entity id");
    }
    Patch::replaced(project_entity(graph, node))
}

fn reduce_value<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> Patch {
    let Operation::SetValue { value } = &node.op else {
        return Patch::identity();
    };

    let chain = graph.reference_chain(&node.id, 3);
    let (Some(field), Some(root)) = (chain.get(1).copied().flatten(), chain.get(2).copied().flatten()) else {
        return inert(node, "missing field or entity");
    };

    let Operation::CreateField { name } = &field.op else {
        return inert(node, "parent is not a field");
    };
    if name.is_empty() {
        return inert(node, "field has no name");
    }
    if !matches!(root.op, Operation::CreateEntity { .. }) || !is_live_root(graph, root) {
        return inert(node, "field does not belong to a live entity");
    }
    if !is_winning_field(graph, root, field, name) {
        return inert(node, "field is shadowed by an earlier field of the same name");
    }
    if first_role_child(graph, field).map(|n| &n.id) != Some(&node.id) {
        return inert(node, "not the first value of its field");
    }

    match entity_id_for(root) {
        Some(id) => Patch::field(id, name.clone(), FieldPatch::from_value(value)),
        None => Patch::identity(),
    }
}

fn reduce_tombstone<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> Patch {
    let Some(parent) = node.cause.as_ref().and_then(|cause| graph.get_node(cause)) else {
        return inert(node, "tombstone without a parent");
    };

    let siblings = role_children(graph, parent);
    if siblings.first().map(|n| &n.id) != Some(&node.id) {
        return inert(node, "not the first child of its parent");
    }
    let was_deleted = siblings.get(1).is_some_and(|next| next.op.is_tombstone());

    match &parent.op {
        Operation::CreateEntity { .. } => {
            if was_deleted || parent.cause.is_some() {
                return inert(node, "entity was already deleted");
            }
            let Some(id) = entity_id_for(parent) else {
                return Patch::identity();
            };
            match find_entity_node(graph, &id) {
                None => Patch::removed(id),
                // A duplicate root that used to be shadowed by this one
                Some(next) if super::graph::sibling_order(parent, next).is_lt() => {
                    Patch::replaced(project_entity(graph, next))
                }
                Some(_) => inert(node, "deleted root was not the live one"),
            }
        }
        Operation::CreateField { name } => {
            let Some(root) = parent.cause.as_ref().and_then(|cause| graph.get_node(cause)) else {
                return inert(node, "field without an entity");
            };
            if name.is_empty() || !is_live_root(graph, root) || !is_winning_field(graph, root, parent, name) {
                return inert(node, "deleted field is not projected");
            }
            match entity_id_for(root) {
                Some(id) => Patch::field(id, name.clone(), FieldPatch::Absent),
                None => Patch::identity(),
            }
        }
        _ => inert(node, "tombstone under a node that cannot be deleted"),
    }
}

fn reduce_field<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> Patch {
    let Operation::CreateField { name } = &node.op else {
        return Patch::identity();
    };
    let Some(root) = node.cause.as_ref().and_then(|cause| graph.get_node(cause)) else {
        return inert(node, "field without an entity");
    };
    if !matches!(root.op, Operation::CreateEntity { .. }) {
        return inert(node, "parent is not an entity");
    }

    // A field that lands in front of a tombstone brings the entity back
    let siblings = role_children(graph, root);
    let revives = siblings.first().map(|n| &n.id) == Some(&node.id)
        && siblings.get(1).is_some_and(|next| next.op.is_tombstone());
    if revives {
        return if is_live_root(graph, root) {
            Patch::replaced(project_entity(graph, root))
        } else {
            inert(node, "revived root is shadowed by another root")
        };
    }

    if name.is_empty() || !is_live_root(graph, root) || !is_winning_field(graph, root, node, name) {
        return Patch::identity();
    }

    // Shadowing an older field of the same name replaces its value
    let shadows = graph
        .causal_group(Some(&root.id))
        .into_iter()
        .any(|other| other.id != node.id && matches!(&other.op, Operation::CreateField { name: n } if n == name));
    match (shadows, entity_id_for(root)) {
        (true, Some(id)) => Patch::field(id, name.clone(), project_field(graph, node)),
        _ => Patch::identity(),
    }
}
