//! Lookups against the causal graph
//!
//! Every lookup resolves conflicts the same way: among the children that play
//! the expected role, the first in the graph's canonical order wins.

use super::graph::CausalGraph;
use super::operation::{content_hash, EntityId, Node, NodeId, Operation, SeqNum, Value};

/// Entity id a root node projects to.
///
/// The caller-supplied id when present, otherwise a stable hash of the root's
/// graph id. `None` for anything that is not a `CreateEntity`.
pub fn entity_id_for(node: &Node) -> Option<EntityId> {
    match &node.op {
        Operation::CreateEntity { id } if !id.is_empty() => Some(id.clone()),
        Operation::CreateEntity { .. } => content_hash(&node.id).ok(),
        _ => None,
    }
}

/// Whether `child` plays a role under `parent` that projection cares about
fn is_role_child(parent: &Node, child: &Node) -> bool {
    match (&parent.op, &child.op) {
        (Operation::CreateEntity { .. }, Operation::CreateField { .. }) => true,
        (Operation::CreateField { .. }, Operation::SetValue { .. }) => true,
        (Operation::CreateEntity { .. } | Operation::CreateField { .. }, op) => op.is_tombstone(),
        _ => false,
    }
}

/// Children of `parent` that matter for projection, in canonical order.
///
/// Fields and tombstones under an entity; values and tombstones under a field.
pub fn role_children<'g, G: CausalGraph + ?Sized>(graph: &'g G, parent: &Node) -> Vec<&'g Node> {
    graph
        .causal_group(Some(&parent.id))
        .into_iter()
        .filter(|child| is_role_child(parent, child))
        .collect()
}

/// First role child of `parent`; the one that decides its projection
pub fn first_role_child<'g, G: CausalGraph + ?Sized>(graph: &'g G, parent: &Node) -> Option<&'g Node> {
    graph
        .causal_group(Some(&parent.id))
        .into_iter()
        .find(|child| is_role_child(parent, child))
}

/// An entity or field is deleted when its first role child is a tombstone
pub fn is_tombstoned<G: CausalGraph + ?Sized>(graph: &G, node: &Node) -> bool {
    first_role_child(graph, node).is_some_and(|child| child.op.is_tombstone())
}

/// First non-deleted root that projects to `id`
pub fn find_entity_node<'g, G: CausalGraph + ?Sized>(graph: &'g G, id: &str) -> Option<&'g Node> {
    graph.causal_group(None).into_iter().find(|root| {
        root.cause.is_none()
            && entity_id_for(root).as_deref() == Some(id)
            && !is_tombstoned(graph, root)
    })
}

/// First field named `name` under an entity root
pub fn find_field_node<'g, G: CausalGraph + ?Sized>(
    graph: &'g G,
    entity_node: &Node,
    name: &str,
) -> Option<&'g Node> {
    graph
        .causal_group(Some(&entity_node.id))
        .into_iter()
        .find(|child| matches!(&child.op, Operation::CreateField { name: n } if n == name))
}

/// The winning value revision of a field
pub fn find_value_node<'g, G: CausalGraph + ?Sized>(graph: &'g G, field_node: &Node) -> Option<&'g Node> {
    graph
        .causal_group(Some(&field_node.id))
        .into_iter()
        .find(|child| matches!(child.op, Operation::SetValue { .. }))
}

/// Where an insertion must be attached: a text-bearing node and an index
/// into that node's own text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditPosition {
    pub node: NodeId,
    pub index: usize,
}

/// One visible character and where it lives
struct Glyph<'g> {
    node: &'g Node,
    offset: usize,
    ch: char,
}

fn own_text(node: &Node) -> Option<Vec<char>> {
    match &node.op {
        Operation::SetValue { value } => Some(value_text(value).chars().collect()),
        Operation::InsertText { text, .. } => Some(text.chars().collect()),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => plain_json(other).to_string(),
    }
}

/// Untagged JSON form of a value, as a person would write it
fn plain_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(n) => (*n).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => s.as_str().into(),
        Value::Bytes(bytes) => hex::encode(bytes).into(),
        Value::List(items) => items.iter().map(plain_json).collect(),
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| (k.clone(), plain_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
    }
}

/// Pending work while laying out a text tree
enum Step<'g> {
    Expand(&'g Node),
    Emit(Glyph<'g>),
}

/// Lay out the visible characters of `root` and its edits up to `clock`.
///
/// Each insertion is spliced at its index into the parent's own text;
/// insertions sharing an index keep causal-group order. Range deletes hide
/// characters of the parent's own text only.
///
/// Typing one character after another nests every insertion under the
/// previous one, so the tree is walked with an explicit stack.
fn layout<'g, G: CausalGraph + ?Sized>(graph: &'g G, root: &'g Node, clock: SeqNum) -> Vec<Glyph<'g>> {
    let mut out = Vec::new();
    let mut stack = vec![Step::Expand(root)];

    while let Some(step) = stack.pop() {
        let node = match step {
            Step::Emit(glyph) => {
                out.push(glyph);
                continue;
            }
            Step::Expand(node) => node,
        };
        let Some(text) = own_text(node) else {
            continue;
        };

        let mut visible = vec![true; text.len()];
        let mut inserts: Vec<Vec<&'g Node>> = vec![Vec::new(); text.len() + 1];

        for child in graph.causal_group(Some(&node.id)) {
            if child.id.seq > clock {
                continue;
            }
            match &child.op {
                Operation::InsertText { index, .. } => {
                    inserts[(*index).min(text.len())].push(child);
                }
                Operation::DeleteRange { start, end } if !child.op.is_tombstone() => {
                    let from = start.unwrap_or(0).min(text.len());
                    let to = end.unwrap_or(text.len()).min(text.len());
                    for flag in visible.iter_mut().take(to).skip(from) {
                        *flag = false;
                    }
                }
                _ => {}
            }
        }

        // Pushed back to front: at each position the insertions come out
        // first, then the character itself.
        for position in (0..=text.len()).rev() {
            if position < text.len() && visible[position] {
                stack.push(Step::Emit(Glyph {
                    node,
                    offset: position,
                    ch: text[position],
                }));
            }
            for insert in inserts[position].iter().rev().copied() {
                stack.push(Step::Expand(insert));
            }
        }
    }
    out
}

/// Visible text of a value with every edit up to `clock` applied
pub fn render_text<G: CausalGraph + ?Sized>(graph: &G, value_node: &Node, clock: SeqNum) -> Option<String> {
    own_text(value_node)?;
    Some(layout(graph, value_node, clock).into_iter().map(|g| g.ch).collect())
}

/// Map an absolute character index, as seen at logical clock `clock`, to the
/// node and local index a new `InsertText` must be attached to.
///
/// The position anchors right after visible character `index - 1`, so the
/// new text lands between it and whatever followed it. Index 0 anchors at the
/// start of the value itself. Returns `None` when `value_node` carries no text.
pub fn find_edit_position<G: CausalGraph + ?Sized>(
    graph: &G,
    value_node: &Node,
    clock: SeqNum,
    index: usize,
) -> Option<EditPosition> {
    own_text(value_node)?;
    let glyphs = layout(graph, value_node, clock);

    let index = index.min(glyphs.len());
    if index == 0 {
        return Some(EditPosition {
            node: value_node.id.clone(),
            index: 0,
        });
    }

    let anchor = &glyphs[index - 1];
    Some(EditPosition {
        node: anchor.node.id.clone(),
        index: anchor.offset + 1,
    })
}
