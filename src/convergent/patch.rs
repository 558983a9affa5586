//! Projected entity state and the patches that move it forward

use super::operation::{EntityId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Projected state of one entity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub fields: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Projected state of a whole document
pub type State = BTreeMap<EntityId, Entity>;

/// Change to a single field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldPatch {
    Set(Value),
    Absent,
}

impl FieldPatch {
    /// Absent-sentinel values become `Absent`
    pub fn from_value(value: &Value) -> Self {
        if value.is_absent() {
            FieldPatch::Absent
        } else {
            FieldPatch::Set(value.clone())
        }
    }
}

/// Change to a single entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityPatch {
    /// The entity no longer exists
    Removed,
    /// The entity's projection in full
    Replaced(Entity),
    /// Only the listed fields changed
    Updated(BTreeMap<String, FieldPatch>),
}

/// A partial, mergeable description of state changes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub entities: BTreeMap<EntityId, EntityPatch>,
}

impl Patch {
    /// The empty patch; neutral for both merge and apply
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn removed(id: impl Into<EntityId>) -> Self {
        let mut patch = Self::identity();
        patch.entities.insert(id.into(), EntityPatch::Removed);
        patch
    }

    pub fn replaced(entity: Entity) -> Self {
        let mut patch = Self::identity();
        patch
            .entities
            .insert(entity.id.clone(), EntityPatch::Replaced(entity));
        patch
    }

    pub fn field(id: impl Into<EntityId>, name: impl Into<String>, field: FieldPatch) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.into(), field);
        let mut patch = Self::identity();
        patch.entities.insert(id.into(), EntityPatch::Updated(fields));
        patch
    }

    /// Right-biased deep merge: where both touch the same field, `other` wins.
    ///
    /// Only sound when `other` was computed from a graph that already
    /// contained everything `self`'s graph did.
    pub fn merge(mut self, other: Patch) -> Patch {
        for (id, incoming) in other.entities {
            let merged = match (self.entities.remove(&id), incoming) {
                (None, incoming) => incoming,
                (Some(_), EntityPatch::Removed) => EntityPatch::Removed,
                (Some(_), EntityPatch::Replaced(entity)) => EntityPatch::Replaced(entity),
                (Some(EntityPatch::Removed), EntityPatch::Updated(fields)) => {
                    let mut entity = Entity::new(id.clone());
                    apply_fields(&mut entity, fields);
                    EntityPatch::Replaced(entity)
                }
                (Some(EntityPatch::Replaced(mut entity)), EntityPatch::Updated(fields)) => {
                    apply_fields(&mut entity, fields);
                    EntityPatch::Replaced(entity)
                }
                (Some(EntityPatch::Updated(mut base)), EntityPatch::Updated(fields)) => {
                    base.extend(fields);
                    EntityPatch::Updated(base)
                }
            };
            self.entities.insert(id, merged);
        }
        self
    }

    /// Deep-merge this patch into a state
    pub fn apply_to(&self, state: &mut State) {
        for (id, change) in &self.entities {
            match change {
                EntityPatch::Removed => {
                    state.remove(id);
                }
                EntityPatch::Replaced(entity) => {
                    state.insert(id.clone(), entity.clone());
                }
                EntityPatch::Updated(fields) => {
                    let entity = state
                        .entry(id.clone())
                        .or_insert_with(|| Entity::new(id.clone()));
                    apply_fields(entity, fields.clone());
                }
            }
        }
    }
}

/// Free-function form of [`Patch::merge`]
pub fn merge_patches(a: Patch, b: Patch) -> Patch {
    a.merge(b)
}

fn apply_fields(entity: &mut Entity, fields: BTreeMap<String, FieldPatch>) {
    for (name, field) in fields {
        match field {
            FieldPatch::Set(value) => {
                entity.fields.insert(name, value);
            }
            FieldPatch::Absent => {
                entity.fields.remove(&name);
            }
        }
    }
}
