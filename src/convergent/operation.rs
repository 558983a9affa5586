//! The nine operation kinds of a bot tree, and the node that wraps them

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a replica
pub type SiteId = String;

/// Lamport counter within a site's stream of nodes
pub type SeqNum = u64;

/// Identifier of a projected entity ("bot")
pub type EntityId = String;

/// Position of a node in the causal graph: the authoring site plus its
/// Lamport counter at the time of authoring.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub site: SiteId,
    pub seq: SeqNum,
}

impl NodeId {
    pub fn new(site: impl Into<SiteId>, seq: SeqNum) -> Self {
        Self {
            site: site.into(),
            seq,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.site, self.seq)
    }
}

/// A value that can be held by a field.
///
/// Externally tagged on the wire (`{"int": 1}`, `{"bytes": [1, 2]}`), so a
/// list of small integers can never be read back as bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Value::Int(n)
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    /// Null and the empty string mean "no value": setting either removes the
    /// field. `0`, `false` and whitespace are ordinary values.
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// False when a float anywhere inside is NaN or infinite. Such floats have
    /// no canonical serialization and are refused by documents.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(Value::is_finite),
            Value::Map(entries) => entries.values().all(Value::is_finite),
            _ => true,
        }
    }
}

/// Public half plus password-sealed secret half of a certificate keypair.
///
/// All parts are hex encoded so the material survives any transport encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypairMaterial {
    pub public_key: String,
    pub salt: String,
    pub sealed_secret: String,
}

/// The nine operations a node can carry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Root of an entity
    CreateEntity { id: EntityId },

    /// Names a field; child of an entity
    CreateField { name: String },

    /// One revision of a field's value; child of a field
    SetValue { value: Value },

    /// Text spliced into the parent's own text at a local index
    InsertText { index: usize, text: String },

    /// Tombstone when both bounds are `None`, otherwise a local text range
    DeleteRange {
        start: Option<usize>,
        end: Option<usize>,
    },

    /// A certificate, self-signed or signed by its parent certificate
    CreateCertificate {
        keypair: KeypairMaterial,
        signature: String,
    },

    /// Attests that a certificate signed a specific field value
    CreateSignature {
        target_id: NodeId,
        target_hash: String,
        signature: String,
    },

    /// Invalidates a certificate or a signature
    CreateRevocation {
        target_id: NodeId,
        target_hash: String,
        signature: String,
    },

    /// Marks a field of an entity as locally masked
    CreateFieldMask { entity_id: EntityId, name: String },
}

impl Operation {
    pub fn entity(id: impl Into<EntityId>) -> Self {
        Operation::CreateEntity { id: id.into() }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Operation::CreateField { name: name.into() }
    }

    pub fn value(value: Value) -> Self {
        Operation::SetValue { value }
    }

    pub fn insert(index: usize, text: impl Into<String>) -> Self {
        Operation::InsertText {
            index,
            text: text.into(),
        }
    }

    pub fn delete_range(start: usize, end: usize) -> Self {
        Operation::DeleteRange {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn tombstone() -> Self {
        Operation::DeleteRange {
            start: None,
            end: None,
        }
    }

    pub fn field_mask(entity_id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Operation::CreateFieldMask {
            entity_id: entity_id.into(),
            name: name.into(),
        }
    }

    /// A delete with neither bound removes its parent entity or field
    pub fn is_tombstone(&self) -> bool {
        matches!(
            self,
            Operation::DeleteRange {
                start: None,
                end: None
            }
        )
    }

    /// Whether the operation can be hashed canonically
    pub fn is_well_formed(&self) -> bool {
        match self {
            Operation::SetValue { value } => value.is_finite(),
            _ => true,
        }
    }

    /// Short name used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateEntity { .. } => "entity",
            Operation::CreateField { .. } => "field",
            Operation::SetValue { .. } => "value",
            Operation::InsertText { .. } => "insert",
            Operation::DeleteRange { .. } => "delete",
            Operation::CreateCertificate { .. } => "certificate",
            Operation::CreateSignature { .. } => "signature",
            Operation::CreateRevocation { .. } => "revocation",
            Operation::CreateFieldMask { .. } => "field_mask",
        }
    }
}

/// One immutable operation with its causal parent and content hash
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub cause: Option<NodeId>,
    pub priority: u32,
    pub op: Operation,
    pub hash: String,
}

impl Node {
    /// Build a node and compute its content hash
    pub fn new(id: NodeId, cause: Option<NodeId>, priority: u32, op: Operation) -> Self {
        let hash = node_hash(&id, cause.as_ref(), priority, &op);
        Self {
            id,
            cause,
            priority,
            op,
            hash,
        }
    }

    /// Check that the stored hash matches the node's content
    pub fn verify_hash(&self) -> bool {
        node_hash(&self.id, self.cause.as_ref(), self.priority, &self.op) == self.hash
    }
}

/// Canonical serialization: object keys are sorted at every depth, so two
/// structurally equal values always produce the same bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_vec(&tree)
}

/// SHA-256 of the canonical serialization, hex encoded
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn node_hash(id: &NodeId, cause: Option<&NodeId>, priority: u32, op: &Operation) -> String {
    // Every component is built from strings, integers and string-keyed maps,
    // none of which can fail to serialize.
    content_hash(&(cause, id, priority, op)).unwrap_or_default()
}

#[derive(Serialize)]
struct FieldValueRef<'a> {
    entity: &'a str,
    field: &'a str,
    value: &'a Value,
}

/// Stable reference to "this exact value of this field of this entity"
pub fn field_value_hash(entity_id: &str, field_name: &str, value: &Value) -> String {
    content_hash(&FieldValueRef {
        entity: entity_id,
        field: field_name,
        value,
    })
    .unwrap_or_default()
}
