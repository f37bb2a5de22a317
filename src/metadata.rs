//! Entity identifier and metadata envelope interpretation.
//!
//! An entity carries its identifier in the configured id attribute (default
//! `_id`) and an optional metadata envelope (default `_kmd`). A truthy
//! `local` marker inside the envelope means the identifier was generated on
//! this device and the remote has never acknowledged the entity.

use serde_json::Value;

/// Prefix of device-generated identifiers.
pub const LOCAL_ID_PREFIX: &str = "local_";

/// Envelope key marking a device-local entity.
pub const LOCAL_MARKER: &str = "local";

/// Reads and rewrites the id/metadata attributes of an entity.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    id_attribute: String,
    kmd_attribute: String,
}

impl EntityMeta {
    pub fn new(id_attribute: impl Into<String>, kmd_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            kmd_attribute: kmd_attribute.into(),
        }
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// The entity's identifier, if present and a non-empty string.
    pub fn id_of<'a>(&self, entity: &'a Value) -> Option<&'a str> {
        entity
            .get(&self.id_attribute)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Whether the entity was created on this device and never acknowledged
    /// by the remote: the envelope's `local` marker is truthy.
    pub fn is_local(&self, entity: &Value) -> bool {
        entity
            .get(&self.kmd_attribute)
            .and_then(|kmd| kmd.get(LOCAL_MARKER))
            .map(is_truthy)
            .unwrap_or(false)
    }

    /// Generate a device-local identifier: `local_` plus 24 hex characters.
    pub fn generate_local_id(&self) -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}", LOCAL_ID_PREFIX, &hex[..24])
    }

    /// Copy of the entity with the id attribute and the envelope's `local`
    /// marker removed, as required before a remote create. An envelope left
    /// empty by the removal is dropped.
    pub fn strip_local(&self, entity: &Value) -> Value {
        let mut obj = entity.as_object().cloned().unwrap_or_default();
        obj.remove(&self.id_attribute);
        let mut drop_kmd = false;
        if let Some(kmd_obj) = obj.get_mut(&self.kmd_attribute).and_then(Value::as_object_mut) {
            kmd_obj.remove(LOCAL_MARKER);
            drop_kmd = kmd_obj.is_empty();
        }
        if drop_kmd {
            obj.remove(&self.kmd_attribute);
        }
        Value::Object(obj)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
