//! The uniform key/value surface every storage backend exposes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Result, StorageError};

/// Key/value persistence for one database, addressed by table name.
///
/// Documents are opaque JSON objects keyed by the configured id attribute;
/// serialization is the backend's concern. Tables are created lazily on
/// first write, and reads against a missing table return empty.
///
/// # Threading
/// Implementations back these methods with synchronous I/O (SQLite, the
/// filesystem). Callers on an async runtime should expect the call to
/// occupy the task until the backend returns.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All documents in `table`, in undefined order.
    async fn find(&self, table: &str) -> Result<Vec<Value>>;

    /// The document stored under `id`, if any.
    async fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Value>>;

    /// Upsert `docs` by their key attribute. Atomic per call: either every
    /// document is stored or none is. Returns the saved documents.
    async fn save(&self, table: &str, docs: Vec<Value>) -> Result<Vec<Value>>;

    /// Remove the document stored under `id`. Returns whether one existed.
    async fn remove_by_id(&self, table: &str, id: &str) -> Result<bool>;

    /// Drop `table`.
    async fn clear(&self, table: &str) -> Result<()>;

    /// Drop every user table. The meta namespace survives.
    async fn clear_all(&self) -> Result<()>;

    /// Read a value from the client-scoped meta namespace.
    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Write a value into the client-scoped meta namespace.
    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// Extract the string key of `doc` under `id_attribute`.
pub(crate) fn doc_key(doc: &Value, id_attribute: &str) -> Result<String> {
    doc.get(id_attribute)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            StorageError::backend(format!("document has no {id_attribute} key")).into()
        })
}
