//! String-value dictionary backend: documents held as serialized JSON
//! strings in process memory. Always available; nothing survives restart.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, StorageError};

use super::traits::{doc_key, StorageBackend};

pub struct MemoryBackend {
    id_attribute: String,
    /// table name → (key → serialized document)
    tables: Mutex<HashMap<String, HashMap<String, String>>>,
    /// meta key → value
    meta: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new(id_attribute: impl Into<String>) -> Self {
        Self {
            id_attribute: id_attribute.into(),
            tables: Mutex::new(HashMap::new()),
            meta: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn find(&self, table: &str) -> Result<Vec<Value>> {
        let tables = self.tables.lock();
        let Some(docs) = tables.get(table) else {
            return Ok(Vec::new());
        };
        docs.values()
            .map(|raw| serde_json::from_str(raw).map_err(|e| StorageError::from(e).into()))
            .collect()
    }

    async fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let tables = self.tables.lock();
        match tables.get(table).and_then(|docs| docs.get(id)) {
            Some(raw) => Ok(Some(serde_json::from_str(raw).map_err(StorageError::from)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, table: &str, docs: Vec<Value>) -> Result<Vec<Value>> {
        // Key extraction and serialization happen before any insert so a
        // bad document leaves the table untouched.
        let mut entries = Vec::with_capacity(docs.len());
        for doc in &docs {
            let key = doc_key(doc, &self.id_attribute)?;
            let raw = serde_json::to_string(doc).map_err(StorageError::from)?;
            entries.push((key, raw));
        }

        let mut tables = self.tables.lock();
        let stored = tables.entry(table.to_string()).or_default();
        for (key, raw) in entries {
            stored.insert(key, raw);
        }
        Ok(docs)
    }

    async fn remove_by_id(&self, table: &str, id: &str) -> Result<bool> {
        let mut tables = self.tables.lock();
        Ok(tables
            .get_mut(table)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn clear(&self, table: &str) -> Result<()> {
        self.tables.lock().remove(table);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.tables.lock().clear();
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.meta.lock().get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.meta.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
