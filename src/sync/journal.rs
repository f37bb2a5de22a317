//! The sync journal: a durable, append-only log of pending mutations on a
//! reserved table, keyed by a process-persisted monotonic counter.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::collection::LocalStore;
use crate::error::{Result, SyncError};
use crate::metadata::EntityMeta;
use crate::query::Query;
use crate::storage::StorageBackend;

use super::coalesce::coalesce;
use super::types::{SyncMethod, SyncRecord};

/// Meta-namespace slot persisting the next record key.
const SYNC_KEY_META: &str = "syncKey";

pub struct SyncJournal {
    store: LocalStore,
    backend: Arc<dyn StorageBackend>,
    entity_meta: EntityMeta,
    /// Next key to assign; `None` until first loaded from the meta slot.
    counter: Mutex<Option<u64>>,
}

impl SyncJournal {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        sync_table: impl Into<String>,
        entity_meta: EntityMeta,
    ) -> Self {
        let store = LocalStore::reserved(backend.clone(), sync_table, entity_meta.clone());
        Self {
            store,
            backend,
            entity_meta,
            counter: Mutex::new(None),
        }
    }

    /// Record a pending mutation. The entity must already carry its
    /// identifier; the assigned key is monotonic and never reused.
    pub async fn enqueue(
        &self,
        collection: &str,
        method: SyncMethod,
        entity: &Value,
    ) -> Result<SyncRecord> {
        if collection.is_empty() {
            return Err(SyncError::MissingCollection.into());
        }
        let entity_id = self
            .entity_meta
            .id_of(entity)
            .ok_or_else(|| SyncError::MissingEntityId {
                id_attribute: self.entity_meta.id_attribute().to_string(),
            })?
            .to_string();

        let key = self.next_key().await?;
        let record = SyncRecord::new(key, collection, entity_id, method, entity.clone());
        self.store
            .save_many(vec![serde_json::to_value(&record)?])
            .await?;
        debug!(key, collection, entity_id = %record.entity_id, "mutation enqueued");
        Ok(record)
    }

    /// Remove every record matching `query` from the journal and return
    /// them. The caller is expected to `reinstate` the subset that fails.
    pub async fn drain(&self, query: Option<&Query>) -> Result<Vec<SyncRecord>> {
        let records = self.read_matching(query).await?;
        for record in &records {
            self.store.remove_by_id(&record.storage_id).await?;
        }
        Ok(records)
    }

    /// Put previously drained records back, preserving their keys. One
    /// backend write, so the batch lands atomically.
    pub async fn reinstate(&self, records: &[SyncRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let docs = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.store.save_many(docs).await?;
        Ok(())
    }

    /// Number of distinct entities with a pending mutation under `query`.
    pub async fn count(&self, query: Option<&Query>) -> Result<usize> {
        Ok(self.pending(query).await?.len())
    }

    /// Non-destructive read of the coalesced pending set.
    pub async fn pending(&self, query: Option<&Query>) -> Result<Vec<SyncRecord>> {
        let records = self.read_matching(query).await?;
        Ok(coalesce(records))
    }

    /// Drop matching records without pushing them.
    pub async fn clear(&self, query: Option<&Query>) -> Result<()> {
        match query {
            None => self.store.clear().await,
            Some(query) => {
                let records = self.read_matching(Some(query)).await?;
                for record in &records {
                    self.store.remove_by_id(&record.storage_id).await?;
                }
                Ok(())
            }
        }
    }

    async fn read_matching(&self, query: Option<&Query>) -> Result<Vec<SyncRecord>> {
        let docs = self.store.find_all().await?;
        let docs = match query {
            Some(query) => query.filter_only(docs),
            None => docs,
        };
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Into::into))
            .collect()
    }

    /// Assign the next record key. The counter lives in the meta namespace
    /// and is loaded once per process; the in-memory increment is
    /// synchronous, the new value is persisted before the key is used.
    async fn next_key(&self) -> Result<u64> {
        let loaded = if self.counter.lock().is_some() {
            None
        } else {
            let stored = self.backend.get_meta(SYNC_KEY_META).await?;
            Some(stored.and_then(|s| s.parse::<u64>().ok()).unwrap_or(0))
        };

        let key = {
            let mut counter = self.counter.lock();
            if counter.is_none() {
                *counter = loaded;
            }
            let key = counter.unwrap_or(0);
            *counter = Some(key + 1);
            key
        };

        self.backend
            .set_meta(SYNC_KEY_META, &(key + 1).to_string())
            .await?;
        Ok(key)
    }
}
