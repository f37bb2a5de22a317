//! Write synchronization: the journal of pending mutations and the push
//! pipeline that drains it against the remote.

pub mod coalesce;
pub mod journal;
pub mod push;
pub mod types;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::collection::{self, LocalStore};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::metadata::EntityMeta;
use crate::network::NetworkAdapter;
use crate::query::Query;
use crate::storage::{self, StorageBackend};

pub use coalesce::coalesce;
pub use journal::SyncJournal;
pub use push::PushEngine;
pub use types::{PushError, PushResult, SyncMethod, SyncRecord, SyncState};

// ============================================================================
// Entities: shape-preserving argument for the enqueue operations
// ============================================================================

/// One entity or many. Enqueue operations accept either and return the
/// same shape they were given.
#[derive(Debug, Clone)]
pub enum Entities {
    One(Value),
    Many(Vec<Value>),
}

impl Entities {
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Entities::One(entity) => std::slice::from_ref(entity),
            Entities::Many(entities) => entities,
        }
    }

    /// The contained entities, flattened.
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            Entities::One(entity) => vec![entity],
            Entities::Many(entities) => entities,
        }
    }
}

impl From<Value> for Entities {
    fn from(entity: Value) -> Self {
        Entities::One(entity)
    }
}

impl From<Vec<Value>> for Entities {
    fn from(entities: Vec<Value>) -> Self {
        Entities::Many(entities)
    }
}

// ============================================================================
// SyncManager: public surface
// ============================================================================

/// The engine's public face: count, enqueue, push, clear.
pub struct SyncManager {
    config: Arc<Config>,
    backend: Arc<dyn StorageBackend>,
    entity_meta: EntityMeta,
    journal: SyncJournal,
    engine: PushEngine,
    /// Push refuses re-entry: concurrent pushes would double-claim.
    push_gate: tokio::sync::Mutex<()>,
}

impl SyncManager {
    /// Bind the first available storage backend from the configured
    /// preference list and build the engine on it.
    pub fn new(config: Config, network: Arc<dyn NetworkAdapter>) -> Result<Self> {
        collection::validate_name(&config.app_key)?;
        let backend = storage::select_backend(&config)?;
        Self::with_backend(config, backend, network)
    }

    /// Build the engine on an explicit backend.
    pub fn with_backend(
        config: Config,
        backend: Arc<dyn StorageBackend>,
        network: Arc<dyn NetworkAdapter>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let entity_meta = EntityMeta::new(&config.id_attribute, &config.kmd_attribute);
        let journal = SyncJournal::new(
            backend.clone(),
            config.sync_table.clone(),
            entity_meta.clone(),
        );
        let engine = PushEngine::new(
            config.clone(),
            backend.clone(),
            network,
            entity_meta.clone(),
        );
        Ok(Self {
            config,
            backend,
            entity_meta,
            journal,
            engine,
            push_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The local store for a collection, as the push engine and any CRUD
    /// facade see it.
    pub fn collection_store(&self, collection: &str) -> Result<LocalStore> {
        LocalStore::new(
            self.backend.clone(),
            collection,
            self.entity_meta.clone(),
        )
    }

    /// Number of distinct entities with a pending mutation.
    pub async fn count(&self, query: Option<&Query>) -> Result<usize> {
        self.journal.count(query).await
    }

    /// Non-destructive view of the coalesced pending set.
    pub async fn pending(&self, query: Option<&Query>) -> Result<Vec<SyncRecord>> {
        self.journal.pending(query).await
    }

    /// Record create-or-update mutations for later push. Every entity must
    /// already carry its identifier. Returns the input shape unchanged.
    pub async fn enqueue_create_or_update(
        &self,
        collection: &str,
        entities: impl Into<Entities>,
    ) -> Result<Entities> {
        self.enqueue(collection, SyncMethod::CreateOrUpdate, entities.into())
            .await
    }

    /// Record delete mutations for later push. Returns the input shape
    /// unchanged.
    pub async fn enqueue_delete(
        &self,
        collection: &str,
        entities: impl Into<Entities>,
    ) -> Result<Entities> {
        self.enqueue(collection, SyncMethod::Delete, entities.into())
            .await
    }

    /// Drain the journal against the remote. Never invoke concurrently
    /// with itself; re-entry is refused.
    pub async fn push(&self, query: Option<&Query>) -> Result<Vec<PushResult>> {
        let _guard = self
            .push_gate
            .try_lock()
            .map_err(|_| SyncError::PushInProgress)?;
        self.engine.push(&self.journal, query).await
    }

    /// Drop pending mutations without pushing them.
    pub async fn clear(&self, query: Option<&Query>) -> Result<()> {
        self.journal.clear(query).await
    }

    async fn enqueue(
        &self,
        collection: &str,
        method: SyncMethod,
        entities: Entities,
    ) -> Result<Entities> {
        if collection.is_empty() {
            return Err(SyncError::MissingCollection.into());
        }
        collection::validate_name(collection)?;

        // Validate the whole set before touching the journal, so a bad
        // entity cannot leave a partial enqueue behind.
        for entity in entities.as_slice() {
            if self.entity_meta.id_of(entity).is_none() {
                return Err(SyncError::MissingEntityId {
                    id_attribute: self.entity_meta.id_attribute().to_string(),
                }
                .into());
            }
        }

        for entity in entities.as_slice() {
            self.journal.enqueue(collection, method, entity).await?;
        }
        debug!(
            collection,
            count = entities.as_slice().len(),
            ?method,
            "mutations enqueued"
        );
        Ok(entities)
    }
}
