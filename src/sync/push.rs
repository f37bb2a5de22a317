//! The push pipeline: claim the journal, coalesce, dispatch in bounded
//! batches, classify failures, repair local state on credential errors,
//! reinstate what can be retried.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::collection::LocalStore;
use crate::config::Config;
use crate::error::Result;
use crate::metadata::EntityMeta;
use crate::network::{NetworkAdapter, RemoteError, RemoteErrorKind, RemoteResult};
use crate::query::Query;
use crate::storage::StorageBackend;

use super::coalesce::coalesce;
use super::journal::SyncJournal;
use super::types::{DispatchOutcome, PushError, PushResult, SyncMethod, SyncRecord};

pub struct PushEngine {
    config: Arc<Config>,
    backend: Arc<dyn StorageBackend>,
    network: Arc<dyn NetworkAdapter>,
    entity_meta: EntityMeta,
}

impl PushEngine {
    pub fn new(
        config: Arc<Config>,
        backend: Arc<dyn StorageBackend>,
        network: Arc<dyn NetworkAdapter>,
        entity_meta: EntityMeta,
    ) -> Self {
        Self {
            config,
            backend,
            network,
            entity_meta,
        }
    }

    /// Drain the journal and dispatch every claimed mutation. Batches run
    /// sequentially; records within a batch run concurrently. Per-record
    /// failures never abort the batch: each record yields exactly one
    /// result, and retriable failures are reinstated in a single write at
    /// the end.
    pub async fn push(
        &self,
        journal: &SyncJournal,
        query: Option<&Query>,
    ) -> Result<Vec<PushResult>> {
        let claimed = journal.drain(query).await?;
        if claimed.is_empty() {
            return Ok(Vec::new());
        }
        let records = coalesce(claimed);
        debug!(records = records.len(), "push started");

        let mut results = Vec::with_capacity(records.len());
        let mut reinstates: Vec<SyncRecord> = Vec::new();

        for batch in records.chunks(self.config.batch_size) {
            debug!(batch = batch.len(), "dispatching batch");
            let outcomes = join_all(batch.iter().map(|record| self.dispatch(record))).await;

            for (record, outcome) in batch.iter().zip(outcomes) {
                let (entity, error) = match outcome {
                    DispatchOutcome::Acknowledged { entity } => (entity, None),
                    DispatchOutcome::Repaired { error } => {
                        (None, Some(PushError::Remote(error)))
                    }
                    DispatchOutcome::Reinstated { error } => {
                        reinstates.push(record.clone());
                        (None, Some(PushError::Remote(error)))
                    }
                    DispatchOutcome::MirrorFailed { error } => {
                        (None, Some(PushError::Storage(error)))
                    }
                    DispatchOutcome::Abandoned { error } => {
                        (None, Some(PushError::Sync(error)))
                    }
                };
                results.push(PushResult {
                    entity_id: record.entity_id.clone(),
                    collection: record.collection.clone(),
                    entity: entity.unwrap_or_else(|| record.entity.clone()),
                    error,
                });
            }
        }

        if !reinstates.is_empty() {
            warn!(count = reinstates.len(), "reinstating failed records");
            journal.reinstate(&reinstates).await?;
        }
        debug!(results = results.len(), "push finished");
        Ok(results)
    }

    /// Route one record. Infallible: every failure mode, remote or local,
    /// ends in a terminal outcome so one record can never abort the batch.
    async fn dispatch(&self, record: &SyncRecord) -> DispatchOutcome {
        match record.state.method {
            SyncMethod::CreateOrUpdate => self.dispatch_save(record).await,
            SyncMethod::Delete => self.dispatch_delete(record).await,
            SyncMethod::Unrecognized => DispatchOutcome::Abandoned {
                error: crate::error::SyncError::UnrecognizedMethod {
                    entity_id: record.entity_id.clone(),
                },
            },
        }
    }

    /// POST for device-local entities (id and local marker stripped), PUT
    /// for server-known ones. Success mirrors the remote's document into
    /// the local collection; a local create additionally retires the
    /// device-id row once the server id is in place.
    async fn dispatch_save(&self, record: &SyncRecord) -> DispatchOutcome {
        let local = self.entity_meta.is_local(&record.entity);
        let remote = if local {
            let body = self.entity_meta.strip_local(&record.entity);
            self.call(self.network.create(&record.collection, &body)).await
        } else {
            self.call(
                self.network
                    .update(&record.collection, &record.entity_id, &record.entity),
            )
            .await
        };

        match remote {
            Ok(saved) => match self.mirror_saved(record, &saved, local).await {
                Ok(()) => DispatchOutcome::Acknowledged {
                    entity: Some(saved),
                },
                Err(error) => {
                    warn!(entity_id = %record.entity_id, %error, "local mirror write failed");
                    DispatchOutcome::MirrorFailed {
                        error: Arc::new(error),
                    }
                }
            },
            Err(error) => self.classify_failure(record, error).await,
        }
    }

    /// Write an acknowledged save back into the local collection.
    async fn mirror_saved(
        &self,
        record: &SyncRecord,
        saved: &serde_json::Value,
        local: bool,
    ) -> Result<()> {
        let store = self.store_for(&record.collection)?;
        store.save_many(vec![saved.clone()]).await?;
        if local && self.entity_meta.id_of(saved) != Some(record.entity_id.as_str()) {
            store.remove_by_id(&record.entity_id).await?;
        }
        Ok(())
    }

    /// Remote delete. 404 means the entity is already gone, which is what
    /// the caller wanted. Success, no retry.
    async fn dispatch_delete(&self, record: &SyncRecord) -> DispatchOutcome {
        match self
            .call(self.network.delete(&record.collection, &record.entity_id))
            .await
        {
            Ok(()) => DispatchOutcome::Acknowledged { entity: None },
            Err(error) if error.kind == RemoteErrorKind::NotFound => {
                DispatchOutcome::Acknowledged { entity: None }
            }
            Err(error) => self.classify_failure(record, error).await,
        }
    }

    /// Credential failures are terminal: retrying cannot make progress, so
    /// the record is dropped after repairing local state. Everything else
    /// is retriable and goes back to the journal.
    async fn classify_failure(&self, record: &SyncRecord, error: RemoteError) -> DispatchOutcome {
        match error.kind {
            RemoteErrorKind::InsufficientCredentials => {
                self.repair(record).await;
                DispatchOutcome::Repaired { error }
            }
            _ => DispatchOutcome::Reinstated { error },
        }
    }

    /// Restore the local row to the remote's current truth. Device-local
    /// entities have nothing on the server to consult and are skipped.
    /// Every failure in here is swallowed; repair is best-effort.
    async fn repair(&self, record: &SyncRecord) {
        if self.entity_meta.is_local(&record.entity) {
            return;
        }
        match self
            .call(self.network.get_by_id(&record.collection, &record.entity_id))
            .await
        {
            Ok(remote) => {
                let write = match self.store_for(&record.collection) {
                    Ok(store) => store.save_many(vec![remote]).await.map(|_| ()),
                    Err(error) => Err(error),
                };
                if let Err(error) = write {
                    debug!(entity_id = %record.entity_id, %error, "repair write failed");
                }
            }
            Err(error) => {
                debug!(entity_id = %record.entity_id, %error, "repair read failed");
            }
        }
    }

    fn store_for(&self, collection: &str) -> Result<LocalStore> {
        LocalStore::new(
            self.backend.clone(),
            collection,
            self.entity_meta.clone(),
        )
    }

    /// Run a remote call under the configured per-request timeout. Expiry
    /// classifies as a network failure, so the record is reinstated.
    async fn call<T, F>(&self, fut: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        match self.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::network(format!(
                    "request timed out after {limit:?}"
                ))),
            },
            None => fut.await,
        }
    }
}

// Integration coverage for the pipeline lives in tests/push.rs; the pieces
// with interesting edges on their own (coalescing, classification inputs)
// are tested next to their definitions.
