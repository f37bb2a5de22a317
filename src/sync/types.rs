//! Sync-specific types: journal records, push results, and the per-record
//! dispatch outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KinveyError;
use crate::network::RemoteError;

/// Width of the zero-padded storage id derived from a record key, enough
/// for any u64.
const STORAGE_ID_WIDTH: usize = 20;

/// The pending operation a journal record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMethod {
    /// Written as POST or PUT at push time, depending on whether the entity
    /// is device-local.
    CreateOrUpdate,
    Delete,
    /// A method string this build does not know. Such records are abandoned
    /// at push, never retried.
    #[serde(other)]
    Unrecognized,
}

/// Method wrapper stored under the record's `state` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub method: SyncMethod,
}

/// One row of the sync journal: a pending local mutation awaiting remote
/// acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Storage key, derived from `key` so primary-key uniqueness enforces
    /// key uniqueness.
    #[serde(rename = "_id")]
    pub storage_id: String,
    /// Monotonic per-device sequence assigned at enqueue; never reused.
    pub key: u64,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub collection: String,
    pub state: SyncState,
    /// Snapshot of the entity at enqueue time.
    pub entity: Value,
    #[serde(rename = "enqueuedAt")]
    pub enqueued_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn new(
        key: u64,
        collection: impl Into<String>,
        entity_id: impl Into<String>,
        method: SyncMethod,
        entity: Value,
    ) -> Self {
        Self {
            storage_id: storage_id_for(key),
            key,
            entity_id: entity_id.into(),
            collection: collection.into(),
            state: SyncState { method },
            entity,
            enqueued_at: Utc::now(),
        }
    }
}

/// Zero-padded decimal rendering of a record key, the journal's storage id.
pub fn storage_id_for(key: u64) -> String {
    format!("{:0width$}", key, width = STORAGE_ID_WIDTH)
}

// ============================================================================
// Push outcome types
// ============================================================================

/// Per-record result of a push. Errors ride here; `push` itself only fails
/// on programming errors.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// The `_id` the record was enqueued under (the device id for local
    /// creates, even when the remote assigned a fresh one).
    pub entity_id: String,
    pub collection: String,
    /// The remote's view after a successful create/update; the enqueue
    /// snapshot otherwise.
    pub entity: Value,
    pub error: Option<PushError>,
}

impl PushResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Why a record failed to push.
#[derive(Debug, Clone)]
pub enum PushError {
    /// The remote rejected the operation or was unreachable.
    Remote(RemoteError),
    /// The record itself cannot be dispatched (unrecognized method).
    Sync(crate::error::SyncError),
    /// The remote accepted the operation but mirroring it into the local
    /// store failed.
    Storage(Arc<KinveyError>),
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushError::Remote(e) => write!(f, "{e}"),
            PushError::Sync(e) => write!(f, "{e}"),
            PushError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PushError {}

/// Terminal state of one dispatched record. Exactly one is reached per
/// record; only `Reinstated` puts the record back in the journal.
#[derive(Debug)]
pub(crate) enum DispatchOutcome {
    /// Remote accepted; local store mirrored. `entity` is the remote's
    /// returned document where one exists (creates and updates).
    Acknowledged { entity: Option<Value> },
    /// Credential failure; local state restored from the remote where
    /// possible. The record is dropped.
    Repaired { error: RemoteError },
    /// Transient failure; the record goes back to the journal.
    Reinstated { error: RemoteError },
    /// Remote accepted but the local mirror write failed. The record is
    /// dropped: the remote already holds the mutation, and re-dispatching
    /// it could apply the operation twice.
    MirrorFailed { error: Arc<KinveyError> },
    /// Undispatchable record; dropped and reported.
    Abandoned { error: crate::error::SyncError },
}
