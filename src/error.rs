use thiserror::Error;

/// Construction-time configuration failures. These are fatal: no engine is
/// built when one occurs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid name {name:?}: must match [A-Za-z0-9-]{{1,128}}")]
    InvalidName { name: String },

    #[error("no storage backend available (tried: {tried})")]
    NoBackendAvailable { tried: String },
}

/// Storage adapter I/O failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        StorageError::Backend {
            message: message.into(),
            source: None,
        }
    }
}

/// Journal and push-pipeline failures. `Clone` because push carries these
/// in per-record results rather than throwing them.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("entity has no {id_attribute} value and cannot be synchronized")]
    MissingEntityId { id_attribute: String },

    #[error("collection name is required")]
    MissingCollection,

    #[error("unrecognized sync method for entity {entity_id:?}")]
    UnrecognizedMethod { entity_id: String },

    #[error("a push is already in progress")]
    PushInProgress,
}

/// Crate-level error. Library surfaces return `Result<T>` with this type;
/// per-record push failures are carried in `PushResult` instead.
#[derive(Debug, Error)]
pub enum KinveyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KinveyError>;
