//! Engine configuration: defaults plus environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::BackendKind;

/// Default remote namespace segment for datastore paths.
pub const DEFAULT_NAMESPACE: &str = "appdata";
/// Default name of the reserved journal table.
pub const DEFAULT_SYNC_TABLE: &str = "kinvey_sync";
/// Default entity identifier attribute.
pub const DEFAULT_ID_ATTRIBUTE: &str = "_id";
/// Default entity metadata attribute.
pub const DEFAULT_KMD_ATTRIBUTE: &str = "_kmd";
/// Default number of records dispatched per push batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Engine configuration. Construct with [`Config::new`] for defaults or
/// [`Config::from_env`] to honor the `KINVEY_*` environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    /// Application key; the client-scoped database is named after it and
    /// remote paths embed it.
    pub app_key: String,
    /// Remote namespace segment (`/<ns>/<app>/<collection>`).
    pub namespace: String,
    /// Reserved table holding the sync journal.
    pub sync_table: String,
    /// Attribute carrying the entity identifier.
    pub id_attribute: String,
    /// Attribute carrying the entity metadata envelope.
    pub kmd_attribute: String,
    /// Records dispatched per push batch.
    pub batch_size: usize,
    /// Ordered backend preference; the first available one is bound.
    pub backend_preference: Vec<BackendKind>,
    /// Per remote request timeout. `None` leaves it to the transport.
    pub request_timeout: Option<Duration>,
    /// Directory for on-disk backends.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            sync_table: DEFAULT_SYNC_TABLE.to_string(),
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            kmd_attribute: DEFAULT_KMD_ATTRIBUTE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            backend_preference: BackendKind::default_preference(),
            request_timeout: None,
            data_dir: std::env::temp_dir(),
        }
    }

    /// Defaults with `KINVEY_*` environment overrides applied.
    pub fn from_env(app_key: impl Into<String>) -> Self {
        let mut config = Self::new(app_key);
        if let Ok(ns) = std::env::var("KINVEY_DATASTORE_NAMESPACE") {
            if !ns.is_empty() {
                config.namespace = ns;
            }
        }
        if let Ok(table) = std::env::var("KINVEY_SYNC_COLLECTION_NAME") {
            if !table.is_empty() {
                config.sync_table = table;
            }
        }
        if let Ok(attr) = std::env::var("KINVEY_ID_ATTRIBUTE") {
            if !attr.is_empty() {
                config.id_attribute = attr;
            }
        }
        if let Ok(attr) = std::env::var("KINVEY_KMD_ATTRIBUTE") {
            if !attr.is_empty() {
                config.kmd_attribute = attr;
            }
        }
        config
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_backend_preference(mut self, preference: Vec<BackendKind>) -> Self {
        self.backend_preference = preference;
        self
    }
}
