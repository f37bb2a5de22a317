//! Pluggable key/value storage layer.
//!
//! A backend is bound once, at engine construction: each kind in the
//! configured preference order is capability-probed (a cheap constructor
//! attempt) and the first that succeeds wins.

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::error::{ConfigError, Result};

pub use file::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use traits::StorageBackend;

/// The available backend variants, in the order the probe may try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Structured object store: one JSON document map per table on disk.
    File,
    /// SQL over a local database file.
    Sqlite,
    /// In-process string-value dictionary.
    Memory,
}

impl BackendKind {
    pub fn default_preference() -> Vec<BackendKind> {
        vec![BackendKind::File, BackendKind::Sqlite, BackendKind::Memory]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }
}

/// Probe the configured preference list and bind the first available
/// backend. No backend available is fatal.
pub fn select_backend(config: &Config) -> Result<Arc<dyn StorageBackend>> {
    for kind in &config.backend_preference {
        match probe(*kind, config) {
            Ok(backend) => {
                debug!(backend = kind.name(), "storage backend bound");
                return Ok(backend);
            }
            Err(error) => {
                debug!(backend = kind.name(), %error, "storage backend unavailable");
            }
        }
    }
    let tried = config
        .backend_preference
        .iter()
        .map(|k| k.name())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NoBackendAvailable { tried }.into())
}

fn probe(kind: BackendKind, config: &Config) -> Result<Arc<dyn StorageBackend>> {
    match kind {
        BackendKind::File => Ok(Arc::new(FileBackend::open(
            &config.data_dir,
            &config.app_key,
            &config.id_attribute,
        )?)),
        #[cfg(feature = "sqlite")]
        BackendKind::Sqlite => Ok(Arc::new(SqliteBackend::open(
            &config.data_dir,
            &config.app_key,
            &config.id_attribute,
        )?)),
        #[cfg(not(feature = "sqlite"))]
        BackendKind::Sqlite => Err(crate::error::StorageError::backend(
            "sqlite support not compiled in",
        )
        .into()),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new(&config.id_attribute))),
    }
}
