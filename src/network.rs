//! Remote datastore interface: the transport trait implemented by the host
//! application's HTTP client, and the error classification the push engine
//! keys its retry/repair decisions on.

use async_trait::async_trait;
use serde_json::Value;

// ============================================================================
// NetworkAdapter: user-provided network layer
// ============================================================================

/// User-implemented transport for remote datastore operations.
///
/// Implementations own wire encoding, authentication and TLS. The engine
/// only cares about the JSON body of a success and the [`RemoteErrorKind`]
/// of a failure.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// POST `/<ns>/<app>/<collection>`. Returns the created entity, with
    /// the server-assigned identifier.
    async fn create(&self, collection: &str, entity: &Value) -> RemoteResult<Value>;

    /// PUT `/<ns>/<app>/<collection>/<id>`. Returns the stored entity.
    async fn update(&self, collection: &str, id: &str, entity: &Value) -> RemoteResult<Value>;

    /// DELETE `/<ns>/<app>/<collection>/<id>`.
    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// GET `/<ns>/<app>/<collection>/<id>`. Used to repair local state.
    async fn get_by_id(&self, collection: &str, id: &str) -> RemoteResult<Value>;
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Render the datastore path for a collection, `/<ns>/<app>/<collection>`.
pub fn collection_path(namespace: &str, app_key: &str, collection: &str) -> String {
    format!("/{namespace}/{app_key}/{collection}")
}

/// Render the datastore path for one entity, `/<ns>/<app>/<collection>/<id>`.
pub fn entity_path(namespace: &str, app_key: &str, collection: &str, id: &str) -> String {
    format!("/{namespace}/{app_key}/{collection}/{id}")
}

// ============================================================================
// RemoteError
// ============================================================================

/// Classification of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 404: the entity does not exist on the remote.
    NotFound,
    /// 401/403: the caller may not perform the operation.
    InsufficientCredentials,
    /// The remote was unreachable, or the request timed out.
    Network,
    /// 5xx.
    Server,
    /// Any other rejection.
    Other,
}

/// Remote-operation error carried through push results.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn insufficient_credentials(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InsufficientCredentials, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Server, message)
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            404 => RemoteErrorKind::NotFound,
            401 | 403 => RemoteErrorKind::InsufficientCredentials,
            500..=599 => RemoteErrorKind::Server,
            _ => RemoteErrorKind::Other,
        };
        Self::new(kind, message)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RemoteError {}
