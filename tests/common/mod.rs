//! Shared fixtures: a programmable mock network and engine builders.

// Each test binary uses its own slice of these fixtures.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use kinvey_sync::storage::MemoryBackend;
use kinvey_sync::{
    Config, NetworkAdapter, RemoteError, RemoteResult, StorageBackend, StorageError, SyncManager,
};

// ============================================================================
// MockNetwork
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
    Get,
}

/// One observed remote call.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub collection: String,
    pub id: Option<String>,
    pub body: Option<Value>,
}

/// A network adapter with programmable per-operation responses and a call
/// log. Unprogrammed operations echo sensible defaults: updates return
/// their body, deletes succeed, creates assign a `srv<n>` id, repair reads
/// miss.
pub struct MockNetwork {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<HashMap<(Op, String), VecDeque<RemoteResult<Value>>>>,
    delay: Mutex<Option<Duration>>,
    next_server_id: AtomicU64,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            next_server_id: AtomicU64::new(0),
        })
    }

    /// Queue a response for the next create against `collection`.
    pub fn on_create(&self, collection: &str, result: RemoteResult<Value>) {
        self.program(Op::Create, collection, result);
    }

    /// Queue a response for the next update of entity `id`.
    pub fn on_update(&self, id: &str, result: RemoteResult<Value>) {
        self.program(Op::Update, id, result);
    }

    /// Queue a response for the next delete of entity `id`. The `Ok` value
    /// is ignored.
    pub fn on_delete(&self, id: &str, result: RemoteResult<Value>) {
        self.program(Op::Delete, id, result);
    }

    /// Queue a response for the next repair read of entity `id`.
    pub fn on_get(&self, id: &str, result: RemoteResult<Value>) {
        self.program(Op::Get, id, result);
    }

    /// Delay every call by `duration` (drives timeout tests under paused
    /// tokio time).
    pub fn set_delay(&self, duration: Duration) {
        *self.delay.lock().unwrap() = Some(duration);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == op)
            .collect()
    }

    fn program(&self, op: Op, key: &str, result: RemoteResult<Value>) {
        self.responses
            .lock()
            .unwrap()
            .entry((op, key.to_string()))
            .or_default()
            .push_back(result);
    }

    fn take(&self, op: Op, key: &str) -> Option<RemoteResult<Value>> {
        self.responses
            .lock()
            .unwrap()
            .get_mut(&(op, key.to_string()))
            .and_then(VecDeque::pop_front)
    }

    fn record(&self, op: Op, collection: &str, id: Option<&str>, body: Option<&Value>) {
        self.calls.lock().unwrap().push(Call {
            op,
            collection: collection.to_string(),
            id: id.map(str::to_string),
            body: body.cloned(),
        });
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NetworkAdapter for MockNetwork {
    async fn create(&self, collection: &str, entity: &Value) -> RemoteResult<Value> {
        self.record(Op::Create, collection, None, Some(entity));
        self.pause().await;
        match self.take(Op::Create, collection) {
            Some(result) => result,
            None => {
                let n = self.next_server_id.fetch_add(1, Ordering::SeqCst);
                let mut created = entity.as_object().cloned().unwrap_or_default();
                created.insert("_id".into(), Value::String(format!("srv{n}")));
                Ok(Value::Object(created))
            }
        }
    }

    async fn update(&self, collection: &str, id: &str, entity: &Value) -> RemoteResult<Value> {
        self.record(Op::Update, collection, Some(id), Some(entity));
        self.pause().await;
        self.take(Op::Update, id).unwrap_or(Ok(entity.clone()))
    }

    async fn delete(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.record(Op::Delete, collection, Some(id), None);
        self.pause().await;
        match self.take(Op::Delete, id) {
            Some(result) => result.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> RemoteResult<Value> {
        self.record(Op::Get, collection, Some(id), None);
        self.pause().await;
        self.take(Op::Get, id)
            .unwrap_or_else(|| Err(RemoteError::not_found(format!("{id} not on remote"))))
    }
}

// ============================================================================
// FlakyBackend
// ============================================================================

/// Storage wrapper that fails saves to one configured table, for driving
/// local mirror-write failures.
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_saves_to: Mutex<Option<String>>,
}

impl FlakyBackend {
    pub fn new(id_attribute: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(id_attribute),
            fail_saves_to: Mutex::new(None),
        })
    }

    /// Every subsequent save against `table` fails.
    pub fn fail_saves_to(&self, table: &str) {
        *self.fail_saves_to.lock().unwrap() = Some(table.to_string());
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn find(&self, table: &str) -> kinvey_sync::Result<Vec<Value>> {
        self.inner.find(table).await
    }

    async fn find_by_id(&self, table: &str, id: &str) -> kinvey_sync::Result<Option<Value>> {
        self.inner.find_by_id(table, id).await
    }

    async fn save(&self, table: &str, docs: Vec<Value>) -> kinvey_sync::Result<Vec<Value>> {
        if self.fail_saves_to.lock().unwrap().as_deref() == Some(table) {
            return Err(
                StorageError::backend(format!("injected save failure for {table}")).into(),
            );
        }
        self.inner.save(table, docs).await
    }

    async fn remove_by_id(&self, table: &str, id: &str) -> kinvey_sync::Result<bool> {
        self.inner.remove_by_id(table, id).await
    }

    async fn clear(&self, table: &str) -> kinvey_sync::Result<()> {
        self.inner.clear(table).await
    }

    async fn clear_all(&self) -> kinvey_sync::Result<()> {
        self.inner.clear_all().await
    }

    async fn get_meta(&self, key: &str) -> kinvey_sync::Result<Option<String>> {
        self.inner.get_meta(key).await
    }

    async fn set_meta(&self, key: &str, value: &str) -> kinvey_sync::Result<()> {
        self.inner.set_meta(key, value).await
    }
}

// ============================================================================
// Engine builders
// ============================================================================

/// Engine over an in-memory backend and the given mock, plus the backend
/// handle for direct state assertions.
pub fn make_manager(network: Arc<MockNetwork>) -> (SyncManager, Arc<dyn StorageBackend>) {
    make_manager_with_config(Config::new("app1"), network)
}

pub fn make_manager_with_config(
    config: Config,
    network: Arc<MockNetwork>,
) -> (SyncManager, Arc<dyn StorageBackend>) {
    let backend: Arc<dyn StorageBackend> =
        Arc::new(kinvey_sync::storage::MemoryBackend::new(&config.id_attribute));
    let manager = SyncManager::with_backend(config, backend.clone(), network)
        .expect("engine construction");
    (manager, backend)
}
