//! Typed CRUD over one collection table, bridging the query object down to
//! the backend's full-table scan.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

use crate::error::{ConfigError, Result, StorageError};
use crate::metadata::EntityMeta;
use crate::query::{self, Aggregation, GroupResult, Query};
use crate::storage::StorageBackend;

/// Collection and database names: 1–128 chars of `[A-Za-z0-9-]`.
pub fn validate_name(name: &str) -> Result<()> {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    let re = NAME_RE.get_or_init(|| Regex::new("^[A-Za-z0-9-]{1,128}$").unwrap());
    if re.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidName {
            name: name.to_string(),
        }
        .into())
    }
}

/// CRUD + query evaluation for one collection.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    collection: String,
    meta: EntityMeta,
}

impl LocalStore {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        collection: impl Into<String>,
        meta: EntityMeta,
    ) -> Result<Self> {
        let collection = collection.into();
        validate_name(&collection)?;
        Ok(Self {
            backend,
            collection,
            meta,
        })
    }

    /// Bind a reserved engine table, exempt from the user-name rule.
    pub(crate) fn reserved(
        backend: Arc<dyn StorageBackend>,
        table: impl Into<String>,
        meta: EntityMeta,
    ) -> Self {
        Self {
            backend,
            collection: table.into(),
            meta,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Device-local identifier for documents saved without one.
    pub fn generate_id(&self) -> String {
        self.meta.generate_local_id()
    }

    /// Upsert one document, assigning an identifier if it has none.
    pub async fn save(&self, doc: Value) -> Result<Value> {
        let mut saved = self.save_many(vec![doc]).await?;
        saved
            .pop()
            .ok_or_else(|| StorageError::backend("backend returned no saved document").into())
    }

    /// Upsert many documents in a single backend call.
    pub async fn save_many(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let docs: Vec<Value> = docs
            .into_iter()
            .map(|doc| {
                if self.meta.id_of(&doc).is_some() {
                    doc
                } else {
                    let mut obj = doc.as_object().cloned().unwrap_or_default();
                    obj.insert(
                        self.meta.id_attribute().to_string(),
                        Value::String(self.generate_id()),
                    );
                    Value::Object(obj)
                }
            })
            .collect();
        self.backend.save(&self.collection, docs).await
    }

    pub async fn find(&self, query: &Query) -> Result<Vec<Value>> {
        let docs = self.backend.find(&self.collection).await?;
        Ok(query.evaluate(docs))
    }

    pub async fn find_all(&self) -> Result<Vec<Value>> {
        self.backend.find(&self.collection).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Value>> {
        self.backend.find_by_id(&self.collection, id).await
    }

    /// Matching-row count. Sort, skip and limit are ignored.
    pub async fn count(&self, query: &Query) -> Result<usize> {
        let docs = self.backend.find(&self.collection).await?;
        Ok(query.filter_only(docs).len())
    }

    pub async fn group(&self, aggregation: &Aggregation) -> Result<Vec<GroupResult>> {
        let docs = self.backend.find(&self.collection).await?;
        Ok(query::group(aggregation, docs))
    }

    /// Read-modify-write: the closure receives the current document (if
    /// any) and returns its replacement, which is stored under `id`.
    pub async fn find_and_modify<F>(&self, id: &str, f: F) -> Result<Value>
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let current = self.backend.find_by_id(&self.collection, id).await?;
        let mut replacement = f(current.as_ref());
        if self.meta.id_of(&replacement) != Some(id) {
            if let Some(obj) = replacement.as_object_mut() {
                obj.insert(
                    self.meta.id_attribute().to_string(),
                    Value::String(id.to_string()),
                );
            }
        }
        let mut saved = self.backend.save(&self.collection, vec![replacement]).await?;
        saved
            .pop()
            .ok_or_else(|| StorageError::backend("backend returned no saved document").into())
    }

    /// Delete every matching document; returns the removed count.
    pub async fn clean(&self, query: &Query) -> Result<usize> {
        let docs = self.backend.find(&self.collection).await?;
        let matched = query.filter_only(docs);
        let mut removed = 0;
        for doc in &matched {
            if let Some(id) = self.meta.id_of(doc) {
                if self.backend.remove_by_id(&self.collection, id).await? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub async fn remove_by_id(&self, id: &str) -> Result<bool> {
        self.backend.remove_by_id(&self.collection, id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear(&self.collection).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    fn store(collection: &str) -> LocalStore {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new("_id"));
        LocalStore::new(backend, collection, EntityMeta::new("_id", "_kmd")).unwrap()
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("books").is_ok());
        assert!(validate_name("Books-2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("kinvey_sync").is_err());
        assert!(validate_name(&"x".repeat(129)).is_err());
        assert!(validate_name("bad name").is_err());
    }

    #[test]
    fn new_rejects_invalid_collection() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new("_id"));
        assert!(LocalStore::new(backend, "bad name", EntityMeta::new("_id", "_kmd")).is_err());
    }

    #[tokio::test]
    async fn save_assigns_missing_id() {
        let store = store("books");
        let saved = store.save(json!({"title": "Dune"})).await.unwrap();
        let id = saved["_id"].as_str().unwrap();
        assert!(id.starts_with("local_"));
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap()["title"], json!("Dune"));
    }

    #[tokio::test]
    async fn save_keeps_existing_id() {
        let store = store("books");
        let saved = store.save(json!({"_id": "b1", "title": "Dune"})).await.unwrap();
        assert_eq!(saved["_id"], json!("b1"));
    }

    #[tokio::test]
    async fn find_and_count_with_query() {
        let store = store("books");
        store
            .save_many(vec![
                json!({"_id": "b1", "genre": "sf"}),
                json!({"_id": "b2", "genre": "sf"}),
                json!({"_id": "b3", "genre": "crime"}),
            ])
            .await
            .unwrap();

        let query = Query::new().equal_to("genre", "sf");
        assert_eq!(store.find(&query).await.unwrap().len(), 2);

        // count ignores limit
        let limited = Query::new().equal_to("genre", "sf").limit(1);
        assert_eq!(store.count(&limited).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn group_by_field() {
        let store = store("books");
        store
            .save_many(vec![
                json!({"_id": "b1", "genre": "sf"}),
                json!({"_id": "b2", "genre": "sf"}),
                json!({"_id": "b3", "genre": "crime"}),
            ])
            .await
            .unwrap();

        let groups = store.group(&Aggregation::group_by(&["genre"])).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.iter().map(|g| g.count).sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn find_and_modify_replaces_under_id() {
        let store = store("books");
        store.save(json!({"_id": "b1", "reads": 1})).await.unwrap();

        let updated = store
            .find_and_modify("b1", |current| {
                let reads = current
                    .and_then(|d| d["reads"].as_u64())
                    .unwrap_or(0);
                json!({"reads": reads + 1})
            })
            .await
            .unwrap();
        assert_eq!(updated, json!({"reads": 2, "_id": "b1"}));
    }

    #[tokio::test]
    async fn clean_removes_matches_only() {
        let store = store("books");
        store
            .save_many(vec![
                json!({"_id": "b1", "genre": "sf"}),
                json!({"_id": "b2", "genre": "crime"}),
            ])
            .await
            .unwrap();

        let removed = store
            .clean(&Query::new().equal_to("genre", "sf"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_by_id("b1").await.unwrap().is_none());
        assert!(store.find_by_id("b2").await.unwrap().is_some());
    }
}
