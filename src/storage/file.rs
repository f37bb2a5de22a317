//! Structured object store backend: one JSON document map per table, kept
//! as a file under the database directory. Saves are atomic per call via a
//! temp-file rename.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, StorageError};

use super::traits::{doc_key, StorageBackend};

/// File holding the meta namespace. Table names are validated upstream and
/// can never collide with it.
const META_FILE: &str = "__meta__.json";

pub struct FileBackend {
    id_attribute: String,
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the table files.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Bind the backend to `<data_dir>/<database>`. Fails when the
    /// directory cannot be created, which the capability probe treats as
    /// "not available".
    pub fn open(data_dir: &Path, database: &str, id_attribute: impl Into<String>) -> Result<Self> {
        let dir = data_dir.join(database);
        fs::create_dir_all(&dir).map_err(StorageError::from)?;
        Ok(Self {
            id_attribute: id_attribute.into(),
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    fn read_map(&self, path: &Path) -> Result<HashMap<String, Value>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read(path).map_err(StorageError::from)?;
        Ok(serde_json::from_slice(&raw).map_err(StorageError::from)?)
    }

    /// Write the map to a sibling temp file, then rename over the target.
    fn write_map<T: serde::Serialize>(&self, path: &Path, map: &HashMap<String, T>) -> Result<()> {
        let raw = serde_json::to_vec(map).map_err(StorageError::from)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(StorageError::from)?;
        fs::rename(&tmp, path).map_err(StorageError::from)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn find(&self, table: &str) -> Result<Vec<Value>> {
        let map = self.read_map(&self.table_path(table))?;
        Ok(map.into_values().collect())
    }

    async fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let mut map = self.read_map(&self.table_path(table))?;
        Ok(map.remove(id))
    }

    async fn save(&self, table: &str, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut keyed = Vec::with_capacity(docs.len());
        for doc in &docs {
            keyed.push((doc_key(doc, &self.id_attribute)?, doc.clone()));
        }

        let _guard = self.write_lock.lock();
        let path = self.table_path(table);
        let mut map = self.read_map(&path)?;
        for (key, doc) in keyed {
            map.insert(key, doc);
        }
        self.write_map(&path, &map)?;
        Ok(docs)
    }

    async fn remove_by_id(&self, table: &str, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let path = self.table_path(table);
        let mut map = self.read_map(&path)?;
        let existed = map.remove(id).is_some();
        if existed {
            self.write_map(&path, &map)?;
        }
        Ok(existed)
    }

    async fn clear(&self, table: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.table_path(table);
        if path.exists() {
            fs::remove_file(path).map_err(StorageError::from)?;
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        for entry in fs::read_dir(&self.dir).map_err(StorageError::from)? {
            let entry = entry.map_err(StorageError::from)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == META_FILE || !name.ends_with(".json") {
                continue;
            }
            fs::remove_file(entry.path()).map_err(StorageError::from)?;
        }
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let map: HashMap<String, String> = {
            let path = self.dir.join(META_FILE);
            if !path.exists() {
                return Ok(None);
            }
            let raw = fs::read(path).map_err(StorageError::from)?;
            serde_json::from_slice(&raw).map_err(StorageError::from)?
        };
        Ok(map.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.dir.join(META_FILE);
        let mut map: HashMap<String, String> = if path.exists() {
            let raw = fs::read(&path).map_err(StorageError::from)?;
            serde_json::from_slice(&raw).map_err(StorageError::from)?
        } else {
            HashMap::new()
        };
        map.insert(key.to_string(), value.to_string());
        self.write_map(&path, &map)
    }
}
