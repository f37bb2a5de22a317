//! SQLite backend. All tables share one physical `documents` table keyed by
//! `(tbl, id)`, so logical tables exist the moment a row does and reads
//! against missing tables are naturally empty. Multi-document saves run in
//! a transaction.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{Result, StorageError};

use super::traits::{doc_key, StorageBackend};

pub struct SqliteBackend {
    id_attribute: String,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) the database file at `<data_dir>/<database>.sqlite3`.
    pub fn open(data_dir: &Path, database: &str, id_attribute: impl Into<String>) -> Result<Self> {
        let path = data_dir.join(format!("{database}.sqlite3"));
        let conn = Connection::open(path).map_err(StorageError::from)?;
        Self::with_connection(conn, id_attribute)
    }

    /// In-memory database, used by tests and by the capability probe.
    pub fn open_in_memory(id_attribute: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        Self::with_connection(conn, id_attribute)
    }

    fn with_connection(conn: Connection, id_attribute: impl Into<String>) -> Result<Self> {
        conn.execute_batch(
            r#"
PRAGMA journal_mode=WAL;

CREATE TABLE IF NOT EXISTS documents (
  tbl TEXT NOT NULL,
  id  TEXT NOT NULL,
  doc TEXT NOT NULL,
  PRIMARY KEY (tbl, id)
);

CREATE TABLE IF NOT EXISTS meta (
  k TEXT PRIMARY KEY,
  v TEXT NOT NULL
);
"#,
        )
        .map_err(StorageError::from)?;
        Ok(Self {
            id_attribute: id_attribute.into(),
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn find(&self, table: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT doc FROM documents WHERE tbl=?1")
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![table], |r| r.get::<_, String>(0))
            .map_err(StorageError::from)?;

        let mut docs = Vec::new();
        for raw in rows {
            let raw = raw.map_err(StorageError::from)?;
            docs.push(serde_json::from_str(&raw).map_err(StorageError::from)?);
        }
        Ok(docs)
    }

    async fn find_by_id(&self, table: &str, id: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc FROM documents WHERE tbl=?1 AND id=?2",
                params![table, id],
                |r| r.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StorageError::from)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, table: &str, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut entries = Vec::with_capacity(docs.len());
        for doc in &docs {
            let key = doc_key(doc, &self.id_attribute)?;
            let raw = serde_json::to_string(doc).map_err(StorageError::from)?;
            entries.push((key, raw));
        }

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction().map_err(StorageError::from)?;
        for (key, raw) in entries {
            tx.execute(
                "INSERT INTO documents(tbl, id, doc) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tbl, id) DO UPDATE SET doc=excluded.doc",
                params![table, key, raw],
            )
            .map_err(StorageError::from)?;
        }
        tx.commit().map_err(StorageError::from)?;
        Ok(docs)
    }

    async fn remove_by_id(&self, table: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM documents WHERE tbl=?1 AND id=?2",
                params![table, id],
            )
            .map_err(StorageError::from)?;
        Ok(removed > 0)
    }

    async fn clear(&self, table: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM documents WHERE tbl=?1", params![table])
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM documents", [])
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row("SELECT v FROM meta WHERE k=?1", params![key], |r| r.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO meta(k, v) VALUES (?1, ?2)
             ON CONFLICT(k) DO UPDATE SET v=excluded.v",
            params![key, value],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }
}
