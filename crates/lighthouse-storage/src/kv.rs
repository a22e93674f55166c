//! Durable key-value persistence.
//!
//! The checkpoint store only needs `get`/`set`/`remove` on string keys, so
//! persistence is abstracted behind [`DurableStore`]. `SqliteStore` is the
//! production backend; `MemoryStore` backs tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::OptionalExtension;

use lighthouse_core::error::LighthouseError;

use crate::db::Database;

/// String key-value persistence used for checkpoint blobs.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LighthouseError>;
    fn set(&self, key: &str, value: &str) -> Result<(), LighthouseError>;
    fn remove(&self, key: &str) -> Result<(), LighthouseError>;
}

/// SQLite-backed key-value store.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, LighthouseError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| LighthouseError::Storage(format!("Failed to read {}: {}", key, e)))
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LighthouseError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                rusqlite::params![key, value],
            )
            .map_err(|e| LighthouseError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), LighthouseError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", rusqlite::params![key])
                .map_err(|e| {
                    LighthouseError::Storage(format!("Failed to remove {}: {}", key, e))
                })?;
            Ok(())
        })
    }
}

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, LighthouseError> {
        self.entries
            .lock()
            .map_err(|e| LighthouseError::Storage(format!("memory store lock poisoned: {}", e)))
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, LighthouseError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LighthouseError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), LighthouseError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
