//! SQLite connection handling for the checkpoint database.
//!
//! One connection behind a Mutex. Two lighthouse processes may share a data
//! directory, so the file database uses WAL and waits on a busy lock
//! instead of failing the write.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use lighthouse_core::error::LighthouseError;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn storage_err(context: &str, e: rusqlite::Error) -> LighthouseError {
    LighthouseError::Storage(format!("{}: {}", context, e))
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file, creating parent directories as
    /// needed, and bring the schema up to date.
    pub fn new(path: &Path) -> Result<Self, LighthouseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(|e| storage_err("open database", e))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| storage_err("configure database", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| storage_err("set busy timeout", e))?;

        info!(path = %path.display(), "Checkpoint database opened");
        Self::from_connection(conn)
    }

    /// Throwaway database for tests and ephemeral sessions.
    pub fn in_memory() -> Result<Self, LighthouseError> {
        let conn =
            Connection::open_in_memory().map_err(|e| storage_err("open in-memory database", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LighthouseError> {
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LighthouseError>
    where
        F: FnOnce(&Connection) -> Result<T, LighthouseError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LighthouseError::Storage(format!("database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> Result<i64, LighthouseError> {
        self.with_conn(migrations::current_version)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
