//! Schema migrations, applied in order and recorded in `schema_migrations`.

use rusqlite::Connection;
use tracing::info;

use lighthouse_core::error::LighthouseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_store",
    sql: "CREATE TABLE IF NOT EXISTS kv_store (
              key         TEXT PRIMARY KEY NOT NULL,
              value       TEXT NOT NULL,
              updated_at  INTEGER NOT NULL
          );",
}];

pub const LATEST_VERSION: i64 = 1;

pub fn current_version(conn: &Connection) -> Result<i64, LighthouseError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| LighthouseError::Storage(format!("read schema version: {}", e)))
}

/// Apply every migration newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), LighthouseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version     INTEGER PRIMARY KEY NOT NULL,
             name        TEXT NOT NULL,
             applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
         );",
    )
    .map_err(|e| LighthouseError::Storage(format!("create schema_migrations: {}", e)))?;

    let current = current_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql).map_err(|e| {
            LighthouseError::Storage(format!("migration v{} failed: {}", migration.version, e))
        })?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(|e| {
            LighthouseError::Storage(format!("record migration v{}: {}", migration.version, e))
        })?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}
