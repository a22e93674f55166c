//! Lighthouse Storage crate - SQLite persistence and the intake checkpoint store.
//!
//! Provides a WAL-mode SQLite database with migrations, a small durable
//! key-value abstraction with SQLite and in-memory implementations, and the
//! versioned checkpoint store that lets an intake session resume after a
//! crash or reload.

pub mod checkpoint;
pub mod db;
pub mod kv;
pub mod migrations;

pub use checkpoint::{build_resume_greeting, CheckpointStore, Debounce, SessionDraft};
pub use db::Database;
pub use kv::{DurableStore, MemoryStore, SqliteStore};
