//! # Festa Store
//! Persistence for birthday records, device registrations, and
//! per-owner settings. The SQLite backend is the production store
//! (single file, WAL mode, zero external services); the in-memory
//! backend serves tests and ephemeral runs.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
