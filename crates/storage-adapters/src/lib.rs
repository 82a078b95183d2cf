//! mindmap/crates/storage-adapters/src/lib.rs
//!
//! Persistence adapters implementing the `domains` ports.
//! The in-memory store is always available; SQLite sits behind `db-sqlite`.

pub mod memory;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use memory::MemoryMapRepo;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteMapRepo;
