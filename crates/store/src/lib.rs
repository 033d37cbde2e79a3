//! Store implementations for Switchyard.
//!
//! - [`SqliteStore`]: the production backend (sqlx, WAL journal)
//! - [`InMemoryStore`]: same semantics without persistence, for tests and
//!   throwaway sessions

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
