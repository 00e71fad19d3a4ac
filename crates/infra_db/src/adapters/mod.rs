//! Store Adapters
//!
//! Implementations of the [`DataStore`](core_kernel::DataStore) and
//! [`StoreSession`](core_kernel::StoreSession) ports.
//!
//! # Architecture
//!
//! Both adapters share the same batch contract:
//! - a batch is applied all-or-nothing
//! - inserting an existing key fails with `StoreError::Conflict`
//! - updating or deleting a missing key fails with `StoreError::Concurrency`
//! - a keyless update is skipped when an identical row already exists
//!
//! They differ in what they can offer beyond it: the memory store answers
//! lookups without suspending but cannot run SQL, and the SQLite store is the
//! other way round.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{MemoryStore, SqliteStore};
//!
//! let memory: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
//! let sqlite: Arc<dyn DataStore> = Arc::new(SqliteStore::connect(&config).await?);
//! ```

pub mod memory;
pub mod sqlite;

pub use memory::{MemorySession, MemoryStore};
pub use sqlite::{SqliteSession, SqliteStore};
