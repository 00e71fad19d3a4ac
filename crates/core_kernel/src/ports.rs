//! Collaborator store ports
//!
//! The data-access layer never talks to a database directly. It consumes the
//! two traits defined here, and adapters in `infra_db` implement them.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               UnitOfWork / Repository<T> / Query<T>          │
//! │      (change tracking, key resolution, eager loading)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 DataStore -> StoreSession                    │
//! │   scan / find / apply(batch) / begin / commit / rollback     │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │    MemoryStore    │     │   SqliteStore    │
//!         │  (in-process)     │     │   (sqlx)         │
//!         └───────────────────┘     └──────────────────┘
//! ```
//!
//! Rows cross the port as JSON objects. Keys cross it as canonical
//! [`RowKey`]s computed by the caller from the model, so a store needs no
//! knowledge of entity types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::key::RowKey;
use crate::sql::SqlStatement;

/// A stored row: the JSON object form of an entity without navigations
pub type Row = Value;

/// Error type for store operations
///
/// Every adapter reports failures through this type so the layer above can
/// propagate them unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same key already exists
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// An update or delete matched no row
    #[error("Concurrency conflict: {message}")]
    Concurrency { message: String },

    /// The store does not offer this operation
    #[error("Unsupported by {store}: {operation}")]
    Unsupported { store: String, operation: String },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A statement failed to execute
    #[error("Query failed: {message}")]
    Query { message: String },

    /// Begin, commit or rollback failed
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// A stored row could not be encoded or decoded
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict {
            message: message.into(),
        }
    }

    pub fn concurrency(message: impl Into<String>) -> Self {
        StoreError::Concurrency {
            message: message.into(),
        }
    }

    pub fn unsupported(store: impl Into<String>, operation: impl Into<String>) -> Self {
        StoreError::Unsupported {
            store: store.into(),
            operation: operation.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        StoreError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        StoreError::Query {
            message: message.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        StoreError::Transaction {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection { .. })
    }

    /// Returns true if the batch was rejected because of conflicting data
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::Concurrency { .. }
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: error.to_string(),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Results of a query, either streamed or already buffered
///
/// Stores backed by a database stream rows as they arrive; in-process stores
/// hand back an iterator. The executor in `infra_db` materializes both the
/// same way.
pub enum QuerySource<'a, T> {
    Streaming(BoxStream<'a, StoreResult<T>>),
    Buffered(Box<dyn Iterator<Item = T> + Send + 'a>),
}

impl<'a, T: Send + 'a> QuerySource<'a, T> {
    /// Wraps an owned collection
    pub fn buffered(items: Vec<T>) -> Self {
        QuerySource::Buffered(Box::new(items.into_iter()))
    }

    /// Returns true if results arrive asynchronously
    pub fn is_streaming(&self) -> bool {
        matches!(self, QuerySource::Streaming(_))
    }
}

impl<T> fmt::Debug for QuerySource<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuerySource::Streaming(_) => f.write_str("QuerySource::Streaming"),
            QuerySource::Buffered(_) => f.write_str("QuerySource::Buffered"),
        }
    }
}

/// One staged write, applied as part of an all-or-nothing batch
///
/// A `None` key marks an entity type without key metadata: the row is written
/// whole, and an update is skipped if an identical row is already stored.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert {
        collection: String,
        key: Option<RowKey>,
        row: Row,
    },
    Update {
        collection: String,
        key: Option<RowKey>,
        row: Row,
    },
    Delete {
        collection: String,
        key: RowKey,
    },
}

impl RowChange {
    /// Collection the change applies to
    pub fn collection(&self) -> &str {
        match self {
            RowChange::Insert { collection, .. }
            | RowChange::Update { collection, .. }
            | RowChange::Delete { collection, .. } => collection,
        }
    }
}

/// A persistence backend that hands out sessions
#[async_trait]
pub trait DataStore: Send + Sync + fmt::Debug + 'static {
    /// Store name for logs and errors
    fn name(&self) -> &str;

    /// Opens a session; one unit of work owns one session
    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>>;
}

/// One logical connection to a store
///
/// At most one transaction is open per session. Outside a transaction every
/// `apply` batch commits on its own; inside one it commits with the
/// transaction.
#[async_trait]
pub trait StoreSession: Send {
    /// Streams or buffers every row of `collection` in store order
    async fn scan<'a>(&'a mut self, collection: &'a str) -> StoreResult<QuerySource<'a, Row>>;

    /// Looks up one row by key
    async fn find(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>>;

    /// Looks up one row by key without suspending
    ///
    /// Stores whose I/O is inherently asynchronous keep the default, which
    /// reports the operation as unsupported.
    fn find_blocking(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        let _ = (collection, key);
        Err(StoreError::unsupported("store session", "blocking lookup"))
    }

    /// Applies a batch atomically, returning the number of rows written
    async fn apply(&mut self, changes: &[RowChange]) -> StoreResult<u64>;

    /// Starts a transaction
    async fn begin(&mut self) -> StoreResult<()>;

    /// Commits the open transaction
    async fn commit(&mut self) -> StoreResult<()>;

    /// Rolls back the open transaction
    async fn rollback(&mut self) -> StoreResult<()>;

    /// Executes a raw statement, returning the number of affected rows
    async fn execute(&mut self, statement: &SqlStatement) -> StoreResult<u64>;

    /// Releases the session; an open transaction is rolled back
    async fn close(self: Box<Self>) -> StoreResult<()>;
}
