//! Database error types
//!
//! This module defines the errors raised by the SQLx-backed store, maps raw
//! `sqlx` errors onto them, and converts them into the store-neutral
//! [`StoreError`] that crosses the `StoreSession` port.

use core_kernel::StoreError;
use thiserror::Error;

/// Errors that can occur during database operations
///
/// This enum captures the database-related failures the SQLite store can
/// report: connection issues, query failures and constraint violations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check or NOT NULL constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transaction error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a duplicate entry error
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::duplicate("products", "[1]");
    /// assert!(error.is_constraint_violation());
    /// ```
    pub fn duplicate(collection: &str, key: impl std::fmt::Display) -> Self {
        DatabaseError::DuplicateEntry(format!(
            "row with key {} already exists in '{}'",
            key, collection
        ))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// SQLite reports constraint failures through the message text
/// (`UNIQUE constraint failed: entity_rows.collection, entity_rows.row_key`),
/// so the mapping inspects the message rather than an error code.
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message();
                if message.contains("UNIQUE constraint failed") {
                    DatabaseError::DuplicateEntry(message.to_string())
                } else if message.contains("FOREIGN KEY constraint failed") {
                    DatabaseError::ForeignKeyViolation(message.to_string())
                } else if message.contains("constraint failed") {
                    DatabaseError::ConstraintViolation(message.to_string())
                } else {
                    DatabaseError::QueryFailed(message.to_string())
                }
            }
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed("Pool is closed".to_string())
            }
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            other => DatabaseError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        DatabaseError::SerializationError(error.to_string())
    }
}

/// Maps database failures onto the store-neutral taxonomy
///
/// ```text
/// DuplicateEntry / ForeignKeyViolation / ConstraintViolation -> Conflict
/// ConnectionFailed / PoolExhausted                           -> Connection
/// TransactionFailed                                          -> Transaction
/// SerializationError                                         -> Serialization
/// QueryFailed                                                -> Query
/// MigrationFailed                                            -> Internal
/// ```
impl From<DatabaseError> for StoreError {
    fn from(error: DatabaseError) -> Self {
        let message = error.to_string();
        match error {
            DatabaseError::DuplicateEntry(_)
            | DatabaseError::ForeignKeyViolation(_)
            | DatabaseError::ConstraintViolation(_) => StoreError::conflict(message),
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted => {
                StoreError::Connection {
                    message,
                    source: Some(Box::new(error)),
                }
            }
            DatabaseError::TransactionFailed(_) => StoreError::transaction(message),
            DatabaseError::SerializationError(_) => StoreError::Serialization { message },
            DatabaseError::QueryFailed(_) => StoreError::query(message),
            DatabaseError::MigrationFailed(_) => StoreError::Internal {
                message,
                source: Some(Box::new(error)),
            },
        }
    }
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;
