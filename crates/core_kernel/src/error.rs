//! Core error types used across the data-access layer
//!
//! The taxonomy mirrors how callers are expected to react:
//!
//! - precondition failures (`InvalidArgument`, `IdentityConflict`,
//!   `Disposed`, `ConcurrentUse`) are programming errors surfaced before
//!   any I/O
//! - `EmptySequence` and `Overflow` come from aggregates with no safe default
//! - `Store` wraps whatever the collaborator store reported, unchanged

use thiserror::Error;

use crate::ports::StoreError;

/// Core error type for repository and unit-of-work operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Identity conflict: {entity} with key {key} is already tracked")]
    IdentityConflict { entity: String, key: String },

    #[error("Not found: {entity} with key {key}")]
    NotFound { entity: String, key: String },

    #[error("Sequence contains no elements")]
    EmptySequence,

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("The unit of work has been committed and disposed")]
    Disposed,

    #[error("Concurrent use of a unit of work: {0}")]
    ConcurrentUse(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        CoreError::InvalidArgument(message.into())
    }

    pub fn identity_conflict(entity: impl Into<String>, key: impl std::fmt::Display) -> Self {
        CoreError::IdentityConflict {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn not_found(entity: impl Into<String>, key: impl std::fmt::Display) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn concurrent_use(message: impl Into<String>) -> Self {
        CoreError::ConcurrentUse(message.into())
    }

    /// Returns true for errors raised by argument or lifecycle checks
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidArgument(_)
                | CoreError::IdentityConflict { .. }
                | CoreError::Disposed
                | CoreError::ConcurrentUse(_)
        )
    }

    /// Returns true if the error came from the collaborator store
    pub fn is_store_error(&self) -> bool {
        matches!(self, CoreError::Store(_))
    }
}

/// Result type for repository and unit-of-work operations
pub type CoreResult<T> = Result<T, CoreError>;
