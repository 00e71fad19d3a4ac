//! Database connection pool management
//!
//! This module provides connection pool configuration and creation for SQLite
//! using SQLx, and applies the embedded schema migrations.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::DatabaseError;

/// Type alias for the SQLite connection pool
pub type DatabasePool = SqlitePool;

const MEMORY_URL: &str = "sqlite::memory:";

/// Configuration options for the database connection pool
///
/// # Example
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("sqlite://data/app.db")
///     .max_connections(8)
///     .min_connections(1)
///     .busy_timeout(Duration::from_secs(2));
/// assert_eq!(config.max_connections, 8);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection string (`sqlite://path/to/file.db` or `sqlite::memory:`)
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum lifetime of a connection; `None` keeps connections forever
    pub max_lifetime: Option<Duration>,
    /// Idle timeout before closing a connection; `None` never closes idle ones
    pub idle_timeout: Option<Duration>,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
    /// Create the database file if it does not exist
    pub create_if_missing: bool,
}

impl DatabaseConfig {
    /// Creates a new database configuration with the given connection URL
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection string (e.g., "sqlite://data/app.db")
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(30 * 60)), // 30 minutes
            idle_timeout: Some(Duration::from_secs(10 * 60)), // 10 minutes
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }

    /// Creates a configuration for a file path
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(format!("sqlite://{}", path.as_ref().display()))
    }

    /// Creates an in-memory database configuration
    ///
    /// Every SQLite connection to `:memory:` opens its own database, so the
    /// pool is pinned to one connection that never expires.
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            max_lifetime: None,
            idle_timeout: None,
            ..Self::new(MEMORY_URL)
        }
    }

    /// Returns true if the configuration points at an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }

    /// Sets the maximum number of connections in the pool
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections to maintain
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout duration
    ///
    /// # Arguments
    ///
    /// * `timeout` - Duration to wait for a connection (default: 30s)
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the maximum lifetime of a connection
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Sets the idle timeout before closing a connection
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether a missing database file is created
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("sqlite://data_access.db")
    }
}

/// Creates a database connection pool with the given configuration
///
/// File databases run in WAL mode so readers do not block the writer.
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the URL is malformed or the
/// pool cannot be created
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!(
        url = %config.url,
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Creating database pool"
    );

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);
    if !config.is_in_memory() {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .max_lifetime(config.max_lifetime)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    info!("Database pool created successfully");
    Ok(pool)
}

/// Applies the embedded migrations
///
/// Idempotent: migrations already recorded in `_sqlx_migrations` are skipped.
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
