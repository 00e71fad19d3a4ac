//! Data-access configuration
//!
//! Settings are read from `DATA_ACCESS_*` environment variables (a `.env`
//! file is honoured) and turned into a [`DatabaseConfig`]. Every field has a
//! default, so an empty environment yields a working local configuration.

use serde::Deserialize;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::pool::DatabaseConfig;

/// Environment variable prefix for [`DataAccessSettings`]
pub const ENV_PREFIX: &str = "DATA_ACCESS";

/// Data-access settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataAccessSettings {
    /// SQLite connection string
    pub database_url: String,
    /// Maximum pool size
    pub max_connections: u32,
    /// Minimum pool size
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub connect_timeout_secs: u64,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,
    /// Log level
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,
}

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl Default for DataAccessSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data_access.db".to_string(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 30,
            busy_timeout_ms: 5_000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl DataAccessSettings {
    /// Loads settings from the process environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if present (useful for local development)
        dotenvy::dotenv().ok();
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads settings from an explicit environment source
    pub fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Builds the pool configuration
    pub fn database_config(&self) -> DatabaseConfig {
        if self.database_url.contains(":memory:") {
            return DatabaseConfig::in_memory();
        }
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` takes precedence over `log_level`. Calling this more than once
/// leaves the first subscriber in place.
pub fn init_tracing(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = format == LogFormat::Json;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_target(true)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_target(true)))
        .try_init();
}
