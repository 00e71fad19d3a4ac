//! Infrastructure Database Layer
//!
//! This crate provides the data-access layer: a generic [`Repository`] per
//! entity type, composable [`Query`] views, a change tracker with identity
//! resolution, and the [`UnitOfWork`] that persists everything staged in one
//! batch and drives transactions.
//!
//! # Architecture
//!
//! ```text
//! UnitOfWork ──┬── Repository<T> ──┐
//!              ├── Query<T> ───────┼──► StoreContext ──► ChangeTracker
//!              └── Transaction     │         │
//!                                  │         └──► StoreSession (adapters)
//!                                  └── executor (async-safe materialization)
//! ```
//!
//! Two store adapters ship with the crate: [`MemoryStore`] for in-process
//! use and tests, and [`SqliteStore`] backed by SQLx.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{DataAccessSettings, SqliteStore, UnitOfWorkFactory};
//!
//! let settings = DataAccessSettings::from_env()?;
//! let store = SqliteStore::connect(&settings.database_config()).await?;
//! let factory = UnitOfWorkFactory::new(Arc::new(store), model);
//!
//! let mut uow = factory.open().await?;
//! uow.repository::<Product>().add(product)?;
//! uow.commit().await?;
//! ```

pub mod adapters;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pool;
pub mod query;
pub mod repository;
pub mod tracker;
pub mod unit_of_work;

pub use adapters::{MemoryStore, SqliteStore};
pub use config::{init_tracing, DataAccessSettings, LogFormat};
pub use context::StoreContext;
pub use error::{DatabaseError, DatabaseResult};
pub use executor::{first_matching_async_safe, first_or_default_async_safe, to_list_async_safe};
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use query::{Projection, Query};
pub use repository::Repository;
pub use tracker::{ChangeTracker, TrackedEntry};
pub use unit_of_work::{Transaction, UnitOfWork, UnitOfWorkFactory};
