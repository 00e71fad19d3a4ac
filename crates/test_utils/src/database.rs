//! Database Test Utilities
//!
//! Provides store and unit-of-work helpers for integration tests: a fresh
//! in-memory store per test, a SQLite store in a temporary directory, and
//! seeding of the fixture schema.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tempfile::TempDir;

use core_kernel::CoreResult;
use infra_db::{DatabaseConfig, DatabaseError, MemoryStore, SqliteStore, UnitOfWorkFactory};

use crate::fixtures::{
    sample_model, CatalogFixtures, Customer, Order, OrderFixtures, OrderLine, Product,
};

static TEST_TRACING: Lazy<()> = Lazy::new(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// Installs a test-friendly tracing subscriber once per process
///
/// Set `RUST_LOG=infra_db=debug` to see store activity in test output.
pub fn init_test_tracing() {
    Lazy::force(&TEST_TRACING);
}

/// A fresh in-memory store with a factory over the fixture model
///
/// The store is returned alongside the factory so tests can inspect the
/// committed rows directly.
pub fn memory_factory() -> (MemoryStore, UnitOfWorkFactory) {
    init_test_tracing();
    let store = MemoryStore::new();
    let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), sample_model());
    (store, factory)
}

/// A SQLite store in a temporary directory that lives as long as this value
pub struct TestDatabase {
    _dir: TempDir,
    pub store: SqliteStore,
}

impl TestDatabase {
    /// Creates a new database file and applies the migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the store
    /// fails to connect
    pub async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        init_test_tracing();
        let dir = tempfile::tempdir()?;
        let config = DatabaseConfig::from_path(dir.path().join("test.db")).max_connections(2);
        let store = Self::connect(&config).await?;
        Ok(Self { _dir: dir, store })
    }

    async fn connect(config: &DatabaseConfig) -> Result<SqliteStore, DatabaseError> {
        SqliteStore::connect(config).await
    }

    /// A factory over the fixture model
    pub fn factory(&self) -> UnitOfWorkFactory {
        UnitOfWorkFactory::new(Arc::new(self.store.clone()), sample_model())
    }
}

/// Commits the catalog, both customers, Alice's and Bob's orders, and the
/// lines of Alice's order
pub async fn seed_fixtures(factory: &UnitOfWorkFactory) -> CoreResult<u64> {
    let mut uow = factory.open().await?;
    uow.repository::<Product>()
        .add_range(CatalogFixtures::products())?;
    uow.repository::<Customer>()
        .add_range([OrderFixtures::alice(), OrderFixtures::bob()])?;
    uow.repository::<Order>()
        .add_range([OrderFixtures::alice_order(), OrderFixtures::bob_order()])?;
    uow.repository::<OrderLine>()
        .add_range(OrderFixtures::alice_lines())?;
    uow.commit().await
}
