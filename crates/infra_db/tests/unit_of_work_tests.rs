//! Integration tests for unit-of-work lifecycle, transactions and raw SQL

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use core_kernel::{
    interpolated_sql, CoreError, DataStore, EntityState, Filter, QuerySource, Row, RowChange,
    RowKey, SqlStatement, SqlValue, StoreError, StoreResult, StoreSession,
};
use infra_db::{MemoryStore, UnitOfWorkFactory};
use test_utils::{
    assert_disposed, assert_invalid_argument, assert_state, assert_store_error, memory_factory,
    sample_model, seed_fixtures, CatalogFixtures, Product, ProductBuilder,
};

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_repositories_are_cached_per_type() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        let first = uow.repository::<Product>();
        let second = uow.repository::<Product>();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_units_of_work_have_distinct_ids() {
        let (_, factory) = memory_factory();

        let a = factory.open().await.unwrap();
        let b = factory.open().await.unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.id().to_string().starts_with("UOW-"));
    }

    #[tokio::test]
    async fn test_save_without_changes_writes_nothing() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        assert_eq!(uow.save_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_is_one_batch_across_repositories() {
        let (store, factory) = memory_factory();
        seed_fixtures(&factory).await.unwrap();
        let uow = factory.open().await.unwrap();

        uow.repository::<Product>()
            .add(ProductBuilder::new().with_id(4).build())
            .unwrap();
        // No row 77 exists, so the whole batch fails
        uow.repository::<Product>()
            .update(ProductBuilder::new().with_id(77).build())
            .unwrap();

        assert_store_error(uow.save_changes().await, |e| {
            matches!(e, StoreError::Concurrency { .. })
        });
        assert_eq!(store.row_count("products"), 3);
    }

    #[tokio::test]
    async fn test_commit_disposes_the_unit_of_work() {
        let (store, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        products.add(CatalogFixtures::widget()).unwrap();
        assert_eq!(uow.commit().await.unwrap(), 1);

        assert!(uow.is_disposed());
        assert_eq!(store.row_count("products"), 1);
        assert_disposed(products.add(CatalogFixtures::gadget()));
        assert_disposed(products.get_by_id(1i64));
        assert_disposed(products.get(None, None, "").await);
        assert_disposed(uow.save_changes().await);
        assert_disposed(uow.execute_sql_raw("SELECT 1", &[]).await);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_the_unit_of_work_usable() {
        let (_, factory) = memory_factory();
        seed_fixtures(&factory).await.unwrap();
        let mut uow = factory.open().await.unwrap();
        uow.begin_transaction().await.unwrap();

        uow.repository::<Product>()
            .add(CatalogFixtures::widget())
            .unwrap();

        assert_store_error(uow.commit().await, StoreError::is_conflict);
        assert!(!uow.is_disposed());
        uow.rollback().await.unwrap();
        assert!(!uow.has_active_transaction());
    }
}

mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_transaction_is_idempotent() {
        let (_, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();

        let first = uow.begin_transaction().await.unwrap();
        let second = uow.begin_transaction().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(uow.transaction_id(), Some(first));
        assert!(uow.transaction().is_some_and(|t| t.started_at() <= chrono::Utc::now()));
    }

    #[tokio::test]
    async fn test_rollback_without_transaction_is_a_no_op() {
        let (_, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();

        uow.repository::<Product>()
            .add(CatalogFixtures::widget())
            .unwrap();
        uow.rollback().await.unwrap();

        assert_state(
            &uow.repository::<Product>(),
            &CatalogFixtures::widget(),
            EntityState::Added,
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_saved_work_and_tracking() {
        let (store, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        uow.begin_transaction().await.unwrap();
        products.add(CatalogFixtures::widget()).unwrap();
        uow.save_changes().await.unwrap();
        assert_eq!(products.count_long(Filter::all()).await.unwrap(), 1);

        uow.rollback().await.unwrap();

        assert!(!uow.has_active_transaction());
        assert_eq!(store.row_count("products"), 0);
        assert_state(&products, &CatalogFixtures::widget(), EntityState::Detached);
        assert_eq!(products.get_by_id(1i64).unwrap(), None);
    }

    #[tokio::test]
    async fn test_commit_publishes_transaction_writes() {
        let (store, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();

        uow.begin_transaction().await.unwrap();
        uow.repository::<Product>()
            .add_range(CatalogFixtures::products())
            .unwrap();
        uow.save_changes().await.unwrap();
        assert_eq!(store.row_count("products"), 0);

        uow.repository::<Product>()
            .delete(&CatalogFixtures::gizmo())
            .unwrap();
        assert_eq!(uow.commit().await.unwrap(), 1);

        assert_eq!(store.row_count("products"), 2);
        assert!(!uow.has_active_transaction());
    }

    #[tokio::test]
    async fn test_rejected_commit_ends_the_transaction() {
        let (store, factory) = memory_factory();
        let mut first = factory.open().await.unwrap();
        let mut second = factory.open().await.unwrap();

        first.begin_transaction().await.unwrap();
        first
            .repository::<Product>()
            .add(CatalogFixtures::widget())
            .unwrap();
        first.save_changes().await.unwrap();

        second
            .repository::<Product>()
            .add(CatalogFixtures::widget())
            .unwrap();
        second.commit().await.unwrap();

        assert_store_error(first.commit().await, StoreError::is_conflict);
        assert!(!first.is_disposed());
        assert!(!first.has_active_transaction());
        assert_eq!(first.transaction_id(), None);
        assert_state(
            &first.repository::<Product>(),
            &CatalogFixtures::widget(),
            EntityState::Detached,
        );

        first.rollback().await.unwrap();
        let retried = first.begin_transaction().await.unwrap();
        assert_eq!(first.transaction_id(), Some(retried));
        assert_eq!(first.commit().await.unwrap(), 0);
        assert_eq!(store.row_count("products"), 1);
    }

    #[tokio::test]
    async fn test_transaction_ids_are_unique_across_units_of_work() {
        let (_, factory) = memory_factory();
        let mut a = factory.open().await.unwrap();
        let mut b = factory.open().await.unwrap();

        let first = a.begin_transaction().await.unwrap();
        let second = b.begin_transaction().await.unwrap();

        assert_ne!(first, second);
    }
}

mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_save_keeps_changes_staged() {
        let (store, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        uow.repository::<Product>()
            .add(CatalogFixtures::widget())
            .unwrap();
        let result = uow.save_changes_with(&token).await;

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(store.row_count("products"), 0);
        assert_eq!(uow.save_changes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_commit_does_not_dispose() {
        let (_, factory) = memory_factory();
        let mut uow = factory.open().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = uow.commit_with(&token).await;

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert!(!uow.is_disposed());
    }

    #[tokio::test]
    async fn test_cancelled_statement() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = uow
            .execute_sql_interpolated_with(interpolated_sql!("DELETE FROM t WHERE id = {}", 1i64), &token)
            .await;

        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}

mod raw_sql_tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_rejects_raw_sql() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        let result = uow
            .execute_sql_raw("UPDATE products SET stock = ?", &[SqlValue::Integer(0)])
            .await;

        assert_store_error(result, |e| matches!(e, StoreError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_malformed_statements_fail_before_the_store() {
        let (_, factory) = memory_factory();
        let uow = factory.open().await.unwrap();

        assert_invalid_argument(uow.execute_sql_raw("   ", &[]).await);
        assert_invalid_argument(
            uow.execute_sql_interpolated(interpolated_sql!("SELECT {}, {}", 1i64))
                .await,
        );
    }
}

/// Wraps the memory store and parks every scan until released
#[derive(Debug, Clone)]
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Notify>,
}

#[async_trait]
impl DataStore for GatedStore {
    fn name(&self) -> &str {
        "gated"
    }

    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>> {
        Ok(Box::new(GatedSession {
            inner: self.inner.open_session().await?,
            gate: self.gate.clone(),
        }))
    }
}

struct GatedSession {
    inner: Box<dyn StoreSession>,
    gate: Arc<Notify>,
}

#[async_trait]
impl StoreSession for GatedSession {
    async fn scan<'a>(&'a mut self, collection: &'a str) -> StoreResult<QuerySource<'a, Row>> {
        self.gate.notified().await;
        self.inner.scan(collection).await
    }

    async fn find(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        self.inner.find(collection, key).await
    }

    async fn apply(&mut self, changes: &[RowChange]) -> StoreResult<u64> {
        self.inner.apply(changes).await
    }

    async fn begin(&mut self) -> StoreResult<()> {
        self.inner.begin().await
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.inner.rollback().await
    }

    async fn execute(&mut self, statement: &SqlStatement) -> StoreResult<u64> {
        self.inner.execute(statement).await
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        self.inner.close().await
    }
}

mod concurrency_tests {
    use super::*;

    #[tokio::test]
    async fn test_overlapping_operations_are_rejected() {
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: MemoryStore::new(),
            gate: gate.clone(),
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store), sample_model());
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let (listed, overlapping) = tokio::join!(products.get(None, None, ""), async {
            let result = products.count_long(Filter::all()).await;
            gate.notify_one();
            result
        });

        assert!(listed.unwrap().is_empty());
        assert!(matches!(overlapping, Err(CoreError::ConcurrentUse(_))));
    }

    #[tokio::test]
    async fn test_blocking_lookup_reports_a_busy_session() {
        let gate = Arc::new(Notify::new());
        let store = GatedStore {
            inner: MemoryStore::new(),
            gate: gate.clone(),
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store), sample_model());
        let uow = factory.open().await.unwrap();
        let products = uow.repository::<Product>();

        let (_, lookup) = tokio::join!(products.any(Filter::all()), async {
            let result = products.get_by_id(1i64);
            gate.notify_one();
            result
        });

        assert!(matches!(lookup, Err(CoreError::ConcurrentUse(_))));
    }

    #[tokio::test]
    async fn test_stores_without_blocking_lookups() {
        let store = GatedStore {
            inner: MemoryStore::new(),
            gate: Arc::new(Notify::new()),
        };
        let factory = UnitOfWorkFactory::new(Arc::new(store), sample_model());
        let uow = factory.open().await.unwrap();

        let result = uow.repository::<Product>().get_by_id(1i64);

        assert_store_error(result, |e| matches!(e, StoreError::Unsupported { .. }));
    }
}
