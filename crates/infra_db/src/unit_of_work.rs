//! Unit of work
//!
//! A `UnitOfWork` owns one store session, the change tracker behind it and at
//! most one transaction. It hands out one cached [`Repository`] per entity
//! type, persists everything staged through them in a single batch, and
//! drives commit and rollback.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► repository::<T>() / query::<T>() ──► save_changes ──► commit
//!   │                 │                              │              │
//!   │          stage adds/updates/deletes      one atomic batch   save, commit
//!   │                                                             transaction,
//!   └── begin_transaction (idempotent) ── rollback                close session
//! ```
//!
//! After a successful commit the unit of work and every repository it handed
//! out fail with `CoreError::Disposed`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    CoreError, CoreResult, DataStore, Entity, InterpolatedSql, Model, SqlStatement, SqlValue,
    TransactionId, TypeRegistry, UnitOfWorkId,
};

use crate::context::StoreContext;
use crate::query::Query;
use crate::repository::Repository;

/// Handle of the active transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TransactionId,
    started_at: DateTime<Utc>,
}

impl Transaction {
    fn start() -> Self {
        Self {
            id: TransactionId::new_v7(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Coordinates repositories, the change tracker and one transaction
///
/// Not meant for concurrent use: overlapping operations fail with
/// `CoreError::ConcurrentUse` instead of interleaving.
pub struct UnitOfWork {
    context: Arc<StoreContext>,
    repositories: parking_lot::Mutex<TypeRegistry>,
    transaction: Option<Transaction>,
}

impl UnitOfWork {
    /// Opens a unit of work over a fresh store session
    #[instrument(skip(store, model), fields(store = store.name()))]
    pub async fn open(store: Arc<dyn DataStore>, model: Arc<Model>) -> CoreResult<Self> {
        let session = store.open_session().await?;
        let id = UnitOfWorkId::new();
        info!(unit_of_work = %id, "Unit of work opened");
        Ok(Self {
            context: Arc::new(StoreContext::new(id, store.name(), model, session)),
            repositories: parking_lot::Mutex::new(TypeRegistry::new()),
            transaction: None,
        })
    }

    pub fn id(&self) -> UnitOfWorkId {
        self.context.id()
    }

    pub fn model(&self) -> &Model {
        self.context.model()
    }

    /// Returns true once the unit of work has been committed
    pub fn is_disposed(&self) -> bool {
        self.context.is_disposed()
    }

    /// Tracked query over the whole collection of `T`
    pub fn query<T: Entity>(&self) -> Query<T> {
        Query::new(self.context.clone(), true)
    }

    /// Untracked query over the whole collection of `T`
    ///
    /// Results are detached: changing them and saving has no effect.
    pub fn query_no_tracking<T: Entity>(&self) -> Query<T> {
        Query::new(self.context.clone(), false)
    }

    /// The repository for `T`, created on first request and cached after
    pub fn repository<T: Entity>(&self) -> Arc<Repository<T>> {
        self.repositories
            .lock()
            .get_or_insert_with(|| Repository::<T>::new(self.context.clone()))
    }

    /// Returns true if a transaction is active
    pub fn has_active_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Id of the active transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction.as_ref().map(Transaction::id)
    }

    /// The active transaction, if any
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Starts a transaction unless one is already active
    #[instrument(skip(self), fields(unit_of_work = %self.id()))]
    pub async fn begin_transaction(&mut self) -> CoreResult<TransactionId> {
        if let Some(active) = &self.transaction {
            debug!(transaction = %active.id, "Transaction already active");
            return Ok(active.id);
        }
        self.context.session()?.begin().await?;
        let transaction = Transaction::start();
        let id = transaction.id;
        self.transaction = Some(transaction);
        info!(transaction = %id, "Transaction started");
        Ok(id)
    }

    /// Rolls back the active transaction and discards all tracked changes
    ///
    /// No-op without an active transaction.
    #[instrument(skip(self), fields(unit_of_work = %self.id()))]
    pub async fn rollback(&mut self) -> CoreResult<()> {
        let Some(transaction) = &self.transaction else {
            debug!("No active transaction to roll back");
            return Ok(());
        };
        let id = transaction.id;
        self.context.session()?.rollback().await?;
        self.transaction = None;
        self.context.tracker().clear();
        info!(transaction = %id, "Transaction rolled back");
        Ok(())
    }

    /// Persists every staged change in one atomic batch
    ///
    /// Returns the number of rows written. An active transaction stays open.
    pub async fn save_changes(&self) -> CoreResult<u64> {
        self.save_changes_with(&CancellationToken::new()).await
    }

    /// [`save_changes`](Self::save_changes) with cooperative cancellation
    ///
    /// A cancelled call returns `CoreError::Cancelled` and leaves the tracked
    /// changes staged.
    #[instrument(skip(self, cancel), fields(unit_of_work = %self.id()))]
    pub async fn save_changes_with(&self, cancel: &CancellationToken) -> CoreResult<u64> {
        self.context.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let changes = self.context.tracker().detect_changes();
        if changes.is_empty() {
            debug!("No changes to save");
            return Ok(0);
        }

        let written = {
            let mut session = self.context.session()?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Save cancelled");
                    return Err(CoreError::Cancelled);
                }
                result = session.apply(&changes) => result?,
            }
        };

        self.context.tracker().accept_changes();
        info!(changes = changes.len(), rows = written, "Changes saved");
        Ok(written)
    }

    /// Saves, commits the active transaction and disposes the unit of work
    pub async fn commit(&mut self) -> CoreResult<u64> {
        self.commit_with(&CancellationToken::new()).await
    }

    /// [`commit`](Self::commit) with cooperative cancellation
    ///
    /// If saving or committing fails nothing is disposed, so the caller can
    /// still roll back. A commit the store rejects also ends the transaction
    /// and clears the tracker, as a rollback would.
    #[instrument(skip(self, cancel), fields(unit_of_work = %self.id()))]
    pub async fn commit_with(&mut self, cancel: &CancellationToken) -> CoreResult<u64> {
        let written = self.save_changes_with(cancel).await?;

        if let Some(transaction) = &self.transaction {
            let id = transaction.id;
            let mut session = self.context.session()?;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                result = session.commit() => result,
            };
            drop(session);
            if let Err(e) = result {
                // The store has discarded its side of the transaction
                self.transaction = None;
                self.context.tracker().clear();
                warn!(transaction = %id, error = %e, "Transaction commit failed");
                return Err(e.into());
            }
            self.transaction = None;
            info!(transaction = %id, "Transaction committed");
        }

        self.context.dispose().await?;
        self.repositories.lock().clear();
        info!("Unit of work committed");
        Ok(written)
    }

    /// Executes a statement with `?` placeholders
    ///
    /// Bypasses the change tracker. Returns the number of affected rows.
    pub async fn execute_sql_raw(&self, sql: &str, params: &[SqlValue]) -> CoreResult<u64> {
        let statement = SqlStatement::new(sql, params.to_vec())?;
        self.execute(&statement, &CancellationToken::new()).await
    }

    /// Executes an interpolated statement; every hole is a bound parameter
    pub async fn execute_sql_interpolated(&self, sql: InterpolatedSql) -> CoreResult<u64> {
        self.execute_sql_interpolated_with(sql, &CancellationToken::new())
            .await
    }

    /// [`execute_sql_interpolated`](Self::execute_sql_interpolated) with
    /// cooperative cancellation
    pub async fn execute_sql_interpolated_with(
        &self,
        sql: InterpolatedSql,
        cancel: &CancellationToken,
    ) -> CoreResult<u64> {
        let statement = sql.into_statement()?;
        self.execute(&statement, cancel).await
    }

    #[instrument(skip(self, statement, cancel), fields(unit_of_work = %self.id(), sql = statement.sql()))]
    async fn execute(&self, statement: &SqlStatement, cancel: &CancellationToken) -> CoreResult<u64> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let mut session = self.context.session()?;
        let affected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            result = session.execute(statement) => result?,
        };
        debug!(rows = affected, "Statement executed");
        Ok(affected)
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("context", &self.context)
            .field("repositories", &*self.repositories.lock())
            .field("transaction", &self.transaction)
            .finish()
    }
}

/// Opens units of work over one store and one shared model
#[derive(Debug, Clone)]
pub struct UnitOfWorkFactory {
    store: Arc<dyn DataStore>,
    model: Arc<Model>,
}

impl UnitOfWorkFactory {
    pub fn new(store: Arc<dyn DataStore>, model: Model) -> Self {
        Self {
            store,
            model: Arc::new(model),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub async fn open(&self) -> CoreResult<UnitOfWork> {
        UnitOfWork::open(self.store.clone(), self.model.clone()).await
    }
}
