//! SQLite store
//!
//! Every collection lives in the `entity_rows` table as JSON bodies keyed by
//! `(collection, row_key)`. Keyless rows carry a NULL key. Store order is the
//! insertion sequence.

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::Sqlite;
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, info, instrument};

use core_kernel::{
    DataStore, QuerySource, Row, RowChange, RowKey, SqlStatement, SqlValue, StoreError,
    StoreResult, StoreSession,
};

use crate::error::DatabaseError;
use crate::pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};

const STORE_NAME: &str = "sqlite";

/// Store backed by a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DatabasePool,
}

impl SqliteStore {
    /// Creates the pool and applies pending migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;
        info!(url = %config.url, "SQLite store ready");
        Ok(Self { pool })
    }

    /// Wraps a pool whose schema is already migrated
    pub fn from_pool(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    fn name(&self) -> &str {
        STORE_NAME
    }

    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>> {
        Ok(Box::new(SqliteSession {
            pool: self.pool.clone(),
            transaction: None,
        }))
    }
}

/// Session over a [`SqliteStore`]
///
/// Statements run on the pool until a transaction is begun; from then on
/// they run on the transaction's connection.
#[derive(Debug)]
pub struct SqliteSession {
    pool: DatabasePool,
    transaction: Option<sqlx::Transaction<'static, Sqlite>>,
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn scan<'a>(&'a mut self, collection: &'a str) -> StoreResult<QuerySource<'a, Row>> {
        let query = sqlx::query_scalar::<_, String>(
            "SELECT body FROM entity_rows WHERE collection = ? ORDER BY seq",
        )
        .bind(collection);

        let bodies = match self.transaction.as_mut() {
            Some(tx) => query.fetch(&mut **tx),
            None => query.fetch(&self.pool),
        };
        let rows = bodies.map(|body: Result<String, sqlx::Error>| -> StoreResult<Row> {
            let body = body.map_err(DatabaseError::from)?;
            Ok(serde_json::from_str(&body)?)
        });
        Ok(QuerySource::Streaming(rows.boxed()))
    }

    async fn find(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        let query = sqlx::query_scalar::<_, String>(
            "SELECT body FROM entity_rows WHERE collection = ? AND row_key = ?",
        )
        .bind(collection)
        .bind(key.as_str());

        let body = match self.transaction.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
        .map_err(DatabaseError::from)?;

        Ok(body.map(|body| serde_json::from_str(&body)).transpose()?)
    }

    fn find_blocking(&mut self, _collection: &str, _key: &RowKey) -> StoreResult<Option<Row>> {
        Err(StoreError::unsupported(STORE_NAME, "blocking lookup"))
    }

    #[instrument(skip_all, fields(changes = changes.len()))]
    async fn apply(&mut self, changes: &[RowChange]) -> StoreResult<u64> {
        // Inside a transaction the batch runs in a savepoint so a failure
        // leaves earlier batches intact.
        let written = match self.transaction.as_mut() {
            Some(tx) => {
                let mut savepoint = Connection::begin(&mut **tx)
                    .await
                    .map_err(DatabaseError::from)?;
                let written = apply_changes(&mut savepoint, changes).await?;
                savepoint.commit().await.map_err(DatabaseError::from)?;
                written
            }
            None => {
                let mut tx = self.pool.begin().await.map_err(DatabaseError::from)?;
                let written = apply_changes(&mut tx, changes).await?;
                tx.commit().await.map_err(DatabaseError::from)?;
                written
            }
        };
        debug!(rows = written, "Batch applied");
        Ok(written)
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.transaction.is_some() {
            return Err(StoreError::transaction(
                "a transaction is already open on this session",
            ));
        }
        let tx = self.pool.begin().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("failed to begin transaction: {}", e))
        })?;
        self.transaction = Some(tx);
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::transaction("no transaction is open on this session"))?;
        tx.commit().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!("failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await.map_err(|e| {
                DatabaseError::TransactionFailed(format!("failed to roll back transaction: {}", e))
            })?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(sql = statement.sql()))]
    async fn execute(&mut self, statement: &SqlStatement) -> StoreResult<u64> {
        let mut query = sqlx::query(statement.sql());
        for param in statement.params() {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Bool(value) => query.bind(*value),
                SqlValue::Integer(value) => query.bind(*value),
                SqlValue::Real(value) => query.bind(*value),
                SqlValue::Text(value) => query.bind(value.as_str()),
                SqlValue::Json(value) => query.bind(value.to_string()),
            };
        }

        let result = match self.transaction.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        }
        .map_err(DatabaseError::from)?;
        Ok(result.rows_affected())
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        if let Some(tx) = this.transaction {
            tx.rollback().await.map_err(DatabaseError::from)?;
            debug!("Open transaction rolled back on close");
        }
        Ok(())
    }
}

async fn apply_changes(conn: &mut SqliteConnection, changes: &[RowChange]) -> StoreResult<u64> {
    let mut written = 0;
    for change in changes {
        written += match change {
            RowChange::Insert { collection, key, row } => {
                insert_row(conn, collection, key.as_ref(), row).await?
            }
            RowChange::Update { collection, key: Some(key), row } => {
                let result = sqlx::query(
                    "UPDATE entity_rows SET body = ? WHERE collection = ? AND row_key = ?",
                )
                .bind(serde_json::to_string(row)?)
                .bind(collection.as_str())
                .bind(key.as_str())
                .execute(&mut *conn)
                .await
                .map_err(DatabaseError::from)?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::concurrency(format!(
                        "update of {} in '{}' matched no row",
                        key, collection
                    )));
                }
                result.rows_affected()
            }
            RowChange::Update { collection, key: None, row } => {
                let body = serde_json::to_string(row)?;
                let existing: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM entity_rows WHERE collection = ? AND row_key IS NULL AND body = ?",
                )
                .bind(collection.as_str())
                .bind(body.as_str())
                .fetch_one(&mut *conn)
                .await
                .map_err(DatabaseError::from)?;
                if existing > 0 {
                    0
                } else {
                    insert_row(conn, collection, None, row).await?
                }
            }
            RowChange::Delete { collection, key } => {
                let result =
                    sqlx::query("DELETE FROM entity_rows WHERE collection = ? AND row_key = ?")
                        .bind(collection.as_str())
                        .bind(key.as_str())
                        .execute(&mut *conn)
                        .await
                        .map_err(DatabaseError::from)?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::concurrency(format!(
                        "delete of {} in '{}' matched no row",
                        key, collection
                    )));
                }
                result.rows_affected()
            }
        };
    }
    Ok(written)
}

async fn insert_row(
    conn: &mut SqliteConnection,
    collection: &str,
    key: Option<&RowKey>,
    row: &Row,
) -> StoreResult<u64> {
    let result = sqlx::query("INSERT INTO entity_rows (collection, row_key, body) VALUES (?, ?, ?)")
        .bind(collection)
        .bind(key.map(RowKey::as_str))
        .bind(serde_json::to_string(row)?)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => DatabaseError::duplicate(
                collection,
                key.map_or_else(|| "<none>".to_string(), RowKey::to_string),
            ),
            other => other,
        })?;
    Ok(result.rows_affected())
}
