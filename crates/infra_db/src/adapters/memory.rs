//! In-process store
//!
//! Keeps every collection in memory, in insertion order. Sessions share the
//! store's tables; a transaction works on a private copy and replays its
//! batches onto the shared tables when it commits.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use core_kernel::{
    DataStore, QuerySource, Row, RowChange, RowKey, SqlStatement, StoreError, StoreResult,
    StoreSession,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Keyed(RowKey),
    Keyless(u64),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    collections: HashMap<String, IndexMap<Slot, Row>>,
    next_keyless: u64,
}

impl Tables {
    fn rows(&self, collection: &str) -> Vec<Row> {
        self.collections
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn find(&self, collection: &str, key: &RowKey) -> Option<Row> {
        self.collections
            .get(collection)
            .and_then(|rows| rows.get(&Slot::Keyed(key.clone())))
            .cloned()
    }

    /// Applies a batch to a copy and swaps it in only if every change applies
    fn apply(&mut self, changes: &[RowChange]) -> StoreResult<u64> {
        let mut staged = self.clone();
        let mut written = 0;
        for change in changes {
            written += staged.apply_one(change)?;
        }
        *self = staged;
        Ok(written)
    }

    fn apply_one(&mut self, change: &RowChange) -> StoreResult<u64> {
        let rows = self
            .collections
            .entry(change.collection().to_string())
            .or_default();

        match change {
            RowChange::Insert { collection, key: Some(key), row } => {
                let slot = Slot::Keyed(key.clone());
                if rows.contains_key(&slot) {
                    return Err(StoreError::conflict(format!(
                        "row with key {} already exists in '{}'",
                        key, collection
                    )));
                }
                rows.insert(slot, row.clone());
                Ok(1)
            }
            RowChange::Update { collection, key: Some(key), row } => {
                match rows.get_mut(&Slot::Keyed(key.clone())) {
                    Some(existing) => {
                        *existing = row.clone();
                        Ok(1)
                    }
                    None => Err(StoreError::concurrency(format!(
                        "update of {} in '{}' matched no row",
                        key, collection
                    ))),
                }
            }
            RowChange::Update { key: None, row, .. } if rows.values().any(|r| r == row) => Ok(0),
            RowChange::Insert { key: None, row, .. } | RowChange::Update { key: None, row, .. } => {
                rows.insert(Slot::Keyless(self.next_keyless), row.clone());
                self.next_keyless += 1;
                Ok(1)
            }
            RowChange::Delete { collection, key } => {
                match rows.shift_remove(&Slot::Keyed(key.clone())) {
                    Some(_) => Ok(1),
                    None => Err(StoreError::concurrency(format!(
                        "delete of {} in '{}' matched no row",
                        key, collection
                    ))),
                }
            }
        }
    }
}

/// Shared in-memory store; clones share the same tables
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    tables: Arc<Mutex<Tables>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }

    /// Snapshot of the committed rows of a collection, in store order
    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.tables.lock().rows(collection)
    }

    /// Number of committed rows in a collection
    pub fn row_count(&self, collection: &str) -> usize {
        self.tables
            .lock()
            .collections
            .get(collection)
            .map_or(0, IndexMap::len)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_session(&self) -> StoreResult<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
            transaction: None,
        }))
    }
}

#[derive(Debug)]
struct MemoryTransaction {
    working: Tables,
    log: Vec<RowChange>,
}

/// Session over a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    transaction: Option<MemoryTransaction>,
}

impl MemorySession {
    fn lookup(&self, collection: &str, key: &RowKey) -> Option<Row> {
        match &self.transaction {
            Some(tx) => tx.working.find(collection, key),
            None => self.store.tables.lock().find(collection, key),
        }
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn scan<'a>(&'a mut self, collection: &'a str) -> StoreResult<QuerySource<'a, Row>> {
        let rows = match &self.transaction {
            Some(tx) => tx.working.rows(collection),
            None => self.store.tables.lock().rows(collection),
        };
        Ok(QuerySource::buffered(rows))
    }

    async fn find(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        Ok(self.lookup(collection, key))
    }

    fn find_blocking(&mut self, collection: &str, key: &RowKey) -> StoreResult<Option<Row>> {
        Ok(self.lookup(collection, key))
    }

    async fn apply(&mut self, changes: &[RowChange]) -> StoreResult<u64> {
        let written = match &mut self.transaction {
            Some(tx) => {
                let written = tx.working.apply(changes)?;
                tx.log.extend_from_slice(changes);
                written
            }
            None => self.store.tables.lock().apply(changes)?,
        };
        debug!(store = %self.store.name, changes = changes.len(), rows = written, "Batch applied");
        Ok(written)
    }

    async fn begin(&mut self) -> StoreResult<()> {
        if self.transaction.is_some() {
            return Err(StoreError::transaction("a transaction is already open on this session"));
        }
        let working = self.store.tables.lock().clone();
        self.transaction = Some(MemoryTransaction {
            working,
            log: Vec::new(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| StoreError::transaction("no transaction is open on this session"))?;
        self.store.tables.lock().apply(&tx.log)?;
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.transaction = None;
        Ok(())
    }

    async fn execute(&mut self, _statement: &SqlStatement) -> StoreResult<u64> {
        Err(StoreError::unsupported(self.store.name.clone(), "raw SQL"))
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
