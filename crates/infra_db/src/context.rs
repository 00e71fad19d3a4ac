//! Store context shared by a unit of work and its repositories
//!
//! Owns the store session, the change tracker and the model. Repositories and
//! query views hold an `Arc<StoreContext>`; the unit of work disposes it on
//! commit, after which every operation fails with `CoreError::Disposed`.
//!
//! The session sits behind an async mutex that is only ever `try_lock`ed: a
//! unit of work has a single logical owner, so finding the session busy means
//! two operations overlapped and is reported as `CoreError::ConcurrentUse`.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, instrument};

use core_kernel::entity::{from_object, to_object};
use core_kernel::model::read_fields;
use core_kernel::{
    CoreError, CoreResult, Entity, EntityModel, IncludePaths, KeyValues, Model, NavigationKind,
    Row, RowKey, StoreResult, StoreSession, UnitOfWorkId,
};

use crate::executor::{first_matching_async_safe, to_list_async_safe};
use crate::tracker::ChangeTracker;

pub(crate) type SessionGuard<'a> = MappedMutexGuard<'a, dyn StoreSession>;

/// Validated include paths, merged by shared prefix
#[derive(Debug, Default)]
pub(crate) struct IncludeTree {
    nodes: IndexMap<String, IncludeNode>,
}

#[derive(Debug)]
struct IncludeNode {
    target: String,
    children: IncludeTree,
}

impl IncludeTree {
    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn collect_targets(&self, targets: &mut Vec<String>) {
        for node in self.nodes.values() {
            if !targets.contains(&node.target) {
                targets.push(node.target.clone());
            }
            node.children.collect_targets(targets);
        }
    }
}

/// Rows of every collection an include tree reaches
pub(crate) type RelatedRows = HashMap<String, Vec<Row>>;

pub struct StoreContext {
    id: UnitOfWorkId,
    store_name: String,
    model: Arc<Model>,
    session: Mutex<Option<Box<dyn StoreSession>>>,
    tracker: parking_lot::Mutex<ChangeTracker>,
    disposed: AtomicBool,
}

impl StoreContext {
    pub(crate) fn new(
        id: UnitOfWorkId,
        store_name: impl Into<String>,
        model: Arc<Model>,
        session: Box<dyn StoreSession>,
    ) -> Self {
        Self {
            id,
            store_name: store_name.into(),
            model,
            session: Mutex::new(Some(session)),
            tracker: parking_lot::Mutex::new(ChangeTracker::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.is_disposed() {
            return Err(CoreError::Disposed);
        }
        Ok(())
    }

    pub(crate) fn tracker(&self) -> parking_lot::MutexGuard<'_, ChangeTracker> {
        self.tracker.lock()
    }

    /// Borrows the session for one operation
    pub(crate) fn session(&self) -> CoreResult<SessionGuard<'_>> {
        self.ensure_open()?;
        let guard = self.session.try_lock().map_err(|_| {
            CoreError::concurrent_use("the store session is in use by another operation")
        })?;
        MutexGuard::try_map(guard, |slot| slot.as_deref_mut()).map_err(|_| CoreError::Disposed)
    }

    /// Closes the session and marks the context disposed
    #[instrument(skip(self), fields(unit_of_work = %self.id))]
    pub(crate) async fn dispose(&self) -> CoreResult<()> {
        let session = self
            .session
            .try_lock()
            .map_err(|_| CoreError::concurrent_use("cannot dispose while an operation is running"))?
            .take();
        self.disposed.store(true, Ordering::Release);
        self.tracker.lock().clear();
        if let Some(session) = session {
            session.close().await?;
        }
        debug!("Store context disposed");
        Ok(())
    }

    pub(crate) fn entity_model<T: Entity>(&self) -> Option<&EntityModel> {
        self.model.entity::<T>()
    }

    /// Serializes an entity into the row written to the store
    pub(crate) fn to_row<T: Entity>(&self, entity: &T) -> CoreResult<Row> {
        let mut row = to_object(entity)?;
        if let Some(model) = self.entity_model::<T>() {
            model.strip_navigations(&mut row);
        }
        Ok(row)
    }

    /// Resolves the key of a row, if the type exposes one
    pub(crate) fn key_of<T: Entity>(&self, row: &Value) -> Option<RowKey> {
        self.entity_model::<T>().and_then(|m| m.row_key(row))
    }

    /// Turns caller-supplied key values into a row key
    ///
    /// Returns `Ok(None)` when the number of values does not match the
    /// declared key, so such lookups find nothing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Disposed` after commit, and
    /// `CoreError::InvalidArgument` for an empty or null key or a type without
    /// key metadata.
    pub(crate) fn lookup_key<T: Entity>(&self, key: &KeyValues) -> CoreResult<Option<RowKey>> {
        self.ensure_open()?;
        if key.is_empty() || key.has_null() {
            return Err(CoreError::invalid_argument(format!(
                "key values for {} must not be empty or null",
                T::entity_name()
            )));
        }
        let fields = self.model.primary_key::<T>().ok_or_else(|| {
            CoreError::invalid_argument(format!("{} has no key metadata", T::entity_name()))
        })?;
        if fields.len() != key.len() {
            debug!(
                entity = T::entity_name(),
                expected = fields.len(),
                supplied = key.len(),
                "Key arity mismatch"
            );
            return Ok(None);
        }
        Ok(Some(key.to_row_key()))
    }

    pub(crate) fn decode<T: Entity>(&self, row: Row) -> CoreResult<T> {
        from_object(row)
    }

    /// Reads every row of a collection in store order
    #[instrument(skip(self), fields(unit_of_work = %self.id))]
    pub(crate) async fn scan_rows(&self, collection: &str) -> CoreResult<Vec<Row>> {
        let mut session = self.session()?;
        let source = session.scan(collection).await?;
        let rows = to_list_async_safe(source).await?;
        debug!(rows = rows.len(), "Collection scanned");
        Ok(rows)
    }

    /// Returns the first row accepted by `predicate`, pulling no further
    pub(crate) async fn first_row_matching<F>(
        &self,
        collection: &str,
        predicate: F,
    ) -> CoreResult<Option<Row>>
    where
        F: FnMut(&Row) -> StoreResult<bool> + Send,
    {
        let mut session = self.session()?;
        let source = session.scan(collection).await?;
        Ok(first_matching_async_safe(source, predicate).await?)
    }

    pub(crate) async fn find_row(&self, collection: &str, key: &RowKey) -> CoreResult<Option<Row>> {
        let mut session = self.session()?;
        Ok(session.find(collection, key).await?)
    }

    pub(crate) fn find_row_blocking(&self, collection: &str, key: &RowKey) -> CoreResult<Option<Row>> {
        let mut session = self.session()?;
        Ok(session.find_blocking(collection, key)?)
    }

    /// Tracks a row read from the store and returns the values to hand out
    ///
    /// Keyless rows are returned untracked. `None` means the key is tracked
    /// as deleted.
    pub(crate) fn resolve_tracked<T: Entity>(&self, row: Row) -> Option<Row> {
        match self.key_of::<T>(&row) {
            Some(key) => self.tracker().track_loaded(T::COLLECTION, key, row),
            None => Some(row),
        }
    }

    /// Validates include paths against the model before any I/O
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` for an unknown navigation, a
    /// navigation whose target collection is not registered, or an entity
    /// type that is not registered at all.
    pub(crate) fn include_tree<T: Entity>(&self, paths: &IncludePaths) -> CoreResult<IncludeTree> {
        let mut tree = IncludeTree::default();
        if paths.is_empty() {
            return Ok(tree);
        }
        let root = self.entity_model::<T>().ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "cannot include '{}': {} is not registered in the model",
                paths,
                T::entity_name()
            ))
        })?;

        for path in paths.iter() {
            let mut owner = root;
            let mut level = &mut tree;
            for segment in path.segments() {
                let navigation = owner.navigation(segment).ok_or_else(|| {
                    CoreError::invalid_argument(format!(
                        "{} has no navigation named '{}' (include '{}')",
                        owner.entity_name, segment, path
                    ))
                })?;
                let target = self.model.by_collection(&navigation.target).ok_or_else(|| {
                    CoreError::invalid_argument(format!(
                        "navigation '{}' targets unregistered collection '{}'",
                        segment, navigation.target
                    ))
                })?;
                let joinable = match navigation.kind {
                    NavigationKind::Reference => target.has_key(),
                    NavigationKind::Collection => owner.has_key(),
                };
                if !joinable {
                    return Err(CoreError::invalid_argument(format!(
                        "navigation '{}' cannot be loaded without key metadata",
                        segment
                    )));
                }

                let node = level
                    .nodes
                    .entry(segment.clone())
                    .or_insert_with(|| IncludeNode {
                        target: navigation.target.clone(),
                        children: IncludeTree::default(),
                    });
                level = &mut node.children;
                owner = target;
            }
        }
        Ok(tree)
    }

    /// Scans every collection the include tree reaches, once each
    pub(crate) async fn load_related(&self, tree: &IncludeTree) -> CoreResult<RelatedRows> {
        let mut targets = Vec::new();
        tree.collect_targets(&mut targets);

        let mut related = RelatedRows::new();
        for target in targets {
            let rows = self.scan_rows(&target).await?;
            related.insert(target, rows);
        }
        Ok(related)
    }

    /// Joins related rows onto `row` in memory
    pub(crate) fn attach_related<T: Entity>(
        &self,
        row: &mut Row,
        tree: &IncludeTree,
        related: &RelatedRows,
    ) {
        if let Some(owner) = self.entity_model::<T>() {
            self.attach_level(owner, row, tree, related);
        }
    }

    fn attach_level(&self, owner: &EntityModel, row: &mut Row, tree: &IncludeTree, related: &RelatedRows) {
        for (name, node) in &tree.nodes {
            let (Some(navigation), Some(target)) =
                (owner.navigation(name), self.model.by_collection(&node.target))
            else {
                continue;
            };
            let candidates = related.get(&node.target).map(Vec::as_slice).unwrap_or(&[]);
            let load = |candidate: &Row| {
                let mut candidate = candidate.clone();
                self.attach_level(target, &mut candidate, &node.children, related);
                candidate
            };

            let value = match navigation.kind {
                NavigationKind::Reference => read_fields(row, &navigation.foreign_key)
                    .and_then(|fk| {
                        candidates
                            .iter()
                            .find(|c| read_fields(c, &target.key).as_ref() == Some(&fk))
                    })
                    .map_or(Value::Null, &load),
                NavigationKind::Collection => Value::Array(
                    read_fields(row, &owner.key)
                        .map(|own| {
                            candidates
                                .iter()
                                .filter(|c| read_fields(c, &navigation.foreign_key).as_ref() == Some(&own))
                                .map(&load)
                                .collect()
                        })
                        .unwrap_or_default(),
                ),
            };

            if let Value::Object(map) = row {
                map.insert(name.clone(), value);
            }
        }
    }
}

impl std::fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("id", &self.id)
            .field("store", &self.store_name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
