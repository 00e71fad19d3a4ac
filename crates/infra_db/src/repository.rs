//! Generic repository
//!
//! One `Repository<T>` exists per entity type and unit of work. It stages
//! writes against the change tracker and composes [`Query`] views for reads;
//! nothing reaches the store until the owning unit of work saves.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use core_kernel::{CoreError, CoreResult, Entity, EntityState, Filter, IncludePaths, KeyValues, OrderBy};

use crate::context::StoreContext;
use crate::query::Query;

/// Per-entity-type facade over the shared store context
///
/// # Example
///
/// ```rust,ignore
/// let products = uow.repository::<Product>();
/// products.add(Product::new(1, "a"))?;
/// uow.save_changes().await?;
///
/// let cheap = products
///     .get(Some(Filter::new(|p: &Product| p.price < dec!(10))), None, "")
///     .await?;
/// ```
pub struct Repository<T: Entity> {
    context: Arc<StoreContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(context: Arc<StoreContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    fn query(&self) -> Query<T> {
        Query::new(self.context.clone(), true)
    }

    fn compose(
        &self,
        filter: Option<Filter<T>>,
        order_by: Option<OrderBy<T>>,
        include: IncludePaths,
    ) -> Query<T> {
        let mut query = self.query().include(include);
        if let Some(filter) = filter {
            query = query.filter_by(filter);
        }
        if let Some(order_by) = order_by {
            query = query.order_by(order_by);
        }
        query
    }

    /// Stages an entity for insertion
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IdentityConflict` if an entity with the same key is
    /// already tracked.
    pub fn add(&self, entity: T) -> CoreResult<()> {
        self.context.ensure_open()?;
        let row = self.context.to_row(&entity)?;
        let key = self.context.key_of::<T>(&row);
        self.context
            .tracker()
            .add(T::entity_name(), T::COLLECTION, key, row)
    }

    /// Stages several entities for insertion; none are staged on error
    pub fn add_range(&self, entities: impl IntoIterator<Item = T>) -> CoreResult<()> {
        self.context.ensure_open()?;
        let rows = entities
            .into_iter()
            .map(|entity| {
                let row = self.context.to_row(&entity)?;
                Ok((self.context.key_of::<T>(&row), row))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        self.context
            .tracker()
            .add_all(T::entity_name(), T::COLLECTION, rows)
    }

    /// Stages an entity for removal, attaching it first if it is detached
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` if the entity has no resolvable
    /// key, since the store could not identify the row.
    pub fn delete(&self, entity: &T) -> CoreResult<()> {
        self.context.ensure_open()?;
        let row = self.context.to_row(entity)?;
        let key = self.context.key_of::<T>(&row).ok_or_else(|| {
            CoreError::invalid_argument(format!(
                "{} has no resolvable key and cannot be deleted",
                T::entity_name()
            ))
        })?;
        self.context.tracker().remove(T::COLLECTION, key, row);
        Ok(())
    }

    /// Looks the entity up by key and stages its removal; a missing key is a
    /// no-op
    pub async fn delete_by_id(&self, id: impl Into<KeyValues>) -> CoreResult<()> {
        let id = id.into();
        let Some(key) = self.context.lookup_key::<T>(&id)? else {
            return Ok(());
        };
        let tracked = self.context.tracker().lookup(T::COLLECTION, &key);
        let row = match tracked {
            Some(row) => Some(row),
            None => self.context.find_row(T::COLLECTION, &key).await?,
        };
        match row {
            Some(row) => {
                self.context.tracker().remove(T::COLLECTION, key, row);
            }
            None => debug!(entity = T::entity_name(), key = %id, "Nothing to delete"),
        }
        Ok(())
    }

    /// Identity lookup without suspending
    ///
    /// Tracked entities are returned from memory; otherwise the store's
    /// blocking lookup is used and a hit is tracked. Key values must follow
    /// the declared key order. A value count that differs from the key yields
    /// `None`.
    ///
    /// # Errors
    ///
    /// Fails with a store `Unsupported` error if the store only offers
    /// asynchronous lookups, and with `CoreError::ConcurrentUse` if another
    /// operation holds the session.
    pub fn get_by_id(&self, id: impl Into<KeyValues>) -> CoreResult<Option<T>> {
        let Some(key) = self.context.lookup_key::<T>(&id.into())? else {
            return Ok(None);
        };
        if let Some(found) = self.tracked(&key)? {
            return Ok(found);
        }
        let row = self.context.find_row_blocking(T::COLLECTION, &key)?;
        self.track_found(row)
    }

    /// Identity lookup; same semantics as [`get_by_id`](Self::get_by_id)
    pub async fn get_by_id_async(&self, id: impl Into<KeyValues>) -> CoreResult<Option<T>> {
        let Some(key) = self.context.lookup_key::<T>(&id.into())? else {
            return Ok(None);
        };
        if let Some(found) = self.tracked(&key)? {
            return Ok(found);
        }
        let row = self.context.find_row(T::COLLECTION, &key).await?;
        self.track_found(row)
    }

    /// `Some(result)` when the tracker alone decides the lookup
    fn tracked(&self, key: &core_kernel::RowKey) -> CoreResult<Option<Option<T>>> {
        self.context.ensure_open()?;
        let tracker = self.context.tracker();
        match tracker.state(T::COLLECTION, key) {
            EntityState::Detached => Ok(None),
            EntityState::Deleted => Ok(Some(None)),
            _ => match tracker.lookup(T::COLLECTION, key) {
                Some(row) => Ok(Some(Some(self.context.decode(row)?))),
                None => Ok(Some(None)),
            },
        }
    }

    fn track_found(&self, row: Option<core_kernel::Row>) -> CoreResult<Option<T>> {
        row.and_then(|row| self.context.resolve_tracked::<T>(row))
            .map(|row| self.context.decode(row))
            .transpose()
    }

    /// Entities matching `filter` (all if `None`), eager-loading `include`,
    /// in `order_by` order or store order
    pub async fn get(
        &self,
        filter: Option<Filter<T>>,
        order_by: Option<OrderBy<T>>,
        include: impl Into<IncludePaths>,
    ) -> CoreResult<Vec<T>> {
        self.compose(filter, order_by, include.into()).to_list().await
    }

    /// Like [`get`](Self::get), projecting each result through `selector`
    ///
    /// The filtered and ordered result set is computed first, then mapped.
    pub async fn get_projected<R>(
        &self,
        filter: Option<Filter<T>>,
        selector: impl Fn(&T) -> R,
        order_by: Option<OrderBy<T>>,
        include: impl Into<IncludePaths>,
    ) -> CoreResult<Vec<R>> {
        self.compose(filter, order_by, include.into())
            .select(selector)
            .to_list()
            .await
    }

    /// First entity matching `filter`, or `None`
    pub async fn first_or_default(
        &self,
        filter: Filter<T>,
        include: impl Into<IncludePaths>,
    ) -> CoreResult<Option<T>> {
        self.compose(Some(filter), None, include.into())
            .first_or_default()
            .await
    }

    /// First entity matching `filter`, projected, or `None`
    pub async fn first_or_default_projected<R>(
        &self,
        filter: Filter<T>,
        selector: impl Fn(&T) -> R,
        include: impl Into<IncludePaths>,
    ) -> CoreResult<Option<R>> {
        self.compose(Some(filter), None, include.into())
            .select(selector)
            .first_or_default()
            .await
    }

    /// True iff at least one entity matches
    pub async fn any(&self, filter: Filter<T>) -> CoreResult<bool> {
        self.query().filter_by(filter).any().await
    }

    /// Number of matches; `CoreError::Overflow` beyond `i32`
    pub async fn count(&self, filter: Filter<T>) -> CoreResult<i32> {
        self.query().filter_by(filter).count().await
    }

    pub async fn count_long(&self, filter: Filter<T>) -> CoreResult<i64> {
        self.query().filter_by(filter).long_count().await
    }

    /// Largest projected value over all entities
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptySequence` for an empty collection.
    pub async fn max<R: PartialOrd>(&self, selector: impl Fn(&T) -> R) -> CoreResult<R> {
        self.query().max(selector).await
    }

    /// Largest projected value over the entities matching `filter`
    pub async fn max_filtered<R: PartialOrd>(
        &self,
        filter: Filter<T>,
        selector: impl Fn(&T) -> R,
    ) -> CoreResult<R> {
        self.query().filter_by(filter).max(selector).await
    }

    /// Marks an entity as modified, attaching it if it is detached
    pub fn update(&self, entity: T) -> CoreResult<()> {
        self.context.ensure_open()?;
        let row = self.context.to_row(&entity)?;
        let key = self.context.key_of::<T>(&row);
        self.context.tracker().update(T::COLLECTION, key, row);
        Ok(())
    }

    /// Merges a detached entity into the unit of work
    ///
    /// - key already tracked: no-op, the tracked values win
    /// - key resolvable: the stored row is loaded and every non-navigation
    ///   field of `entity` is copied onto it
    /// - no resolvable key: the entity is attached as fully modified
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the key resolves but no row exists.
    #[instrument(skip(self, entity), fields(entity = T::entity_name()))]
    pub async fn update_if_not_tracked(&self, entity: T) -> CoreResult<()> {
        self.context.ensure_open()?;
        let row = core_kernel::entity::to_object(&entity)?;

        match self.context.key_of::<T>(&row) {
            Some(key) => {
                if self.context.tracker().is_tracked(T::COLLECTION, &key) {
                    debug!(%key, "Already tracked; keeping tracked values");
                    return Ok(());
                }
                let stored = self
                    .context
                    .find_row(T::COLLECTION, &key)
                    .await?
                    .ok_or_else(|| CoreError::not_found(T::entity_name(), &key))?;

                let navigations: Vec<&str> = self
                    .context
                    .entity_model::<T>()
                    .map(|m| m.navigations.iter().map(|n| n.name.as_str()).collect())
                    .unwrap_or_default();
                let mut tracker = self.context.tracker();
                tracker.track_loaded(T::COLLECTION, key.clone(), stored);
                tracker.merge(T::COLLECTION, &key, row, &navigations);
                debug!(%key, state = ?tracker.state(T::COLLECTION, &key), "Merged onto stored row");
            }
            None => {
                warn!("No resolvable key; attaching the entity as fully modified");
                let row = self.context.to_row(&entity)?;
                self.context.tracker().attach_keyless_modified(T::COLLECTION, row);
            }
        }
        Ok(())
    }

    /// Change-tracking state of `entity`, matched by key
    pub fn state(&self, entity: &T) -> CoreResult<EntityState> {
        self.context.ensure_open()?;
        let row = self.context.to_row(entity)?;
        let tracker = self.context.tracker();
        Ok(match self.context.key_of::<T>(&row) {
            Some(key) => tracker.state(T::COLLECTION, &key),
            None => tracker.keyless_state(T::COLLECTION, &row),
        })
    }
}

impl<T: Entity> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::entity_name())
            .field("context", &self.context)
            .finish()
    }
}
