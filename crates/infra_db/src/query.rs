//! Composable query views
//!
//! A [`Query`] is built up from filters, include paths, ordering and paging,
//! and executed by one of its terminal operations. Filtering, ordering and
//! paging run over the values stored in the collection; tracked queries then
//! resolve each result against the change tracker, so an entity that is
//! already tracked comes back with its tracked values.

use std::marker::PhantomData;
use std::sync::Arc;

use core_kernel::{CoreError, CoreResult, Entity, EntityState, Filter, IncludePaths, OrderBy, Row};

use crate::context::{IncludeTree, RelatedRows, StoreContext};

/// A composable query over one entity collection
pub struct Query<T: Entity> {
    context: Arc<StoreContext>,
    filter: Option<Filter<T>>,
    order: Option<OrderBy<T>>,
    include: IncludePaths,
    skip: usize,
    take: Option<usize>,
    tracking: bool,
}

impl<T: Entity> Query<T> {
    pub(crate) fn new(context: Arc<StoreContext>, tracking: bool) -> Self {
        Self {
            context,
            filter: None,
            order: None,
            include: IncludePaths::none(),
            skip: 0,
            take: None,
            tracking,
        }
    }

    /// Keeps entities matching `predicate`; repeated calls combine with AND
    pub fn filter(self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter_by(Filter::new(predicate))
    }

    /// Keeps entities matching `filter`; repeated calls combine with AND
    pub fn filter_by(mut self, filter: Filter<T>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Requests eager loading of related data
    pub fn include(mut self, paths: impl Into<IncludePaths>) -> Self {
        self.include = std::mem::take(&mut self.include).merge(paths.into());
        self
    }

    /// Orders the results; replaces any earlier ordering
    pub fn order_by(mut self, order: OrderBy<T>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Results are not registered with the change tracker
    pub fn as_no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Projects each result through `selector` after filtering and ordering
    pub fn select<R, F>(self, selector: F) -> Projection<T, R, F>
    where
        F: Fn(&T) -> R,
    {
        Projection {
            query: self,
            selector,
            _result: PhantomData,
        }
    }

    /// Materializes every result
    pub async fn to_list(&self) -> CoreResult<Vec<T>> {
        let includes = self.context.include_tree::<T>(&self.include)?;
        let window = self.stored_window(self.tracking).await?;
        let related = self.related(&includes).await?;

        let mut results = Vec::with_capacity(window.len());
        for (_, row) in window {
            if let Some(entity) = self.materialize(row, &includes, &related)? {
                results.push(entity);
            }
        }
        Ok(results)
    }

    /// Returns the first result, or `None`
    ///
    /// Without ordering or skipping the collection is scanned only until the
    /// first match.
    pub async fn first_or_default(&self) -> CoreResult<Option<T>> {
        if self.order.is_some() || self.skip > 0 || self.take == Some(0) {
            let mut first = self.clone().take(1).to_list().await?;
            return Ok(first.pop());
        }

        let includes = self.context.include_tree::<T>(&self.include)?;
        let context = self.context.clone();
        let filter = self.filter.clone();
        let tracking = self.tracking;
        let row = self
            .context
            .first_row_matching(T::COLLECTION, move |row| {
                if tracking {
                    if let Some(key) = context.key_of::<T>(row) {
                        if context.tracker().state(T::COLLECTION, &key) == EntityState::Deleted {
                            return Ok(false);
                        }
                    }
                }
                match &filter {
                    Some(filter) => Ok(filter.matches(&serde_json::from_value::<T>(row.clone())?)),
                    None => Ok(true),
                }
            })
            .await?;

        match row {
            Some(row) => {
                let related = self.related(&includes).await?;
                self.materialize(row, &includes, &related)
            }
            None => Ok(None),
        }
    }

    /// Returns true if at least one entity matches
    pub async fn any(&self) -> CoreResult<bool> {
        if self.skip > 0 || self.take == Some(0) {
            return Ok(!self.stored_window(false).await?.is_empty());
        }
        let filter = self.filter.clone();
        let row = self
            .context
            .first_row_matching(T::COLLECTION, move |row| match &filter {
                Some(filter) => Ok(filter.matches(&serde_json::from_value::<T>(row.clone())?)),
                None => Ok(true),
            })
            .await?;
        Ok(row.is_some())
    }

    /// Number of matching entities
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Overflow` if the count does not fit in an `i32`.
    pub async fn count(&self) -> CoreResult<i32> {
        let count = self.long_count().await?;
        i32::try_from(count).map_err(|_| {
            CoreError::Overflow(format!(
                "{} count {} exceeds the 32-bit range; use long_count",
                T::entity_name(),
                count
            ))
        })
    }

    /// Number of matching entities, as a 64-bit integer
    pub async fn long_count(&self) -> CoreResult<i64> {
        let window = self.stored_window(false).await?;
        i64::try_from(window.len())
            .map_err(|_| CoreError::Overflow(format!("{} count exceeds i64", T::entity_name())))
    }

    /// Largest value of `selector` over the matching entities
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EmptySequence` if nothing matches.
    pub async fn max<R, F>(&self, selector: F) -> CoreResult<R>
    where
        R: PartialOrd,
        F: Fn(&T) -> R,
    {
        let window = self.stored_window(false).await?;
        window
            .iter()
            .map(|(entity, _)| selector(entity))
            .reduce(|best, next| if next > best { next } else { best })
            .ok_or(CoreError::EmptySequence)
    }

    /// Filtered, ordered and paged stored values, paired with their rows
    ///
    /// With `skip_deleted`, rows whose key is tracked as `Deleted` are dropped
    /// before ordering and paging.
    async fn stored_window(&self, skip_deleted: bool) -> CoreResult<Vec<(T, Row)>> {
        let rows = self.context.scan_rows(T::COLLECTION).await?;

        let mut matched = Vec::new();
        for row in rows {
            if skip_deleted && self.is_staged_for_deletion(&row) {
                continue;
            }
            let stored: T = self.context.decode(row.clone())?;
            if self.filter.as_ref().map_or(true, |f| f.matches(&stored)) {
                matched.push((stored, row));
            }
        }
        if let Some(order) = &self.order {
            order.sort_by_entity(&mut matched);
        }

        Ok(matched
            .into_iter()
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .collect())
    }

    fn is_staged_for_deletion(&self, row: &Row) -> bool {
        self.context
            .key_of::<T>(row)
            .is_some_and(|key| self.context.tracker().state(T::COLLECTION, &key) == EntityState::Deleted)
    }

    async fn related(&self, includes: &IncludeTree) -> CoreResult<RelatedRows> {
        if includes.is_empty() {
            return Ok(RelatedRows::new());
        }
        self.context.load_related(includes).await
    }

    fn materialize(&self, row: Row, includes: &IncludeTree, related: &RelatedRows) -> CoreResult<Option<T>> {
        let mut row = if self.tracking {
            match self.context.resolve_tracked::<T>(row) {
                Some(row) => row,
                None => return Ok(None),
            }
        } else {
            row
        };
        self.context.attach_related::<T>(&mut row, includes, related);
        self.context.decode(row).map(Some)
    }
}

impl<T: Entity> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            filter: self.filter.clone(),
            order: self.order.clone(),
            include: self.include.clone(),
            skip: self.skip,
            take: self.take,
            tracking: self.tracking,
        }
    }
}

impl<T: Entity> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &T::entity_name())
            .field("include", &self.include.to_string())
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("tracking", &self.tracking)
            .finish()
    }
}

/// A query whose results are mapped through a selector
pub struct Projection<T: Entity, R, F> {
    query: Query<T>,
    selector: F,
    _result: PhantomData<fn() -> R>,
}

impl<T, R, F> Projection<T, R, F>
where
    T: Entity,
    F: Fn(&T) -> R,
{
    pub async fn to_list(&self) -> CoreResult<Vec<R>> {
        let entities = self.query.to_list().await?;
        Ok(entities.iter().map(&self.selector).collect())
    }

    pub async fn first_or_default(&self) -> CoreResult<Option<R>> {
        let entity = self.query.first_or_default().await?;
        Ok(entity.as_ref().map(&self.selector))
    }
}
