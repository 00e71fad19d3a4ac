//! Query executor adapter
//!
//! Stores hand back query results either as an asynchronous stream or as an
//! in-memory iterator ([`QuerySource`]). The functions here materialize both
//! through one asynchronous contract, so callers never branch on the kind of
//! store they are talking to.

use core_kernel::{QuerySource, StoreResult};
use futures::StreamExt;

/// Collects every result in source order
///
/// The first stream error aborts materialization and is returned as is.
pub async fn to_list_async_safe<T>(source: QuerySource<'_, T>) -> StoreResult<Vec<T>> {
    match source {
        QuerySource::Streaming(mut stream) => {
            let mut items = Vec::new();
            while let Some(item) = stream.next().await {
                items.push(item?);
            }
            Ok(items)
        }
        QuerySource::Buffered(iter) => Ok(iter.collect()),
    }
}

/// Returns the first result, or `None` for an empty source
pub async fn first_or_default_async_safe<T>(source: QuerySource<'_, T>) -> StoreResult<Option<T>> {
    first_matching_async_safe(source, |_| Ok(true)).await
}

/// Returns the first result accepted by `predicate`
///
/// Pulling stops as soon as a match is found, so a streaming source is never
/// drained further than needed.
pub async fn first_matching_async_safe<T, F>(
    source: QuerySource<'_, T>,
    mut predicate: F,
) -> StoreResult<Option<T>>
where
    F: FnMut(&T) -> StoreResult<bool>,
{
    match source {
        QuerySource::Streaming(mut stream) => {
            while let Some(item) = stream.next().await {
                let item = item?;
                if predicate(&item)? {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        }
        QuerySource::Buffered(iter) => {
            for item in iter {
                if predicate(&item)? {
                    return Ok(Some(item));
                }
            }
            Ok(None)
        }
    }
}
