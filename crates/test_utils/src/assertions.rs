//! Custom Test Assertions
//!
//! Provides assertion helpers for the data-access error taxonomy and for
//! change-tracking states, with more meaningful failure messages than a bare
//! `matches!`.

use std::fmt::Debug;

use core_kernel::{CoreError, CoreResult, Entity, EntityState, StoreError};
use infra_db::Repository;

/// Asserts that a result failed with `CoreError::InvalidArgument`
pub fn assert_invalid_argument<T: Debug>(result: CoreResult<T>) {
    match result {
        Err(CoreError::InvalidArgument(_)) => {}
        other => panic!("Expected InvalidArgument, got {:?}", other),
    }
}

/// Asserts that a result failed with `CoreError::Disposed`
pub fn assert_disposed<T: Debug>(result: CoreResult<T>) {
    assert!(
        matches!(result, Err(CoreError::Disposed)),
        "Expected Disposed, got {:?}",
        result
    );
}

/// Asserts that a result failed with `CoreError::IdentityConflict`
pub fn assert_identity_conflict<T: Debug>(result: CoreResult<T>) {
    assert!(
        matches!(result, Err(CoreError::IdentityConflict { .. })),
        "Expected IdentityConflict, got {:?}",
        result
    );
}

/// Asserts that a result failed with a store error matching `predicate`
///
/// # Panics
///
/// Panics if the result succeeded, failed with a non-store error, or the store
/// error does not satisfy `predicate`
pub fn assert_store_error<T: Debug>(result: CoreResult<T>, predicate: impl Fn(&StoreError) -> bool) {
    match result {
        Err(CoreError::Store(error)) => {
            assert!(predicate(&error), "Unexpected store error: {:?}", error)
        }
        other => panic!("Expected a store error, got {:?}", other),
    }
}

/// Asserts the change-tracking state of `entity` in `repository`
pub fn assert_state<T: Entity>(repository: &Repository<T>, entity: &T, expected: EntityState) {
    let actual = repository
        .state(entity)
        .unwrap_or_else(|e| panic!("State lookup failed: {}", e));
    assert_eq!(
        actual,
        expected,
        "{} state mismatch: actual={:?}, expected={:?}",
        T::entity_name(),
        actual,
        expected
    );
}

/// Asserts that `items` are sorted by `key`, ascending
pub fn assert_sorted_by<T, K: PartialOrd + Debug>(items: &[T], key: impl Fn(&T) -> K) {
    for pair in items.windows(2) {
        let (a, b) = (key(&pair[0]), key(&pair[1]));
        assert!(a <= b, "Items out of order: {:?} before {:?}", a, b);
    }
}
