//! Entity contract and change-tracking states
//!
//! An entity is any application record that round-trips through serde as a
//! JSON object. Field access (key resolution, field-by-field merge, eager
//! loading of navigations) works on that object form, so entity types need no
//! hand-written accessors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// An application-defined record stored in a named collection
///
/// The primary key is *not* declared here: it is looked up in the
/// [`Model`](crate::model::Model) so that key cardinality stays a property of
/// the store metadata.
///
/// Navigation fields are never stored, so they must deserialize from absence:
/// mark them `#[serde(default)]`.
///
/// # Example
///
/// ```rust
/// use core_kernel::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// struct Product {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for Product {
///     const COLLECTION: &'static str = "products";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name of the store collection holding rows of this type
    const COLLECTION: &'static str;

    /// Short type name used in errors and log fields
    fn entity_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Change-tracking state of an entity instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Not known to the change tracker
    Detached,
    /// Tracked, with values matching the store
    Unchanged,
    /// Staged for insertion
    Added,
    /// Tracked with values that differ from the store
    Modified,
    /// Staged for removal
    Deleted,
}

impl EntityState {
    /// Returns true for every state except `Detached`
    pub fn is_tracked(&self) -> bool {
        !matches!(self, EntityState::Detached)
    }

    /// Returns true if saving would write this entry to the store
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            EntityState::Added | EntityState::Modified | EntityState::Deleted
        )
    }
}

/// Serializes an entity into its JSON object form
///
/// # Errors
///
/// Returns `CoreError::InvalidArgument` if the entity does not serialize to a
/// JSON object (for example a newtype around a scalar).
pub fn to_object<T: Entity>(entity: &T) -> CoreResult<Value> {
    let value = serde_json::to_value(entity)?;
    if !value.is_object() {
        return Err(CoreError::invalid_argument(format!(
            "{} must serialize to a JSON object",
            T::entity_name()
        )));
    }
    Ok(value)
}

/// Deserializes an entity from its JSON object form
pub fn from_object<T: Entity>(value: Value) -> CoreResult<T> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: i64,
        label: String,
    }

    impl Entity for Widget {
        const COLLECTION: &'static str = "widgets";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Bare(i64);

    impl Entity for Bare {
        const COLLECTION: &'static str = "bare";
    }

    #[test]
    fn test_entity_name_is_short() {
        assert_eq!(Widget::entity_name(), "Widget");
    }

    #[test]
    fn test_object_round_trip() {
        let widget = Widget { id: 7, label: "gear".to_string() };
        let value = to_object(&widget).unwrap();
        assert_eq!(value["label"], "gear");
        let back: Widget = from_object(value).unwrap();
        assert_eq!(back, widget);
    }

    #[test]
    fn test_non_object_entity_is_rejected() {
        let err = to_object(&Bare(1)).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_state_predicates() {
        assert!(!EntityState::Detached.is_tracked());
        assert!(EntityState::Unchanged.is_tracked());
        assert!(!EntityState::Unchanged.is_pending());
        assert!(EntityState::Deleted.is_pending());
    }
}
