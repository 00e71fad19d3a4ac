//! Store metadata: primary keys and navigations per entity type
//!
//! The model is the single source of key metadata. A type that is not
//! registered, or is registered without key fields, has no resolvable key;
//! callers must cope with that (see `Repository::update_if_not_tracked`).
//!
//! # Example
//!
//! ```rust,ignore
//! let model = Model::builder()
//!     .entity::<Customer>(|e| e.key(["id"]))
//!     .entity::<Order>(|e| {
//!         e.key(["id"])
//!             .has_one("customer", "customers", ["customer_id"])
//!             .has_many("lines", "order_lines", ["order_id"])
//!     })
//!     .entity::<OrderLine>(|e| e.key(["order_id", "line_no"]))
//!     .build();
//! ```

use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;

use crate::entity::Entity;
use crate::key::{KeyValue, KeyValues, RowKey};

/// How a navigation relates the two collections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationKind {
    /// Foreign key fields live on this entity and reference the target's key
    Reference,
    /// Foreign key fields live on the target and reference this entity's key
    Collection,
}

/// A named relation that can be eager-loaded through an include path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub name: String,
    pub target: String,
    pub kind: NavigationKind,
    pub foreign_key: Vec<String>,
}

/// Metadata for one entity type
#[derive(Debug, Clone)]
pub struct EntityModel {
    pub entity_name: String,
    pub collection: String,
    pub key: Vec<String>,
    pub navigations: Vec<Navigation>,
}

impl EntityModel {
    /// Returns true if the type declares at least one key field
    pub fn has_key(&self) -> bool {
        !self.key.is_empty()
    }

    /// Looks up a navigation by name
    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name == name)
    }

    /// Returns true if `field` is a navigation rather than a stored field
    pub fn is_navigation(&self, field: &str) -> bool {
        self.navigation(field).is_some()
    }

    /// Reads key values from an entity's object form, in declared order
    ///
    /// Returns `None` if the type has no key fields or any key field is
    /// missing or null.
    pub fn key_values(&self, object: &Value) -> Option<KeyValues> {
        if !self.has_key() {
            return None;
        }
        let values = read_fields(object, &self.key)?;
        Some(KeyValues::new(values))
    }

    /// Canonical row key of an entity's object form
    pub fn row_key(&self, object: &Value) -> Option<RowKey> {
        self.key_values(object).map(|k| k.to_row_key())
    }

    /// Removes navigation fields so only stored fields remain
    pub fn strip_navigations(&self, object: &mut Value) {
        if let Value::Object(map) = object {
            for navigation in &self.navigations {
                map.remove(&navigation.name);
            }
        }
    }
}

/// Reads the named fields from a JSON object; `None` if any is absent or null
pub fn read_fields(object: &Value, fields: &[String]) -> Option<Vec<KeyValue>> {
    fields
        .iter()
        .map(|field| match object.get(field) {
            Some(Value::Null) | None => None,
            Some(value) => Some(KeyValue::from_json(value.clone())),
        })
        .collect()
}

/// Metadata for every registered entity type
#[derive(Debug, Clone, Default)]
pub struct Model {
    by_type: HashMap<TypeId, EntityModel>,
    by_collection: HashMap<String, TypeId>,
}

impl Model {
    /// Starts building a model
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Metadata for `T`, if registered
    pub fn entity<T: Entity>(&self) -> Option<&EntityModel> {
        self.by_type.get(&TypeId::of::<T>())
    }

    /// Metadata for the type stored in `collection`, if registered
    pub fn by_collection(&self, collection: &str) -> Option<&EntityModel> {
        self.by_collection
            .get(collection)
            .and_then(|type_id| self.by_type.get(type_id))
    }

    /// Ordered primary key field names of `T`
    pub fn primary_key<T: Entity>(&self) -> Option<&[String]> {
        self.entity::<T>()
            .filter(|m| m.has_key())
            .map(|m| m.key.as_slice())
    }

    /// Number of registered entity types
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns true if no entity type is registered
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Fluent builder for [`Model`]
#[derive(Debug, Default)]
pub struct ModelBuilder {
    model: Model,
}

impl ModelBuilder {
    /// Registers `T`, configuring it through `configure`
    pub fn entity<T: Entity>(
        mut self,
        configure: impl FnOnce(EntityModelBuilder) -> EntityModelBuilder,
    ) -> Self {
        let builder = configure(EntityModelBuilder::new(T::entity_name(), T::COLLECTION));
        let entity = builder.build();
        self.model
            .by_collection
            .insert(entity.collection.clone(), TypeId::of::<T>());
        self.model.by_type.insert(TypeId::of::<T>(), entity);
        self
    }

    /// Finishes the model
    pub fn build(self) -> Model {
        self.model
    }
}

/// Builder for one [`EntityModel`]
#[derive(Debug)]
pub struct EntityModelBuilder {
    entity: EntityModel,
}

impl EntityModelBuilder {
    fn new(entity_name: &str, collection: &str) -> Self {
        Self {
            entity: EntityModel {
                entity_name: entity_name.to_string(),
                collection: collection.to_string(),
                key: Vec::new(),
                navigations: Vec::new(),
            },
        }
    }

    /// Declares the ordered primary key fields
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declares a reference navigation (foreign key on this entity)
    pub fn has_one<I, S>(mut self, name: &str, target: &str, foreign_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.navigations.push(Navigation {
            name: name.to_string(),
            target: target.to_string(),
            kind: NavigationKind::Reference,
            foreign_key: foreign_key.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declares a collection navigation (foreign key on the target)
    pub fn has_many<I, S>(mut self, name: &str, target: &str, foreign_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.navigations.push(Navigation {
            name: name.to_string(),
            target: target.to_string(),
            kind: NavigationKind::Collection,
            foreign_key: foreign_key.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn build(self) -> EntityModel {
        self.entity
    }
}
