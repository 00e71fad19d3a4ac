//! Type-keyed registry
//!
//! Stores at most one shared instance per Rust type. Values are kept type
//! erased and recovered by downcasting at the call site, so callers get a
//! typed `Arc<V>` back without any string lookups.
//!
//! # Usage
//!
//! ```rust
//! use core_kernel::registry::TypeRegistry;
//! use std::sync::Arc;
//!
//! let mut registry = TypeRegistry::new();
//! let first: Arc<String> = registry.get_or_insert_with(|| "cached".to_string());
//! let second: Arc<String> = registry.get_or_insert_with(|| unreachable!());
//! assert!(Arc::ptr_eq(&first, &second));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry holding one shared instance per type
#[derive(Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered instance of `V`, if any
    pub fn get<V: Any + Send + Sync>(&self) -> Option<Arc<V>> {
        self.entries
            .get(&TypeId::of::<V>())
            .cloned()
            .and_then(|entry| entry.downcast::<V>().ok())
    }

    /// Returns the registered instance of `V`, creating it on first request
    pub fn get_or_insert_with<V: Any + Send + Sync>(&mut self, create: impl FnOnce() -> V) -> Arc<V> {
        if let Some(existing) = self.get::<V>() {
            return existing;
        }
        let created = Arc::new(create());
        self.entries
            .insert(TypeId::of::<V>(), created.clone() as Arc<dyn Any + Send + Sync>);
        created
    }

    /// Returns true if an instance of `V` is registered
    pub fn contains<V: Any + Send + Sync>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<V>())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every registered instance
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}
