//! Change tracker
//!
//! Holds every entity a unit of work knows about, keyed by collection and
//! canonical row key, together with its state and the values last read from
//! or written to the store. Saving turns the pending entries into one batch of
//! [`RowChange`]s; a successful save accepts them.
//!
//! Entities whose type exposes no resolvable key cannot be identified, so they
//! are kept in a separate list and written whole.

use indexmap::IndexMap;
use serde_json::Value;

use core_kernel::{CoreError, CoreResult, EntityState, Row, RowChange, RowKey};

type EntryKey = (String, RowKey);

/// One tracked entity
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    state: EntityState,
    current: Row,
    /// Values as last seen in the store; `None` until the row has been read
    /// or saved
    original: Option<Row>,
}

impl TrackedEntry {
    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn current(&self) -> &Row {
        &self.current
    }

    pub fn original(&self) -> Option<&Row> {
        self.original.as_ref()
    }

    fn refresh_state(&mut self) {
        if matches!(self.state, EntityState::Unchanged | EntityState::Modified) {
            self.state = if self.original.as_ref() == Some(&self.current) {
                EntityState::Unchanged
            } else {
                EntityState::Modified
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct KeylessEntry {
    collection: String,
    state: EntityState,
    row: Row,
}

/// Tracks entity states for one unit of work
#[derive(Debug, Default)]
pub struct ChangeTracker {
    entries: IndexMap<EntryKey, TrackedEntry>,
    keyless: Vec<KeylessEntry>,
}

fn entry_key(collection: &str, key: &RowKey) -> EntryKey {
    (collection.to_string(), key.clone())
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for a key, whatever its state
    pub fn entry(&self, collection: &str, key: &RowKey) -> Option<&TrackedEntry> {
        self.entries.get(&entry_key(collection, key))
    }

    /// State of the entity with this key
    pub fn state(&self, collection: &str, key: &RowKey) -> EntityState {
        self.entry(collection, key)
            .map_or(EntityState::Detached, TrackedEntry::state)
    }

    /// State of a keyless entity, matched by its full row
    pub fn keyless_state(&self, collection: &str, row: &Row) -> EntityState {
        self.keyless
            .iter()
            .find(|e| e.collection == collection && &e.row == row)
            .map_or(EntityState::Detached, |e| e.state)
    }

    /// Returns true if the key is tracked in any state
    pub fn is_tracked(&self, collection: &str, key: &RowKey) -> bool {
        self.state(collection, key).is_tracked()
    }

    /// Current values of a tracked entity; deleted entities count as absent
    pub fn lookup(&self, collection: &str, key: &RowKey) -> Option<Row> {
        self.entry(collection, key)
            .filter(|e| e.state != EntityState::Deleted)
            .map(|e| e.current.clone())
    }

    /// Registers a row read from the store and resolves it against the tracker
    ///
    /// An untracked row is tracked as `Unchanged` and returned. A tracked key
    /// returns the tracked values instead of the stored ones, and a deleted
    /// key returns `None`.
    pub fn track_loaded(&mut self, collection: &str, key: RowKey, row: Row) -> Option<Row> {
        let entry = self
            .entries
            .entry((collection.to_string(), key))
            .or_insert_with(|| TrackedEntry {
                state: EntityState::Unchanged,
                original: Some(row.clone()),
                current: row,
            });
        (entry.state != EntityState::Deleted).then(|| entry.current.clone())
    }

    /// Stages an entity for insertion
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IdentityConflict` if the key is already tracked and
    /// not deleted. Re-adding a deleted key stages an update instead.
    pub fn add(
        &mut self,
        entity: &str,
        collection: &str,
        key: Option<RowKey>,
        row: Row,
    ) -> CoreResult<()> {
        let Some(key) = key else {
            self.keyless.push(KeylessEntry {
                collection: collection.to_string(),
                state: EntityState::Added,
                row,
            });
            return Ok(());
        };

        match self.entries.get_mut(&entry_key(collection, &key)) {
            Some(existing) if existing.state == EntityState::Deleted => {
                existing.current = row;
                existing.state = EntityState::Modified;
                Ok(())
            }
            Some(_) => Err(CoreError::identity_conflict(entity, &key)),
            None => {
                self.entries.insert(
                    (collection.to_string(), key),
                    TrackedEntry {
                        state: EntityState::Added,
                        current: row,
                        original: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Stages several entities for insertion, all or none
    pub fn add_all(
        &mut self,
        entity: &str,
        collection: &str,
        rows: Vec<(Option<RowKey>, Row)>,
    ) -> CoreResult<()> {
        let mut seen = std::collections::HashSet::new();
        for key in rows.iter().filter_map(|(key, _)| key.as_ref()) {
            let live = self
                .entry(collection, key)
                .is_some_and(|e| e.state != EntityState::Deleted);
            if live || !seen.insert(key) {
                return Err(CoreError::identity_conflict(entity, key));
            }
        }
        for (key, row) in rows {
            self.add(entity, collection, key, row)?;
        }
        Ok(())
    }

    /// Marks an entity as modified with the given values
    ///
    /// Detached entities are attached; added entities stay added.
    pub fn update(&mut self, collection: &str, key: Option<RowKey>, row: Row) {
        let Some(key) = key else {
            self.attach_keyless_modified(collection, row);
            return;
        };

        let entry = self
            .entries
            .entry((collection.to_string(), key))
            .or_insert_with(|| TrackedEntry {
                state: EntityState::Modified,
                current: Value::Null,
                original: None,
            });
        entry.current = row;
        if entry.state != EntityState::Added {
            entry.state = EntityState::Modified;
        }
    }

    /// Stages a keyless entity to be written whole
    pub fn attach_keyless_modified(&mut self, collection: &str, row: Row) {
        self.keyless.push(KeylessEntry {
            collection: collection.to_string(),
            state: EntityState::Modified,
            row,
        });
    }

    /// Stages an entity for removal
    ///
    /// A detached entity is attached first so the store can identify it by
    /// key. Removing an added entity simply forgets it.
    pub fn remove(&mut self, collection: &str, key: RowKey, row: Row) {
        let id = (collection.to_string(), key);
        match self.entries.get(&id).map(TrackedEntry::state) {
            Some(EntityState::Added) => {
                self.entries.shift_remove(&id);
            }
            Some(_) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.state = EntityState::Deleted;
                }
            }
            None => {
                self.entries.insert(
                    id,
                    TrackedEntry {
                        state: EntityState::Deleted,
                        original: Some(row.clone()),
                        current: row,
                    },
                );
            }
        }
    }

    /// Copies every field of `incoming` onto the tracked values, field by field
    ///
    /// Fields named in `skip` (navigations) are left untouched. The entry
    /// becomes `Modified` only if a value actually changed. Returns false if
    /// the key is not tracked.
    pub fn merge(&mut self, collection: &str, key: &RowKey, incoming: Row, skip: &[&str]) -> bool {
        let Some(entry) = self.entries.get_mut(&entry_key(collection, key)) else {
            return false;
        };
        if let (Value::Object(current), Value::Object(incoming)) = (&mut entry.current, incoming) {
            for (field, value) in incoming {
                if !skip.contains(&field.as_str()) {
                    current.insert(field, value);
                }
            }
        }
        entry.refresh_state();
        true
    }

    /// Returns true if saving would write anything
    pub fn has_changes(&self) -> bool {
        !self.keyless.is_empty() || self.entries.values().any(|e| e.state.is_pending())
    }

    /// Number of tracked entities, keyless ones included
    pub fn len(&self) -> usize {
        self.entries.len() + self.keyless.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the batch that persists every pending entry, in tracking order
    pub fn detect_changes(&self) -> Vec<RowChange> {
        let keyed = self
            .entries
            .iter()
            .filter_map(|((collection, key), entry)| {
                let collection = collection.clone();
                match entry.state {
                    EntityState::Added => Some(RowChange::Insert {
                        collection,
                        key: Some(key.clone()),
                        row: entry.current.clone(),
                    }),
                    EntityState::Modified => Some(RowChange::Update {
                        collection,
                        key: Some(key.clone()),
                        row: entry.current.clone(),
                    }),
                    EntityState::Deleted => Some(RowChange::Delete {
                        collection,
                        key: key.clone(),
                    }),
                    EntityState::Unchanged | EntityState::Detached => None,
                }
            });

        let keyless = self.keyless.iter().map(|entry| {
            let collection = entry.collection.clone();
            let row = entry.row.clone();
            if entry.state == EntityState::Added {
                RowChange::Insert { collection, key: None, row }
            } else {
                RowChange::Update { collection, key: None, row }
            }
        });

        keyed.chain(keyless).collect()
    }

    /// Marks every pending entry as persisted
    ///
    /// Deleted entries are forgotten. Keyless entities cannot be re-identified,
    /// so they stop being tracked.
    pub fn accept_changes(&mut self) {
        self.entries.retain(|_, entry| entry.state != EntityState::Deleted);
        for entry in self.entries.values_mut() {
            entry.state = EntityState::Unchanged;
            entry.original = Some(entry.current.clone());
        }
        self.keyless.clear();
    }

    /// Forgets every tracked entity
    pub fn clear(&mut self) {
        self.entries.clear();
        self.keyless.clear();
    }
}
