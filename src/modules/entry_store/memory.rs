//! In-memory entry store.

use super::{Entry, EntryStore, StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tracing::debug;

/// Entries held in a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn get(&self, name: &str) -> StoreResult<Option<Entry>> {
        Ok(self.entries.get(name).map(|entry| entry.value().clone()))
    }

    async fn commit(&self, entry: &Entry) -> StoreResult<()> {
        match self.entries.get_mut(&entry.name) {
            Some(mut slot) => {
                *slot = entry.clone();
                debug!(name = %entry.name, "Committed entry");
                Ok(())
            },
            None => Err(StoreError::NotFound(entry.name.clone())),
        }
    }

    async fn insert(&self, entry: Entry) -> StoreResult<()> {
        validate_name(&entry.name)?;

        match self.entries.entry(entry.name.clone()) {
            MapEntry::Occupied(_) => Err(StoreError::AlreadyExists(entry.name)),
            MapEntry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            },
        }
    }

    async fn remove(&self, name: &str) -> StoreResult<Option<Entry>> {
        Ok(self.entries.remove(name).map(|(_, entry)| entry))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}
