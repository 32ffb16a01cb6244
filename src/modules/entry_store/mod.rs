//! # Entry Store
//!
//! Entries are owned by a store. The access gate reads an entry, decides,
//! and writes the whole updated entry back with a single
//! [`EntryStore::commit`] call, so a commit either lands completely or not
//! at all.
//!
//! [`MemoryStore`] keeps entries in a concurrent map. It is what the binary
//! uses; durable stores implement the same trait.

mod entry;
mod error;
mod memory;

pub use entry::{Entry, EntryTarget, DEFAULT_CONTENT_TYPE};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Storage for entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Fetch an entry by name.
    async fn get(&self, name: &str) -> StoreResult<Option<Entry>>;

    /// Replace an existing entry atomically.
    async fn commit(&self, entry: &Entry) -> StoreResult<()>;

    /// Add a new entry.
    async fn insert(&self, entry: Entry) -> StoreResult<()>;

    /// Remove an entry, returning it.
    async fn remove(&self, name: &str) -> StoreResult<Option<Entry>>;

    /// Names of all entries.
    async fn list(&self) -> StoreResult<Vec<String>>;
}
