//! Store backends for the channelcast content table.
//!
//! All backends implement [`StoreAdapter`] from `channelcast-core`:
//!
//! - [`MemoryStore`]: in-process, for tests and ephemeral runs
//! - [`RedbStore`]: durable, survives restarts
//! - [`ChaoticStore`]: wraps another backend and injects failures
//!
//! Secondary indexes are declared when a store is built. Use
//! [`CONTENT_INDEXES`] for the indexes the registry needs.

mod chaotic;
mod memory;
mod redb;

use std::path::Path;

use async_trait::async_trait;
pub use channelcast_core::store::{StoreAdapter, StoreError};
use channelcast_core::{BY_TYPE_INDEX, Item, ItemKey, SecondaryIndex};
pub use chaotic::ChaoticStore;
pub use memory::MemoryStore;

pub use self::redb::RedbStore;

/// Secondary indexes of the content table.
pub const CONTENT_INDEXES: [SecondaryIndex; 1] = [BY_TYPE_INDEX];

/// Backend chosen at startup.
#[derive(Clone)]
pub enum ContentStore {
    /// Nothing survives a restart
    Memory(MemoryStore),
    /// Durable database file
    Redb(RedbStore),
}

impl ContentStore {
    /// Durable store at `path`, or an in-memory one if `path` is `None`.
    ///
    /// Either way the store answers queries on [`CONTENT_INDEXES`].
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the database cannot be opened.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        match path {
            Some(path) => Ok(Self::Redb(RedbStore::open_with_indexes(path, &CONTENT_INDEXES)?)),
            None => Ok(Self::Memory(MemoryStore::with_indexes(&CONTENT_INDEXES))),
        }
    }

    /// Returns true if the store survives a restart.
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Redb(_))
    }
}

#[async_trait]
impl StoreAdapter for ContentStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        match self {
            Self::Memory(store) => store.get(key).await,
            Self::Redb(store) => store.get(key).await,
        }
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.put(item).await,
            Self::Redb(store) => store.put(item).await,
        }
    }

    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.delete(key).await,
            Self::Redb(store) => store.delete(key).await,
        }
    }

    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError> {
        match self {
            Self::Memory(store) => store.query(partition, sort_prefix).await,
            Self::Redb(store) => store.query(partition, sort_prefix).await,
        }
    }

    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        match self {
            Self::Memory(store) => store.query_by_index(index, partition_value, sort_value).await,
            Self::Redb(store) => store.query_by_index(index, partition_value, sort_value).await,
        }
    }

    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError> {
        match self {
            Self::Memory(store) => store.scan(projection).await,
            Self::Redb(store) => store.scan(projection).await,
        }
    }
}
