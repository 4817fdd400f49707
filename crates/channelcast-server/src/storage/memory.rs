#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use channelcast_core::{Item, ItemKey, SecondaryIndex};

use super::{StoreAdapter, StoreError};

/// In-memory store implementation for testing and simulation
///
/// Items live in a `BTreeMap` ordered by (partition, sort), so range queries
/// are a map range. Index queries filter every item on the index attributes,
/// which is O(items) and fine at test scale. All state is wrapped in
/// Arc<Mutex<>> so clones share it. Uses `lock().expect()` which will panic if
/// the mutex is poisoned - acceptable for test code.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

struct MemoryStoreInner {
    /// Items by primary key
    items: BTreeMap<ItemKey, Item>,

    /// Indexes this store answers queries for
    indexes: Vec<SecondaryIndex>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore` with no secondary indexes
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStoreInner {
                items: BTreeMap::new(),
                indexes: Vec::new(),
            })),
        }
    }

    /// Create a new empty `MemoryStore` answering queries on `indexes`
    pub fn with_indexes(indexes: &[SecondaryIndex]) -> Self {
        let store = Self::new();
        store.lock().indexes.extend_from_slice(indexes);
        store
    }

    /// Number of stored items.
    ///
    /// Useful for debugging and testing.
    pub fn item_count(&self) -> usize {
        self.lock().items.len()
    }

    /// Copy of every stored item, ordered by key.
    ///
    /// Useful for asserting that an operation did not mutate the store.
    pub fn items(&self) -> Vec<Item> {
        self.lock().items.values().cloned().collect()
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). This is acceptable for test/simulation code.
    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().expect("Mutex poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        Ok(self.lock().items.get(key).cloned())
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.lock().items.insert(item.key.clone(), item);
        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        self.lock().items.remove(key);
        Ok(())
    }

    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError> {
        let inner = self.lock();
        let start = ItemKey::new(partition, sort_prefix);

        Ok(inner
            .items
            .range(start..)
            .take_while(|(key, _)| key.partition == partition && key.sort.starts_with(sort_prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        let inner = self.lock();

        if !inner.indexes.contains(index) {
            return Err(StoreError::UnknownIndex(index.name.to_string()));
        }

        Ok(inner
            .items
            .values()
            .filter(|item| index.key_of(item) == Some((partition_value, sort_value)))
            .cloned()
            .collect())
    }

    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError> {
        Ok(self.lock().items.values().map(|item| item.project(projection)).collect())
    }
}

#[cfg(test)]
mod tests {
    use channelcast_core::{BY_TYPE_INDEX, Connection};

    use super::*;

    #[tokio::test]
    async fn put_overwrites_and_delete_is_idempotent() {
        let store = MemoryStore::new();
        let key = ItemKey::new("lobby", "Thing#1");

        store.put(Item::new(key.clone()).with_str("v", "1")).await.unwrap();
        store.put(Item::new(key.clone()).with_str("v", "2")).await.unwrap();

        assert_eq!(store.item_count(), 1);
        assert_eq!(store.get(&key).await.unwrap().unwrap().str_attr("v"), Some("2"));

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_stays_inside_partition_and_prefix() {
        let store = MemoryStore::new();
        for (pk, sk) in [("a", "Connection#1"), ("a", "ChatLog#x"), ("ab", "Connection#2"), ("b", "Connection#3")] {
            store.put(Item::new(ItemKey::new(pk, sk))).await.unwrap();
        }

        let found = store.query("a", "Connection#").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, ItemKey::new("a", "Connection#1"));
    }

    #[tokio::test]
    async fn index_query_requires_registration() {
        let store = MemoryStore::new();
        let result = store.query_by_index(&BY_TYPE_INDEX, "Connection", "abc").await;
        assert_eq!(result, Err(StoreError::UnknownIndex("ByType".to_string())));

        let store = MemoryStore::with_indexes(&[BY_TYPE_INDEX]);
        store.put(Item::from(&Connection::new("one", "abc", "e/p"))).await.unwrap();
        store.put(Item::from(&Connection::new("two", "abc", "e/p"))).await.unwrap();
        store.put(Item::from(&Connection::new("two", "xyz", "e/p"))).await.unwrap();

        let found = store.query_by_index(&BY_TYPE_INDEX, "Connection", "abc").await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
