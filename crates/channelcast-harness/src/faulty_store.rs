//! Store wrapper that fails chosen operations.
//!
//! Where a chaotic store fails at random, this one fails exactly the calls a
//! test names, so single-record failure paths can be asserted precisely.

use std::sync::Arc;

use async_trait::async_trait;
use channelcast_core::{Item, ItemKey, SecondaryIndex, StoreAdapter, StoreError};

#[derive(Clone, Default)]
struct Faults {
    deletes: Vec<ItemKey>,
    index_lookups: bool,
}

/// Store that delegates to `S` except for the calls set up to fail.
///
/// Failures are `StoreError::Io`. Clone is cheap; clones fail the same calls.
#[derive(Clone)]
pub struct FaultyStore<S> {
    inner: S,
    faults: Arc<Faults>,
}

impl<S: StoreAdapter> FaultyStore<S> {
    /// Wrap `inner` with no failures configured.
    pub fn new(inner: S) -> Self {
        Self { inner, faults: Arc::new(Faults::default()) }
    }

    /// Fail every delete of `key`.
    #[must_use]
    pub fn fail_delete(mut self, key: ItemKey) -> Self {
        Arc::make_mut(&mut self.faults).deletes.push(key);
        self
    }

    /// Fail every secondary index query.
    #[must_use]
    pub fn fail_index_lookups(mut self) -> Self {
        Arc::make_mut(&mut self.faults).index_lookups = true;
        self
    }

    /// Wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn injected(op: &str) -> StoreError {
    tracing::debug!(op, "injected store failure");
    StoreError::Io(format!("injected failure ({op})"))
}

#[async_trait]
impl<S: StoreAdapter> StoreAdapter for FaultyStore<S> {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        self.inner.put(item).await
    }

    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        if self.faults.deletes.contains(key) {
            return Err(injected("delete"));
        }
        self.inner.delete(key).await
    }

    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError> {
        self.inner.query(partition, sort_prefix).await
    }

    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        if self.faults.index_lookups {
            return Err(injected("query_by_index"));
        }
        self.inner.query_by_index(index, partition_value, sort_value).await
    }

    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError> {
        self.inner.scan(projection).await
    }
}
