//! Key-value store contract.
//!
//! Items are addressed by a (partition key, sort key) pair and carry a map of
//! named attributes, in the shape of a wide-column document store. The trait
//! is the only thing the registry and chat log know about persistence; the
//! storage engine behind it is somebody else's problem.
//!
//! No method offers conditional writes or transactions. Callers that need
//! read-modify-write get last-writer-wins semantics.

mod error;
mod item;

use async_trait::async_trait;
pub use error::StoreError;
pub use item::{Attribute, Item, ItemKey};

/// A secondary index over two string attributes.
///
/// An item is visible in the index iff it carries both attributes as strings.
/// Stores must be told which indexes exist when they are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecondaryIndex {
    /// Index name, used in errors and logs
    pub name: &'static str,
    /// Attribute acting as the index partition key
    pub partition_attr: &'static str,
    /// Attribute acting as the index sort key
    pub sort_attr: &'static str,
}

impl SecondaryIndex {
    /// Index key of `item`, or `None` if the item is not in this index.
    pub fn key_of<'a>(&self, item: &'a Item) -> Option<(&'a str, &'a str)> {
        Some((item.str_attr(self.partition_attr)?, item.str_attr(self.sort_attr)?))
    }
}

/// Storage abstraction for connection and chat log records.
///
/// Must be Clone (handed to every component that needs it), Send + Sync, and
/// cheap to clone. Implementations share internal state, so clones access
/// the same underlying store.
#[async_trait]
pub trait StoreAdapter: Clone + Send + Sync + 'static {
    /// Item at `key`, or `None` if absent.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError>;

    /// Store `item`, unconditionally replacing any item at the same key.
    async fn put(&self, item: Item) -> Result<(), StoreError>;

    /// Remove the item at `key`.
    ///
    /// Deleting an absent key is a no-op, not an error.
    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError>;

    /// All items in `partition` whose sort key starts with `sort_prefix`,
    /// ordered by sort key.
    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError>;

    /// All items whose `index` key equals (`partition_value`, `sort_value`).
    ///
    /// Order is not guaranteed. Returns `StoreError::UnknownIndex` if the
    /// index was not registered with this store.
    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError>;

    /// Every item in the store, reduced to its key plus the attributes named
    /// in `projection`.
    ///
    /// Order is not guaranteed.
    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError>;
}
