//! Redb-backed durable store implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Items
//! and their secondary index entries are written in the same transaction, so
//! an index never points at a version of an item that was not committed.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use channelcast_core::{Item, ItemKey, SecondaryIndex};
use redb::{Database, ReadableTable, Table, TableDefinition};

use super::{StoreAdapter, StoreError};

/// Table: items
/// Key: partition length (4 bytes BE) + partition + sort key
/// Value: CBOR-encoded Item
const ITEMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("items");

/// Table: index_entries
/// Key: length-prefixed (index name, index partition, index sort) + item key
/// Value: item key (same encoding as ITEMS)
const INDEX_ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("index_entries");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    indexes: Vec<SecondaryIndex>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (ITEMS, INDEX_ENTRIES).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(ITEMS).map_err(io)?;
            let _ = txn.open_table(INDEX_ENTRIES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db), indexes: Vec::new() })
    }

    /// Open the database and maintain `indexes` on every write.
    ///
    /// Index entries are rebuilt for items already in the database, so an
    /// index declared for the first time covers existing data.
    pub fn open_with_indexes(
        path: impl AsRef<Path>,
        indexes: &[SecondaryIndex],
    ) -> Result<Self, StoreError> {
        let mut store = Self::open(path)?;
        for index in indexes {
            store.rebuild_index(index)?;
            store.indexes.push(*index);
        }
        Ok(store)
    }

    /// Drop and re-create every entry of `index`.
    fn rebuild_index(&self, index: &SecondaryIndex) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let items = txn.open_table(ITEMS).map_err(io)?;
            let mut entries = txn.open_table(INDEX_ENTRIES).map_err(io)?;

            let prefix = encode_parts(&[index.name]);
            let mut stale = Vec::new();
            for result in entries.range(prefix.as_slice()..).map_err(io)? {
                let (key, _) = result.map_err(io)?;
                if !key.value().starts_with(&prefix) {
                    break;
                }
                stale.push(key.value().to_vec());
            }
            for key in &stale {
                entries.remove(key.as_slice()).map_err(io)?;
            }

            for result in items.iter().map_err(io)? {
                let (_, value) = result.map_err(io)?;
                let item = decode_item(value.value())?;
                if let Some(entry) = index_entry_key(index, &item) {
                    let item_key = encode_item_key(&item.key);
                    entries.insert(entry.as_slice(), item_key.as_slice()).map_err(io)?;
                }
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    /// Remove the index entries of `item` from every maintained index.
    fn unindex(
        &self,
        entries: &mut Table<'_, &'static [u8], &'static [u8]>,
        item: &Item,
    ) -> Result<(), StoreError> {
        for index in &self.indexes {
            if let Some(entry) = index_entry_key(index, item) {
                entries.remove(entry.as_slice()).map_err(io)?;
            }
        }
        Ok(())
    }

    fn has_index(&self, index: &SecondaryIndex) -> bool {
        self.indexes.contains(index)
    }
}

#[async_trait]
impl StoreAdapter for RedbStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ITEMS).map_err(io)?;

        let key = encode_item_key(key);
        match table.get(key.as_slice()).map_err(io)? {
            Some(value) => Ok(Some(decode_item(value.value())?)),
            None => Ok(None),
        }
    }

    async fn put(&self, item: Item) -> Result<(), StoreError> {
        let bytes = encode_item(&item)?;
        let key = encode_item_key(&item.key);

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut items = txn.open_table(ITEMS).map_err(io)?;
            let mut entries = txn.open_table(INDEX_ENTRIES).map_err(io)?;

            let previous = match items.get(key.as_slice()).map_err(io)? {
                Some(value) => Some(decode_item(value.value())?),
                None => None,
            };
            if let Some(previous) = previous {
                self.unindex(&mut entries, &previous)?;
            }

            for index in &self.indexes {
                if let Some(entry) = index_entry_key(index, &item) {
                    entries.insert(entry.as_slice(), key.as_slice()).map_err(io)?;
                }
            }

            items.insert(key.as_slice(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    async fn delete(&self, key: &ItemKey) -> Result<(), StoreError> {
        let key = encode_item_key(key);

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut items = txn.open_table(ITEMS).map_err(io)?;
            let mut entries = txn.open_table(INDEX_ENTRIES).map_err(io)?;

            let previous = match items.remove(key.as_slice()).map_err(io)? {
                Some(value) => Some(decode_item(value.value())?),
                None => None,
            };
            if let Some(previous) = previous {
                self.unindex(&mut entries, &previous)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    async fn query(&self, partition: &str, sort_prefix: &str) -> Result<Vec<Item>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ITEMS).map_err(io)?;

        let prefix = encode_item_key(&ItemKey::new(partition, sort_prefix));

        let mut found = Vec::new();
        for result in table.range(prefix.as_slice()..).map_err(io)? {
            let (key, value) = result.map_err(io)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            found.push(decode_item(value.value())?);
        }

        Ok(found)
    }

    async fn query_by_index(
        &self,
        index: &SecondaryIndex,
        partition_value: &str,
        sort_value: &str,
    ) -> Result<Vec<Item>, StoreError> {
        if !self.has_index(index) {
            return Err(StoreError::UnknownIndex(index.name.to_string()));
        }

        let txn = self.db.begin_read().map_err(io)?;
        let items = txn.open_table(ITEMS).map_err(io)?;
        let entries = txn.open_table(INDEX_ENTRIES).map_err(io)?;

        let prefix = encode_parts(&[index.name, partition_value, sort_value]);

        let mut found = Vec::new();
        for result in entries.range(prefix.as_slice()..).map_err(io)? {
            let (key, item_key) = result.map_err(io)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            // Entries are written in the same transaction as their item, so
            // a dangling entry means the database was edited underneath us.
            match items.get(item_key.value()).map_err(io)? {
                Some(value) => found.push(decode_item(value.value())?),
                None => tracing::warn!(index = index.name, "index entry without item"),
            }
        }

        Ok(found)
    }

    async fn scan(&self, projection: &[&str]) -> Result<Vec<Item>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(ITEMS).map_err(io)?;

        let mut found = Vec::new();
        for result in table.iter().map_err(io)? {
            let (_, value) = result.map_err(io)?;
            found.push(decode_item(value.value())?.project(projection));
        }

        Ok(found)
    }
}

fn io(err: impl std::fmt::Display) -> StoreError {
    StoreError::Io(err.to_string())
}

fn encode_item(item: &Item) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(item, &mut bytes)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_item(bytes: &[u8]) -> Result<Item, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Append `part` with a 4-byte big-endian length prefix.
#[allow(clippy::cast_possible_truncation)]
fn push_part(buf: &mut Vec<u8>, part: &str) {
    buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
    buf.extend_from_slice(part.as_bytes());
}

/// Length-prefixed concatenation. A prefix of parts encodes to a byte prefix
/// of the whole, which is what makes range scans over index entries work.
fn encode_parts(parts: &[&str]) -> Vec<u8> {
    let mut buf = Vec::new();
    for part in parts {
        push_part(&mut buf, part);
    }
    buf
}

/// Item key encoding: length-prefixed partition, then the raw sort key.
///
/// The sort key is left unprefixed so a sort-key prefix encodes to a byte
/// prefix, and keys within a partition order the same way their strings do.
fn encode_item_key(key: &ItemKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + key.partition.len() + key.sort.len());
    push_part(&mut buf, &key.partition);
    buf.extend_from_slice(key.sort.as_bytes());
    buf
}

fn index_entry_key(index: &SecondaryIndex, item: &Item) -> Option<Vec<u8>> {
    let (partition_value, sort_value) = index.key_of(item)?;
    let mut buf = encode_parts(&[index.name, partition_value, sort_value]);
    buf.extend_from_slice(&encode_item_key(&item.key));
    Some(buf)
}

#[cfg(test)]
mod tests {
    use channelcast_core::{BY_TYPE_INDEX, Connection};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn item_key_prefix_is_byte_prefix() {
        let full = encode_item_key(&ItemKey::new("lobby", "Connection#abc"));
        let prefix = encode_item_key(&ItemKey::new("lobby", "Connection#"));
        let other_partition = encode_item_key(&ItemKey::new("lobby2", "Connection#abc"));

        assert!(full.starts_with(&prefix));
        assert!(!other_partition.starts_with(&prefix));
    }

    #[tokio::test]
    async fn reindexing_on_overwrite_drops_stale_entries() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open_with_indexes(dir.path().join("t.redb"), &[BY_TYPE_INDEX]).unwrap();

        let key = Connection::key_for("lobby", "abc");
        store.put(Item::from(&Connection::new("lobby", "abc", "e/p"))).await.unwrap();

        // Same primary key, item no longer carries the index attributes
        store.put(Item::new(key.clone()).with_str("note", "retyped")).await.unwrap();

        let found = store.query_by_index(&BY_TYPE_INDEX, "Connection", "abc").await.unwrap();
        assert!(found.is_empty());
        assert_eq!(store.get(&key).await.unwrap().unwrap().str_attr("note"), Some("retyped"));
    }

    #[tokio::test]
    async fn unregistered_index_is_rejected() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("t.redb")).unwrap();

        let result = store.query_by_index(&BY_TYPE_INDEX, "Connection", "abc").await;
        assert_eq!(result, Err(StoreError::UnknownIndex("ByType".to_string())));
    }
}
