//! Connection registry backed by the content table.
//!
//! One record per (channel, connection id), stored under the channel's
//! partition. Every record also carries the `ByType` index attributes, which
//! is how a disconnect finds the records of a connection across all channels
//! it joined.
//!
//! Deregistration is a two-step protocol: list the records through the index,
//! then delete each one independently. Nothing makes the two steps atomic, and
//! a failed delete does not stop the others.

use channelcast_core::{
    BY_TYPE_INDEX, Connection, Item, ItemKey, RelayError, StoreAdapter, StoreError,
    ValidationError,
    model::{CONNECTION_SORT_PREFIX, CONNECTION_TYPE, attr},
};
use futures::future::join_all;

/// Attributes read when scanning the whole table for connection records.
const CONNECTION_PROJECTION: [&str; 5] =
    [attr::TYPE, attr::CHANNEL, attr::CONNECTION_ID, attr::ENDPOINT, attr::TYPE_SK];

/// Outcome of removing every record of one connection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeregisterReport {
    /// Keys deleted (or already absent)
    pub removed: Vec<ItemKey>,
    /// Keys whose delete failed, with the failure
    pub failed: Vec<(ItemKey, StoreError)>,
}

impl DeregisterReport {
    /// Returns true if every delete succeeded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Membership records for live connections.
///
/// Cheap to clone when the store is (all stores in this crate are handles).
#[derive(Clone)]
pub struct ConnectionRegistry<S: StoreAdapter> {
    store: S,
}

impl<S: StoreAdapter> ConnectionRegistry<S> {
    /// Create a registry over `store`.
    ///
    /// The store must answer queries on [`BY_TYPE_INDEX`].
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upsert the record for (`channel`, `connection_id`).
    ///
    /// Registering the same pair twice leaves exactly one record holding the
    /// latest endpoint.
    ///
    /// # Errors
    ///
    /// - `RelayError::Validation` if `channel` is empty. Nothing is written.
    /// - `RelayError::Store` if the put fails.
    pub async fn register(
        &self,
        channel: &str,
        connection_id: &str,
        endpoint: &str,
    ) -> Result<Connection, RelayError> {
        let channel = ValidationError::require("channel", Some(channel))?;
        let connection = Connection::new(channel, connection_id, endpoint);

        self.store.put(Item::from(&connection)).await?;

        tracing::debug!(channel, connection_id, "connection registered");
        Ok(connection)
    }

    /// Snapshot of every record in `channel`, in no particular order.
    ///
    /// Records that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// `StoreError` if the query fails.
    pub async fn list_live(&self, channel: &str) -> Result<Vec<Connection>, StoreError> {
        let items = self.store.query(channel, CONNECTION_SORT_PREFIX).await?;
        Ok(items.iter().filter_map(decode_or_skip).collect())
    }

    /// Every connection record in the table, across all channels.
    ///
    /// Full scan. Used at startup to find records left by a previous process.
    /// Records that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// `StoreError` if the scan fails.
    pub async fn list_all(&self) -> Result<Vec<Connection>, StoreError> {
        let items = self.store.scan(&CONNECTION_PROJECTION).await?;
        Ok(items
            .iter()
            .filter(|item| item.str_attr(attr::TYPE) == Some(CONNECTION_TYPE))
            .filter_map(decode_or_skip)
            .collect())
    }

    /// Delete every record of `connection_id`, in every channel it joined.
    ///
    /// Deletes run concurrently. A failed delete is recorded in the report and
    /// does not stop the others; deleting a record that is already gone counts
    /// as removed.
    ///
    /// # Errors
    ///
    /// `StoreError` if the index lookup fails. No delete is attempted then.
    pub async fn deregister_by_connection(
        &self,
        connection_id: &str,
    ) -> Result<DeregisterReport, StoreError> {
        let records =
            self.store.query_by_index(&BY_TYPE_INDEX, CONNECTION_TYPE, connection_id).await?;

        let deletes = records.into_iter().map(|item| async move {
            let result = self.store.delete(&item.key).await;
            (item.key, result)
        });

        let mut report = DeregisterReport::default();
        for (key, result) in join_all(deletes).await {
            match result {
                Ok(()) => report.removed.push(key),
                Err(err) => {
                    tracing::warn!(connection_id, %key, error = %err, "connection delete failed");
                    report.failed.push((key, err));
                },
            }
        }

        tracing::debug!(
            connection_id,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "connection deregistered"
        );
        Ok(report)
    }
}

fn decode_or_skip(item: &Item) -> Option<Connection> {
    match Connection::try_from(item) {
        Ok(connection) => Some(connection),
        Err(err) => {
            tracing::warn!(key = %item.key, error = %err, "skipping unreadable connection record");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CONTENT_INDEXES, MemoryStore};

    fn registry() -> ConnectionRegistry<MemoryStore> {
        ConnectionRegistry::new(MemoryStore::with_indexes(&CONTENT_INDEXES))
    }

    #[tokio::test]
    async fn register_then_list() {
        let registry = registry();
        registry.register("lobby", "a", "host/dev").await.unwrap();
        registry.register("lobby", "b", "host/dev").await.unwrap();
        registry.register("other", "c", "host/dev").await.unwrap();

        let mut ids: Vec<_> = registry
            .list_live("lobby")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.connection_id)
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn list_live_skips_chat_logs_in_the_same_partition() {
        let registry = registry();
        registry.register("lobby", "a", "host/dev").await.unwrap();
        registry
            .store()
            .put(Item::new(ItemKey::new("lobby", "ChatLog#2019-11-14T00:00:00.000Z")))
            .await
            .unwrap();

        assert_eq!(registry.list_live("lobby").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_record_does_not_hide_the_channel() {
        let registry = registry();
        registry.register("lobby", "a", "host/dev").await.unwrap();
        // Typed as a connection but missing its connection id
        let broken =
            Item::new(ItemKey::new("lobby", "Connection#broken")).with_str(attr::TYPE, CONNECTION_TYPE);
        registry.store().put(broken).await.unwrap();

        let live = registry.list_live("lobby").await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].connection_id, "a");
        assert_eq!(registry.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_all_finds_every_channel() {
        let registry = registry();
        registry.register("one", "a", "host/dev").await.unwrap();
        registry.register("two", "a", "host/dev").await.unwrap();
        registry
            .store()
            .put(Item::new(ItemKey::new("one", "ChatLog#2019-11-14T00:00:00.000Z")))
            .await
            .unwrap();

        let all = registry.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|c| c.connection_id == "a" && c.endpoint == "host/dev"));
    }

    #[tokio::test]
    async fn deregister_unknown_connection_is_empty_report() {
        let registry = registry();
        let report = registry.deregister_by_connection("ghost").await.unwrap();

        assert!(report.removed.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn deregister_without_index_fails_before_deleting() {
        let registry = ConnectionRegistry::new(MemoryStore::new());
        registry.register("lobby", "a", "host/dev").await.unwrap();

        let result = registry.deregister_by_connection("a").await;

        assert!(matches!(result, Err(StoreError::UnknownIndex(_))));
        assert_eq!(registry.store().item_count(), 1);
    }
}
