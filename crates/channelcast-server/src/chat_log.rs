//! Per-channel, per-day message log.
//!
//! Append is read-modify-write of the whole day record: get (or start empty),
//! push the entry, put it back. There is no conditional write, so two writers
//! appending to the same bucket at the same time can lose one entry. The last
//! put wins.

use channelcast_core::{ChatEntry, ChatLog, DayBucket, Item, StoreAdapter, StoreError};
use chrono::{DateTime, FixedOffset};

/// Append-only chat log over the content table.
#[derive(Clone)]
pub struct ChatLogStore<S: StoreAdapter> {
    store: S,
}

impl<S: StoreAdapter> ChatLogStore<S> {
    /// Create a log store over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Append `entry` to the log of `channel` for the local day of `now`.
    ///
    /// Returns the bucket the entry was filed under.
    ///
    /// # Errors
    ///
    /// `StoreError` if the read or the write fails. A failed read writes
    /// nothing.
    pub async fn append(
        &self,
        channel: &str,
        entry: ChatEntry,
        now: DateTime<FixedOffset>,
    ) -> Result<DayBucket, StoreError> {
        let day = DayBucket::from_local(now);

        let mut log = self.load(channel, day).await?;
        log.entries.push(entry);

        self.store.put(Item::from(&log)).await?;

        tracing::trace!(channel, day = %day.date(), entries = log.entries.len(), "chat log appended");
        Ok(day)
    }

    /// Log of `channel` for `day`. Empty if nothing was posted that day.
    ///
    /// # Errors
    ///
    /// `StoreError` if the read fails or the stored record is malformed.
    pub async fn load(&self, channel: &str, day: DayBucket) -> Result<ChatLog, StoreError> {
        match self.store.get(&ChatLog::key_for(channel, day)).await? {
            Some(item) => ChatLog::try_from(&item),
            None => Ok(ChatLog::empty(channel, day)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::storage::MemoryStore;

    fn at(offset_hours: i32, y: i32, m: u32, d: u32, hh: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, hh, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn first_append_creates_the_day() {
        let store = MemoryStore::new();
        let log = ChatLogStore::new(store.clone());

        let day = log.append("lobby", ChatEntry::new("a", "hi"), at(0, 2019, 11, 14, 9)).await.unwrap();

        assert_eq!(day.date(), NaiveDate::from_ymd_opt(2019, 11, 14).unwrap());
        assert_eq!(store.item_count(), 1);
        let stored = store.items().remove(0);
        assert_eq!(stored.key.sort, "ChatLog#2019-11-14T00:00:00.000Z");
    }

    #[tokio::test]
    async fn different_days_get_different_records() {
        let store = MemoryStore::new();
        let log = ChatLogStore::new(store.clone());

        log.append("lobby", ChatEntry::new("a", "late"), at(0, 2019, 11, 14, 23)).await.unwrap();
        log.append("lobby", ChatEntry::new("a", "early"), at(0, 2019, 11, 15, 0)).await.unwrap();

        assert_eq!(store.item_count(), 2);
    }

    #[tokio::test]
    async fn local_day_wins_over_utc_day() {
        let store = MemoryStore::new();
        let log = ChatLogStore::new(store.clone());

        // 23:00 on the 14th in UTC-5 is already the 15th in UTC
        let day = log.append("lobby", ChatEntry::new("a", "hi"), at(-5, 2019, 11, 14, 23)).await.unwrap();

        assert_eq!(day.date(), NaiveDate::from_ymd_opt(2019, 11, 14).unwrap());
    }

    #[tokio::test]
    async fn load_of_missing_day_is_empty() {
        let log = ChatLogStore::new(MemoryStore::new());
        let day = DayBucket::from_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());

        let loaded = log.load("lobby", day).await.unwrap();
        assert_eq!(loaded, ChatLog::empty("lobby", day));
    }
}
