//! Records and key layout.
//!
//! Both record kinds share one table and are partitioned by channel:
//!
//! ```text
//! pk        sk                                   attributes
//! ────────  ───────────────────────────────────  ─────────────────────────────
//! <channel> Connection#<connectionId>            type, typeSk, channel,
//!                                                connectionId, endpoint
//! <channel> ChatLog#2019-11-14T00:00:00.000Z     log: [{connectionId, message}]
//! ```
//!
//! Connection items also appear in the `ByType` secondary index under
//! (`"Connection"`, connectionId), which is how a disconnect finds every
//! channel a session joined.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat, TimeDelta, Utc};

use crate::store::{Attribute, Item, ItemKey, SecondaryIndex, StoreError};

/// Entity-type tag stored on connection items.
pub const CONNECTION_TYPE: &str = "Connection";

/// Sort-key prefix of connection items.
pub const CONNECTION_SORT_PREFIX: &str = "Connection#";

/// Sort-key prefix of chat log items.
pub const CHAT_LOG_SORT_PREFIX: &str = "ChatLog#";

/// Secondary index from (entity type, connection id) to items.
pub const BY_TYPE_INDEX: SecondaryIndex =
    SecondaryIndex { name: "ByType", partition_attr: attr::TYPE, sort_attr: attr::TYPE_SK };

/// Attribute names as they appear at rest.
pub mod attr {
    /// Entity-type tag (index partition)
    pub const TYPE: &str = "type";
    /// Index sort key (the connection id for connections)
    pub const TYPE_SK: &str = "typeSk";
    /// Channel name
    pub const CHANNEL: &str = "channel";
    /// Connection id
    pub const CONNECTION_ID: &str = "connectionId";
    /// Push endpoint
    pub const ENDPOINT: &str = "endpoint";
    /// Chat log entries
    pub const LOG: &str = "log";
    /// Chat message payload
    pub const MESSAGE: &str = "message";
}

/// One live member of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Channel joined (partition key)
    pub channel: String,
    /// Transport session id
    pub connection_id: String,
    /// Address used to push to this connection
    pub endpoint: String,
}

impl Connection {
    /// Construct a connection record.
    pub fn new(
        channel: impl Into<String>,
        connection_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            connection_id: connection_id.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Primary key of the record for (`channel`, `connection_id`).
    pub fn key_for(channel: &str, connection_id: &str) -> ItemKey {
        ItemKey::new(channel, format!("{CONNECTION_SORT_PREFIX}{connection_id}"))
    }

    /// Primary key of this record.
    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.channel, &self.connection_id)
    }
}

impl From<&Connection> for Item {
    fn from(conn: &Connection) -> Self {
        Item::new(conn.key())
            .with_str(attr::TYPE, CONNECTION_TYPE)
            .with_str(attr::TYPE_SK, conn.connection_id.as_str())
            .with_str(attr::CHANNEL, conn.channel.as_str())
            .with_str(attr::CONNECTION_ID, conn.connection_id.as_str())
            .with_str(attr::ENDPOINT, conn.endpoint.as_str())
    }
}

impl TryFrom<&Item> for Connection {
    type Error = StoreError;

    /// Records written before endpoints were stored decode with an empty
    /// endpoint. The channel falls back to the partition key.
    fn try_from(item: &Item) -> Result<Self, Self::Error> {
        if item.str_attr(attr::TYPE) != Some(CONNECTION_TYPE) {
            return Err(StoreError::malformed(&item.key, "not a connection item"));
        }

        let connection_id = item
            .str_attr(attr::CONNECTION_ID)
            .ok_or_else(|| StoreError::malformed(&item.key, "missing connectionId"))?;
        let channel = item.str_attr(attr::CHANNEL).unwrap_or(item.key.partition.as_str());
        let endpoint = item.str_attr(attr::ENDPOINT).unwrap_or_default();

        Ok(Self::new(channel, connection_id, endpoint))
    }
}

/// Calendar day a chat message is filed under.
///
/// Derived from the caller's local clock and represented as the UTC midnight
/// of that local date, so two timestamps on the same local day always map to
/// the same bucket no matter what their time of day or offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayBucket(NaiveDate);

impl DayBucket {
    /// Bucket for a local timestamp.
    ///
    /// Shifts the instant forward by the local UTC offset so its UTC fields
    /// read as local wall time, then zeroes the time of day.
    pub fn from_local(now: DateTime<FixedOffset>) -> Self {
        let offset = TimeDelta::seconds(i64::from(now.offset().local_minus_utc()));
        let wall = now.naive_utc() + offset;
        Self(wall.date())
    }

    /// Bucket for a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The calendar date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// UTC midnight at the start of this day.
    pub fn midnight_utc(&self) -> DateTime<Utc> {
        self.0.and_time(NaiveTime::MIN).and_utc()
    }

    /// Sort key, e.g. `ChatLog#2019-11-14T00:00:00.000Z`.
    pub fn sort_key(&self) -> String {
        let stamp = self.midnight_utc().to_rfc3339_opts(SecondsFormat::Millis, true);
        format!("{CHAT_LOG_SORT_PREFIX}{stamp}")
    }

    /// Inverse of [`DayBucket::sort_key`]. `None` if `sort_key` is not a
    /// chat log key.
    pub fn parse_sort_key(sort_key: &str) -> Option<Self> {
        let stamp = sort_key.strip_prefix(CHAT_LOG_SORT_PREFIX)?;
        let instant = DateTime::parse_from_rfc3339(stamp).ok()?;
        Some(Self(instant.naive_utc().date()))
    }
}

/// One message in a chat log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// Sender
    pub connection_id: String,
    /// Opaque payload
    pub message: String,
}

impl ChatEntry {
    /// Construct an entry.
    pub fn new(connection_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { connection_id: connection_id.into(), message: message.into() }
    }

    fn to_attribute(&self) -> Attribute {
        let mut map = BTreeMap::new();
        map.insert(attr::CONNECTION_ID.to_string(), Attribute::from(self.connection_id.as_str()));
        map.insert(attr::MESSAGE.to_string(), Attribute::from(self.message.as_str()));
        Attribute::M(map)
    }

    fn from_attribute(key: &ItemKey, value: &Attribute) -> Result<Self, StoreError> {
        let map = value.as_map().ok_or_else(|| StoreError::malformed(key, "log entry is not a map"))?;
        let field = |name: &str| {
            map.get(name)
                .and_then(Attribute::as_str)
                .ok_or_else(|| StoreError::malformed(key, format!("log entry missing {name}")))
        };

        Ok(Self::new(field(attr::CONNECTION_ID)?, field(attr::MESSAGE)?))
    }
}

/// All messages posted to one channel on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLog {
    /// Channel (partition key)
    pub channel: String,
    /// Day (sort key)
    pub day: DayBucket,
    /// Entries in append order
    pub entries: Vec<ChatEntry>,
}

impl ChatLog {
    /// Log with no entries.
    pub fn empty(channel: impl Into<String>, day: DayBucket) -> Self {
        Self { channel: channel.into(), day, entries: Vec::new() }
    }

    /// Primary key of the log for (`channel`, `day`).
    pub fn key_for(channel: &str, day: DayBucket) -> ItemKey {
        ItemKey::new(channel, day.sort_key())
    }

    /// Primary key of this log.
    pub fn key(&self) -> ItemKey {
        Self::key_for(&self.channel, self.day)
    }
}

impl From<&ChatLog> for Item {
    fn from(log: &ChatLog) -> Self {
        let entries = log.entries.iter().map(ChatEntry::to_attribute).collect();
        Item::new(log.key()).with(attr::LOG, Attribute::L(entries))
    }
}

impl TryFrom<&Item> for ChatLog {
    type Error = StoreError;

    fn try_from(item: &Item) -> Result<Self, Self::Error> {
        let day = DayBucket::parse_sort_key(&item.key.sort)
            .ok_or_else(|| StoreError::malformed(&item.key, "sort key is not a chat log day"))?;

        let entries = match item.get(attr::LOG) {
            None => Vec::new(),
            Some(value) => value
                .as_list()
                .ok_or_else(|| StoreError::malformed(&item.key, "log is not a list"))?
                .iter()
                .map(|entry| ChatEntry::from_attribute(&item.key, entry))
                .collect::<Result<_, _>>()?,
        };

        Ok(Self { channel: item.key.partition.clone(), day, entries })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn local(offset_hours: i32, y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .and_then(|tz| tz.with_ymd_and_hms(y, m, d, hh, mm, 0).single())
            .unwrap()
    }

    #[test]
    fn bucket_early_in_year() {
        let bucket = DayBucket::from_local(local(-7, 2020, 3, 5, 1, 0));
        assert_eq!(bucket.sort_key(), "ChatLog#2020-03-05T00:00:00.000Z");
    }

    #[test]
    fn bucket_end_of_year() {
        let bucket = DayBucket::from_local(local(-8, 2019, 11, 14, 13, 0));
        assert_eq!(bucket.sort_key(), "ChatLog#2019-11-14T00:00:00.000Z");
    }

    #[test]
    fn bucket_at_midnight() {
        let bucket = DayBucket::from_local(local(-7, 2020, 6, 1, 0, 0));
        assert_eq!(bucket.sort_key(), "ChatLog#2020-06-01T00:00:00.000Z");
    }

    #[test]
    fn bucket_just_before_midnight_stays_on_local_day() {
        // 23:59 local in UTC+10 is 13:59 UTC the same day; in UTC-10 it is
        // 09:59 UTC the next day. Both belong to the local day.
        for offset in [-10, 0, 10] {
            let bucket = DayBucket::from_local(local(offset, 2020, 6, 1, 23, 59));
            assert_eq!(bucket.date(), NaiveDate::from_ymd_opt(2020, 6, 1).unwrap(), "offset {offset}");
        }
    }

    #[test]
    fn bucket_same_throughout_day() {
        let keys: Vec<_> = [(8, 0), (9, 0), (12, 0), (17, 45)]
            .into_iter()
            .map(|(h, m)| DayBucket::from_local(local(-7, 2020, 6, 1, h, m)).sort_key())
            .collect();

        assert!(keys.iter().all(|k| k == "ChatLog#2020-06-01T00:00:00.000Z"), "{keys:?}");
    }

    #[test]
    fn bucket_differs_across_days_and_years() {
        let nov14 = DayBucket::from_local(local(0, 2019, 11, 14, 12, 0));
        let nov15 = DayBucket::from_local(local(0, 2019, 11, 15, 12, 0));
        assert_ne!(nov14, nov15);

        let dec31 = DayBucket::from_local(local(5, 2019, 12, 31, 23, 59));
        let jan01 = DayBucket::from_local(local(5, 2020, 1, 1, 0, 0));
        assert_ne!(dec31, jan01);
        assert_eq!(jan01.sort_key(), "ChatLog#2020-01-01T00:00:00.000Z");
        assert_eq!(dec31.sort_key(), "ChatLog#2019-12-31T00:00:00.000Z");
    }

    #[test]
    fn sort_key_parses_back() {
        let bucket = DayBucket::from_local(local(3, 2024, 2, 29, 7, 30));
        assert_eq!(DayBucket::parse_sort_key(&bucket.sort_key()), Some(bucket));
        assert_eq!(DayBucket::parse_sort_key("Connection#abc"), None);
        assert_eq!(DayBucket::parse_sort_key("ChatLog#yesterday"), None);
    }

    #[test]
    fn connection_item_layout() {
        let conn = Connection::new("channel#2", "NlrEScxHPHcCFug=", "example.com/Prod");
        let item = Item::from(&conn);

        assert_eq!(item.key, ItemKey::new("channel#2", "Connection#NlrEScxHPHcCFug="));
        assert_eq!(item.str_attr(attr::TYPE), Some("Connection"));
        assert_eq!(item.str_attr(attr::TYPE_SK), Some("NlrEScxHPHcCFug="));
        assert_eq!(item.str_attr(attr::CHANNEL), Some("channel#2"));
        assert_eq!(item.str_attr(attr::CONNECTION_ID), Some("NlrEScxHPHcCFug="));
        assert_eq!(item.str_attr(attr::ENDPOINT), Some("example.com/Prod"));
        assert_eq!(BY_TYPE_INDEX.key_of(&item), Some(("Connection", "NlrEScxHPHcCFug=")));
        assert_eq!(Connection::try_from(&item), Ok(conn));
    }

    #[test]
    fn connection_without_endpoint_decodes_empty() {
        let item = Item::new(Connection::key_for("lobby", "abc"))
            .with_str(attr::TYPE, CONNECTION_TYPE)
            .with_str(attr::TYPE_SK, "abc")
            .with_str(attr::CONNECTION_ID, "abc");

        let conn = Connection::try_from(&item).unwrap();
        assert_eq!(conn.channel, "lobby");
        assert_eq!(conn.endpoint, "");
    }

    #[test]
    fn chat_log_item_rejects_connection_item() {
        let conn = Connection::new("lobby", "abc", "e/p");
        let item = Item::from(&conn);

        assert!(matches!(ChatLog::try_from(&item), Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn chat_log_item_keeps_entry_order() {
        let day = DayBucket::from_date(NaiveDate::from_ymd_opt(2019, 11, 14).unwrap());
        let mut log = ChatLog::empty("lobby", day);
        log.entries.push(ChatEntry::new("a", "first"));
        log.entries.push(ChatEntry::new("b", "second"));

        let item = Item::from(&log);
        assert_eq!(item.key.sort, "ChatLog#2019-11-14T00:00:00.000Z");

        let decoded = ChatLog::try_from(&item).unwrap();
        assert_eq!(decoded, log);
    }
}
