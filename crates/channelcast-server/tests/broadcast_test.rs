//! Broadcast router tests.
//!
//! Deterministic clock and scripted push outcomes from the harness.

use channelcast_core::{ChatEntry, DayBucket, DeliveryOutcome, RelayError, StoreError};
use channelcast_harness::{FaultyStore, ScriptedPush, SimEnv};
use channelcast_server::{BroadcastRouter, ChaoticStore, MemoryStore, storage::CONTENT_INDEXES};
use chrono::NaiveDate;

fn store() -> MemoryStore {
    MemoryStore::with_indexes(&CONTENT_INDEXES)
}

fn day(y: i32, m: u32, d: u32) -> DayBucket {
    DayBucket::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

#[tokio::test]
async fn gone_member_is_pruned_others_delivered() {
    let push = ScriptedPush::new().with("B", DeliveryOutcome::Gone);
    let router = BroadcastRouter::new(store(), push.clone(), SimEnv::local(0, 2019, 11, 14, 10, 0));

    for id in ["A", "B", "C"] {
        router.registry().register("lobby", id, "host/dev").await.unwrap();
    }
    // B also sits in another channel; the prune removes it there too
    router.registry().register("elsewhere", "B", "host/dev").await.unwrap();

    let report = router.handle_inbound("lobby", "S", "hello", "host/dev").await.unwrap();

    assert_eq!(report.attempted(), 3);
    let mut delivered = report.delivered.clone();
    delivered.sort();
    assert_eq!(delivered, vec!["A", "C"]);
    assert_eq!(report.pruned, vec!["B"]);
    assert!(report.failed.is_empty());
    assert_eq!(push.delivered_to(), vec!["A", "C"]);

    let mut live: Vec<_> = router
        .registry()
        .list_live("lobby")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.connection_id)
        .collect();
    live.sort();
    assert_eq!(live, vec!["A", "C"]);
    assert!(router.registry().list_live("elsewhere").await.unwrap().is_empty());
}

#[tokio::test]
async fn gone_member_whose_cleanup_fails_is_still_a_successful_broadcast() {
    let inner = store();
    let push = ScriptedPush::new().with("B", DeliveryOutcome::Gone);
    let router = BroadcastRouter::new(
        FaultyStore::new(inner.clone()).fail_index_lookups(),
        push.clone(),
        SimEnv::local(0, 2019, 11, 14, 10, 0),
    );
    for id in ["A", "B"] {
        router.registry().register("lobby", id, "host/dev").await.unwrap();
    }

    let report = router.handle_inbound("lobby", "S", "hello", "host/dev").await.unwrap();

    assert_eq!(report.delivered, vec!["A"]);
    assert_eq!(report.prune_failed, vec!["B"]);
    assert!(report.pruned.is_empty());
    assert!(report.failed.is_empty());
    // Cleanup failed, so B's record stays for a later broadcast to retry
    assert_eq!(router.registry().list_live("lobby").await.unwrap().len(), 2);
}

#[tokio::test]
async fn two_messages_same_day_share_one_log() {
    let env = SimEnv::local(0, 2019, 11, 14, 9, 30);
    let store = store();
    let router = BroadcastRouter::new(store.clone(), ScriptedPush::new(), env.clone());

    router.handle_inbound("lobby", "A", "first", "host/dev").await.unwrap();
    env.advance(chrono::TimeDelta::hours(5));
    router.handle_inbound("lobby", "B", "second", "host/dev").await.unwrap();

    let log = router.chat_log().load("lobby", day(2019, 11, 14)).await.unwrap();
    assert_eq!(log.entries, vec![ChatEntry::new("A", "first"), ChatEntry::new("B", "second")]);
    assert_eq!(store.item_count(), 1);
}

#[tokio::test]
async fn messages_across_midnight_split_logs() {
    let env = SimEnv::local(0, 2019, 11, 14, 23, 59);
    let router = BroadcastRouter::new(store(), ScriptedPush::new(), env.clone());

    router.handle_inbound("lobby", "A", "late", "host/dev").await.unwrap();
    env.advance(chrono::TimeDelta::minutes(2));
    router.handle_inbound("lobby", "A", "early", "host/dev").await.unwrap();

    let first = router.chat_log().load("lobby", day(2019, 11, 14)).await.unwrap();
    let second = router.chat_log().load("lobby", day(2019, 11, 15)).await.unwrap();
    assert_eq!(first.entries, vec![ChatEntry::new("A", "late")]);
    assert_eq!(second.entries, vec![ChatEntry::new("A", "early")]);
}

#[tokio::test]
async fn log_failure_aborts_before_any_push() {
    let inner = store();
    let setup = BroadcastRouter::new(inner.clone(), ScriptedPush::new(), SimEnv::local(0, 2019, 11, 14, 10, 0));
    setup.registry().register("lobby", "A", "host/dev").await.unwrap();

    let push = ScriptedPush::new();
    let router = BroadcastRouter::new(
        ChaoticStore::new(inner.clone(), 1.0),
        push.clone(),
        SimEnv::local(0, 2019, 11, 14, 10, 0),
    );

    let err = router.handle_inbound("lobby", "S", "hello", "host/dev").await.unwrap_err();

    assert!(matches!(err, RelayError::Store(StoreError::Io(_))));
    assert_eq!(err.status_code(), 500);
    assert!(push.deliveries().is_empty());
    assert_eq!(inner.item_count(), 1);
}

#[tokio::test]
async fn empty_channel_is_rejected_without_writes() {
    let store = store();
    let push = ScriptedPush::new();
    let router = BroadcastRouter::new(store.clone(), push.clone(), SimEnv::local(0, 2019, 11, 14, 10, 0));

    let err = router.handle_inbound("", "S", "hello", "host/dev").await.unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.status_code(), 400);
    assert_eq!(store.item_count(), 0);
    assert!(push.deliveries().is_empty());
}
