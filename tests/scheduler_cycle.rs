// tests/scheduler_cycle.rs
// Poll cycle behavior: failure isolation, retry-on-failed-delivery,
// pointer monotonicity, re-entrancy.

mod common;

use common::{unresolvable, upload, RecordingNotifier, ScriptedSource};

use std::sync::Arc;

use channel_update_notifier::{
    CheckOutcome, PollScheduler, SubscriptionStore, SubscriptionId, WatchConfig, WatchError,
};

fn setup() -> (
    Arc<SubscriptionStore>,
    Arc<ScriptedSource>,
    Arc<RecordingNotifier>,
    PollScheduler,
) {
    setup_with(ScriptedSource::new())
}

fn setup_with(
    source: ScriptedSource,
) -> (
    Arc<SubscriptionStore>,
    Arc<ScriptedSource>,
    Arc<RecordingNotifier>,
    PollScheduler,
) {
    let store = Arc::new(SubscriptionStore::in_memory());
    let source = Arc::new(source);
    let notifier = Arc::new(RecordingNotifier::new());
    let scheduler = PollScheduler::new(
        store.clone(),
        source.clone(),
        notifier.clone(),
        WatchConfig::default(),
    );
    (store, source, notifier, scheduler)
}

#[tokio::test]
async fn one_failing_subscription_does_not_starve_the_others() {
    let (store, source, notifier, scheduler) = setup();
    store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();
    store.upsert("guild-1", "chan-b", "dest-b").await.unwrap();
    store.upsert("guild-1", "chan-c", "dest-c").await.unwrap();

    source.push_err(
        "chan-a",
        WatchError::SourceUnavailable("scripted outage".into()),
    );
    source.push_ok("chan-b", vec![upload("b1", 10)]);
    source.push_ok("chan-c", vec![upload("c1", 20)]);

    let summary = scheduler.run_cycle().await.unwrap();
    assert_eq!(summary.checked, 3);
    assert_eq!(summary.fetch_errors, 1);
    assert_eq!(summary.delivered, 2);

    let mut ids = notifier.delivered_ids();
    ids.sort();
    assert_eq!(ids, vec!["b1".to_string(), "c1".to_string()]);
}

#[tokio::test]
async fn failed_delivery_is_retried_with_the_same_item() {
    let (store, source, notifier, scheduler) = setup();
    let id = store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();

    source.push_ok("chan-a", vec![upload("v1", 10)]);
    source.push_ok("chan-a", vec![upload("v1", 10)]);
    notifier.fail_times(1);

    let summary = scheduler.run_cycle().await.unwrap();
    assert_eq!(summary.delivery_failures, 1);
    assert_eq!(summary.delivered, 0);

    // dedup state untouched: the pointer did not advance
    let sub = store.get(&id).await.unwrap();
    assert!(sub.last_seen.is_none());
    assert!(sub.notified.is_empty());

    let summary = scheduler.run_cycle().await.unwrap();
    assert_eq!(summary.delivered, 1);
    let sub = store.get(&id).await.unwrap();
    assert_eq!(sub.last_seen.unwrap().item_id, "v1");
    assert_eq!(notifier.delivered_ids(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn an_item_is_never_delivered_twice() {
    let (store, source, notifier, scheduler) = setup();
    store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();

    source.push_ok("chan-a", vec![upload("v1", 10)]);
    source.push_ok("chan-a", vec![upload("v1", 10)]);

    let first = scheduler.run_cycle().await.unwrap();
    let second = scheduler.run_cycle().await.unwrap();
    assert_eq!(first.delivered, 1);
    assert_eq!(second.delivered, 0);
    assert_eq!(notifier.delivered_ids(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn pointer_never_regresses_to_an_older_item() {
    let (store, source, notifier, scheduler) = setup();
    let id = store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();

    source.push_ok("chan-a", vec![upload("newer", 100)]);
    source.push_ok("chan-a", vec![upload("older", 50)]);

    scheduler.run_cycle().await.unwrap();
    scheduler.run_cycle().await.unwrap();

    // the older item is new by id and gets delivered, but the pointer
    // stays on the newer one
    assert_eq!(
        notifier.delivered_ids(),
        vec!["newer".to_string(), "older".to_string()]
    );
    let sub = store.get(&id).await.unwrap();
    assert_eq!(sub.last_seen.unwrap().item_id, "newer");
    assert!(sub.notified.contains("older", common::ts(50)));
}

#[tokio::test]
async fn overlapping_cycle_is_skipped_not_queued() {
    let (store, source, _notifier, scheduler) = setup_with(ScriptedSource::with_delay(300));
    store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();
    source.push_ok("chan-a", vec![upload("v1", 10)]);

    let slow = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_cycle().await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(scheduler.run_cycle().await.is_none());
    assert!(slow.await.unwrap().is_some());
}

#[tokio::test]
async fn unresolvable_items_are_discarded_and_never_marked_seen() {
    let (store, source, notifier, scheduler) = setup();
    let id = store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();

    source.push_ok("chan-a", vec![unresolvable(10)]);
    let outcome = scheduler.check_subscription(&id).await.unwrap();
    assert_eq!(outcome, CheckOutcome::Unresolved);
    assert!(notifier.deliveries().is_empty());

    // the same content later gains an id and must still be delivered
    source.push_ok("chan-a", vec![upload("v1", 10)]);
    let outcome = scheduler.check_subscription(&id).await.unwrap();
    assert!(matches!(outcome, CheckOutcome::Delivered(_)));
}

#[tokio::test]
async fn force_check_on_missing_subscription_reports_not_found() {
    let (_store, _source, _notifier, scheduler) = setup();
    let missing = SubscriptionId::new("guild-1", "chan-x");
    assert!(matches!(
        scheduler.check_subscription(&missing).await,
        Err(WatchError::NotFound(_))
    ));
}

#[tokio::test]
async fn poll_attempt_is_recorded_even_when_the_fetch_fails() {
    let (store, source, _notifier, scheduler) = setup();
    let id = store.upsert("guild-1", "chan-a", "dest-a").await.unwrap();

    source.push_err(
        "chan-a",
        WatchError::SourceUnavailable("scripted outage".into()),
    );
    let summary = scheduler.run_cycle().await.unwrap();
    assert_eq!(summary.fetch_errors, 1);

    let sub = store.get(&id).await.unwrap();
    assert!(sub.last_poll_at.is_some());
}
