//! Notification reconciler integration tests against an in-memory
//! collaborator fake.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{notification, MockApi};
use lancer_client::api::{ApiError, MarketplaceApi};
use lancer_client::notifications::{NotificationReconciler, ReconcilerConfig};
use lancer_events::bus::EventBus;
use lancer_events::protocol::{PushFrame, ServerEvent};

fn reconciler(api: &Arc<MockApi>) -> NotificationReconciler<MockApi> {
    NotificationReconciler::new(api.clone())
}

// ---------------------------------------------------------------------------
// Push path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_push_increments_unread_and_dedupes() {
    let api = Arc::new(MockApi::new());
    let feed = reconciler(&api);

    feed.apply_push(notification(1, false));
    feed.apply_push(notification(2, false));
    assert_eq!(feed.unread_count(), 2);
    assert_eq!(feed.notifications().len(), 2);

    // Redelivery of an id already in the feed changes nothing.
    feed.apply_push(notification(1, false));
    assert_eq!(feed.unread_count(), 2);
    assert_eq!(feed.notifications().len(), 2);
}

#[tokio::test]
async fn test_push_of_read_notification_leaves_counter() {
    let api = Arc::new(MockApi::new());
    let feed = reconciler(&api);

    feed.apply_push(notification(1, true));
    assert_eq!(feed.unread_count(), 0);
    assert_eq!(feed.notifications().len(), 1);
}

// ---------------------------------------------------------------------------
// Optimistic actions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mark_read_confirmed_by_server() {
    let api = Arc::new(MockApi::new());
    api.with_state(|s| s.notifications.push(notification(1, false)));
    let feed = reconciler(&api);
    feed.refresh().await.unwrap();
    assert_eq!(feed.unread_count(), 1);

    feed.mark_read(1).await.unwrap();

    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications()[0].read);
    // Server agrees.
    assert_eq!(api.unread_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_mark_read_rolls_back_on_server_failure() {
    let api = Arc::new(MockApi::new());
    api.with_state(|s| {
        s.notifications.push(notification(1, false));
        s.fail_mark_read = true;
    });
    let feed = reconciler(&api);
    feed.refresh().await.unwrap();

    let result = feed.mark_read(1).await;

    assert!(matches!(result, Err(ApiError::Server(_))));
    assert_eq!(feed.unread_count(), 1);
    assert!(!feed.notifications()[0].read);
}

#[tokio::test]
async fn test_mark_read_is_noop_for_already_read() {
    let api = Arc::new(MockApi::new());
    let feed = reconciler(&api);
    feed.apply_push(notification(1, true));

    feed.mark_read(1).await.unwrap();
    feed.mark_read(99).await.unwrap();

    assert_eq!(feed.unread_count(), 0);
}

#[tokio::test]
async fn test_mark_all_read_rolls_back_as_unit() {
    let api = Arc::new(MockApi::new());
    api.with_state(|s| {
        s.notifications.push(notification(1, false));
        s.notifications.push(notification(2, false));
        s.notifications.push(notification(3, true));
        s.fail_mark_all = true;
    });
    let feed = reconciler(&api);
    feed.refresh().await.unwrap();

    let result = feed.mark_all_read().await;

    // Nothing half-applied: both unread items are still unread.
    assert!(matches!(result, Err(ApiError::Server(_))));
    assert_eq!(feed.unread_count(), 2);
    assert_eq!(
        feed.notifications().iter().filter(|n| !n.read).count(),
        2
    );
}

#[tokio::test]
async fn test_delete_removes_and_rolls_back_on_failure() {
    let api = Arc::new(MockApi::new());
    api.with_state(|s| s.notifications.push(notification(1, false)));
    let feed = reconciler(&api);
    feed.refresh().await.unwrap();

    feed.delete(1).await.unwrap();
    assert!(feed.notifications().is_empty());
    assert_eq!(feed.unread_count(), 0);

    // Stage a second item whose delete fails server-side.
    feed.apply_push(notification(2, false));
    api.with_state(|s| s.fail_delete = true);
    assert!(feed.delete(2).await.is_err());
    assert_eq!(feed.notifications().len(), 1);
    assert_eq!(feed.unread_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_during_inflight_mark_read_survives_rollback() {
    let api = Arc::new(MockApi::new());
    api.with_state(|s| {
        s.notifications.push(notification(1, false));
        s.fail_mark_read = true;
        s.mark_read_delay = Some(Duration::from_millis(100));
    });
    let feed = Arc::new(reconciler(&api));
    feed.refresh().await.unwrap();

    // mark_read is held in flight server-side; a push lands meanwhile.
    let task = {
        let feed = feed.clone();
        tokio::spawn(async move { feed.mark_read(1).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    feed.apply_push(notification(2, false));

    assert!(task.await.unwrap().is_err());

    // The rollback restores item 1 only; the pushed item stays.
    let ids: Vec<_> = feed.notifications().iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(feed.unread_count(), 2);
    assert!(feed.notifications().iter().all(|n| !n.read));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missed_pushes_corrected_by_reconcile() {
    let api = Arc::new(MockApi::new());
    let feed = reconciler(&api);
    feed.refresh().await.unwrap();
    assert_eq!(feed.unread_count(), 0);

    // Three notifications created while the push channel was down.
    api.with_state(|s| {
        s.notifications.push(notification(1, false));
        s.notifications.push(notification(2, false));
        s.notifications.push(notification(3, false));
    });

    feed.reconcile_unread().await.unwrap();
    assert_eq!(feed.unread_count(), 3);

    feed.refresh().await.unwrap();
    assert_eq!(feed.notifications().len(), 3);
}

// ---------------------------------------------------------------------------
// Background task
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_run_applies_frames_and_refreshes_on_gap() {
    let api = Arc::new(MockApi::new());
    let feed = Arc::new(reconciler(&api));
    let bus = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();

    let task = tokio::spawn(feed.clone().run(
        ReconcilerConfig {
            reconcile_interval: Duration::from_secs(3600),
        },
        bus.clone(),
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    bus.publish(PushFrame {
        seq: Some(1),
        event: ServerEvent::NewNotification {
            notification: notification(1, false),
        },
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.unread_count(), 1);

    // seq 2 never arrives; the gap forces a full re-fetch from the
    // server, which has all three.
    api.with_state(|s| {
        s.notifications.push(notification(1, false));
        s.notifications.push(notification(2, false));
        s.notifications.push(notification(3, false));
    });
    bus.publish(PushFrame {
        seq: Some(3),
        event: ServerEvent::NewNotification {
            notification: notification(3, false),
        },
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(feed.notifications().len(), 3);
    assert_eq!(feed.unread_count(), 3);

    cancel.cancel();
    task.await.unwrap();
}
