//! Alert consumer behaviour: one alert and one ticket per event, ordered,
//! idempotent, and resumable after failures.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fleetwatch_core::device::MAX_ALERT_MESSAGE_LEN;
use fleetwatch_core::types::STREAM_START;
use fleetwatch_db::models::alert::CreateAlert;
use fleetwatch_db::models::status::TicketStatus;
use fleetwatch_events::{EventStream, MemoryStream};
use fleetwatch_pipeline::{AlertConsumer, BatchReport, MemoryStore, Store};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{append_down, consumer_config, eventually, register, FlakyStore, FlakyStream, STREAM};

// ---------------------------------------------------------------------------
// Test: every event becomes exactly one alert and one open ticket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_event_creates_one_alert_and_one_ticket() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let a = register(&*store, "rtr-a").await;
    let b = register(&*store, "rtr-b").await;

    let e1 = append_down(&*stream, &a).await;
    let e2 = append_down(&*stream, &b).await;
    let e3 = append_down(&*stream, &a).await;

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let report = consumer.poll().await.unwrap();
    assert_eq!(
        report,
        BatchReport {
            created: 3,
            ..Default::default()
        }
    );
    assert_eq!(consumer.cursor(), e3);
    assert_eq!(store.load_cursor("test_worker").await.unwrap(), Some(e3));

    let alerts = store.list_alerts().await.unwrap();
    let tickets = store.list_tickets().await.unwrap();
    assert_eq!(alerts.len(), 3);
    assert_eq!(tickets.len(), 3);

    let sources: HashSet<_> = alerts.iter().map(|a| a.source_event_id).collect();
    assert_eq!(sources, HashSet::from([e1, e2, e3]));

    for alert in &alerts {
        assert_eq!(alert.severity, "CRITICAL");
        let ticket = tickets.iter().find(|t| t.alert_id == alert.id).unwrap();
        assert_eq!(ticket.device_id, alert.device_id);
        assert_eq!(ticket.description, alert.message);
        assert_eq!(ticket.status(), Some(TicketStatus::Open));
    }
}

// ---------------------------------------------------------------------------
// Test: replay after a cursor reset is absorbed by the idempotency check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replay_after_cursor_reset_creates_no_duplicates() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "sw-9").await;
    for _ in 0..3 {
        append_down(&*stream, &d).await;
    }

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    consumer.poll().await.unwrap();

    store
        .save_cursor("test_worker", STREAM, STREAM_START)
        .await
        .unwrap();

    let mut restarted = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    assert_eq!(restarted.load_cursor().await.unwrap(), STREAM_START);
    let report = restarted.poll().await.unwrap();

    assert_eq!(report.created, 0);
    assert_eq!(report.duplicates, 3);
    assert_eq!(store.list_alerts().await.unwrap().len(), 3);
    assert_eq!(store.list_tickets().await.unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Test: alerts are created in stream order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn alerts_follow_stream_order() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let devices = [
        register(&*store, "n1").await,
        register(&*store, "n2").await,
        register(&*store, "n3").await,
    ];

    let mut expected = Vec::new();
    for d in devices.iter().chain(devices.iter().rev()) {
        expected.push((append_down(&*stream, d).await, d.id));
    }

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    consumer.poll().await.unwrap();

    let mut alerts = store.list_alerts().await.unwrap();
    alerts.sort_by_key(|a| a.id);
    let created: Vec<_> = alerts
        .iter()
        .map(|a| (a.source_event_id, a.device_id))
        .collect();
    assert_eq!(created, expected);
}

// ---------------------------------------------------------------------------
// Test: an empty stream yields an empty batch after the block timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_read_returns_empty_batch() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let mut consumer = AlertConsumer::new(store, stream, consumer_config());

    let report = tokio::time::timeout(Duration::from_secs(1), consumer.poll())
        .await
        .expect("read did not honour its block timeout")
        .unwrap();

    assert_eq!(report, BatchReport::default());
    assert_eq!(consumer.cursor(), STREAM_START);
}

// ---------------------------------------------------------------------------
// Test: alert written, ticket failed; the retry creates only the ticket
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ticket_failure_holds_cursor_and_retry_repairs() {
    let store = Arc::new(FlakyStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "core-1").await;

    for _ in 0..6 {
        append_down(&*stream, &d).await;
    }
    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    assert_eq!(consumer.poll().await.unwrap().created, 6);
    assert_eq!(consumer.cursor(), 6);

    let seventh = append_down(&*stream, &d).await;
    assert_eq!(seventh, 7);

    store.fail_tickets(true);
    let report = consumer.poll().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(consumer.cursor(), 6);
    assert_eq!(store.list_alerts().await.unwrap().len(), 7);
    assert_eq!(store.list_tickets().await.unwrap().len(), 6);

    store.fail_tickets(false);
    let report = consumer.poll().await.unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(report.created, 0);
    assert_eq!(consumer.cursor(), 7);

    let alerts = store.list_alerts().await.unwrap();
    let tickets = store.list_tickets().await.unwrap();
    assert_eq!(alerts.len(), 7);
    assert_eq!(tickets.len(), 7);
    let seventh_alert = alerts.iter().find(|a| a.source_event_id == 7).unwrap();
    assert!(tickets.iter().any(|t| t.alert_id == seventh_alert.id));
}

// ---------------------------------------------------------------------------
// Test: a failing event blocks the cursor but later events are attempted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_event_blocks_cursor_but_not_later_work() {
    let store = Arc::new(FlakyStore::new());
    let stream = Arc::new(MemoryStream::new());
    let ok = register(&*store, "ok-1").await;
    let bad = register(&*store, "bad-1").await;

    let e1 = append_down(&*stream, &ok).await;
    let e2 = append_down(&*stream, &bad).await;
    let e3 = append_down(&*stream, &ok).await;

    store.fail_alerts_for(Some(bad.id));
    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let report = consumer.poll().await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(consumer.cursor(), e1);

    store.fail_alerts_for(None);
    let report = consumer.poll().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(consumer.cursor(), e3);

    let sources: HashSet<_> = store
        .list_alerts()
        .await
        .unwrap()
        .iter()
        .map(|a| a.source_event_id)
        .collect();
    assert_eq!(sources, HashSet::from([e1, e2, e3]));
}

// ---------------------------------------------------------------------------
// Test: events that can never be stored are skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poison_events_are_skipped() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "edge-4").await;

    stream
        .append(STREAM, &json!({ "device_id": "not-a-number", "message": "x", "severity": "CRITICAL" }))
        .await
        .unwrap();
    stream
        .append(STREAM, &json!({ "device_id": 999, "message": "ghost is DOWN", "severity": "CRITICAL" }))
        .await
        .unwrap();
    let good = append_down(&*stream, &d).await;

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let report = consumer.poll().await.unwrap();

    assert_eq!(report.poison_skipped, 2);
    assert_eq!(report.created, 1);
    assert_eq!(consumer.cursor(), good);
    assert_eq!(store.list_alerts().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: a message too long for the alerts table is skipped, not retried
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlong_message_is_skipped_and_cursor_moves_on() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "wan-1").await;

    let long = stream
        .append(
            STREAM,
            &json!({
                "device_id": d.id,
                "message": "x".repeat(MAX_ALERT_MESSAGE_LEN + 1),
                "severity": "CRITICAL",
            }),
        )
        .await
        .unwrap();
    let good = append_down(&*stream, &d).await;

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let report = consumer.poll().await.unwrap();

    assert_eq!(
        report,
        BatchReport {
            created: 1,
            poison_skipped: 1,
            ..Default::default()
        }
    );
    assert!(consumer.cursor() > long);
    assert_eq!(consumer.cursor(), good);
    assert_eq!(store.load_cursor("test_worker").await.unwrap(), Some(good));

    let alerts = store.list_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].source_event_id, good);

    // Nothing is left to re-read.
    assert_eq!(consumer.poll().await.unwrap(), BatchReport::default());
}

// ---------------------------------------------------------------------------
// Test: a failed cursor save still advances in memory; replay is harmless
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cursor_save_failure_advances_in_memory_and_replay_is_absorbed() {
    let store = Arc::new(FlakyStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "vpn-1").await;
    let first = append_down(&*stream, &d).await;
    store.fail_cursor_saves(true);

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let report = consumer.poll().await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(consumer.cursor(), first);
    assert_eq!(store.load_cursor("test_worker").await.unwrap(), None);

    // Restart before any save went through.
    store.fail_cursor_saves(false);
    let mut restarted = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    assert_eq!(restarted.load_cursor().await.unwrap(), STREAM_START);

    let report = restarted.poll().await.unwrap();
    assert_eq!(
        report,
        BatchReport {
            duplicates: 1,
            ..Default::default()
        }
    );
    assert_eq!(restarted.cursor(), first);
    assert_eq!(store.load_cursor("test_worker").await.unwrap(), Some(first));
    assert_eq!(store.list_alerts().await.unwrap().len(), 1);
    assert_eq!(store.list_tickets().await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: the startup scan opens tickets for orphaned alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repair_scan_opens_missing_tickets() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "core-2").await;

    let orphan = store
        .create_alert(&CreateAlert {
            device_id: d.id,
            message: "core-2 is DOWN".to_string(),
            severity: "CRITICAL".to_string(),
            source_event_id: 41,
        })
        .await
        .unwrap();

    let consumer = AlertConsumer::new(store.clone(), stream, consumer_config());
    assert_eq!(consumer.repair_orphans().await.unwrap(), 1);
    assert_eq!(consumer.repair_orphans().await.unwrap(), 0);

    let ticket = store.find_ticket_by_alert(orphan.id).await.unwrap().unwrap();
    assert_eq!(ticket.description, "core-2 is DOWN");
    assert!(store.list_alerts_without_ticket().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: run() resumes from the persisted cursor and stops on cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_resumes_from_saved_cursor() {
    let store = Arc::new(FlakyStore::new());
    let stream = Arc::new(MemoryStream::new());
    let d = register(&*store, "agg-1").await;

    let handled = append_down(&*stream, &d).await;
    store.save_cursor("test_worker", STREAM, handled).await.unwrap();
    store.fail_cursor_loads(2);

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };

    let fresh = append_down(&*stream, &d).await;
    let done = eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.find_alert_by_source_event(fresh).await.unwrap().is_some() }
    })
    .await;
    assert!(done, "event appended after startup was not consumed");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("consumer did not stop")
        .unwrap();

    // The event behind the saved cursor was never reprocessed.
    assert!(store
        .find_alert_by_source_event(handled)
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.load_cursor("test_worker").await.unwrap(), Some(fresh));
}

// ---------------------------------------------------------------------------
// Test: read failures back off and recover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_backs_off_on_read_failure_and_recovers() {
    let store = Arc::new(MemoryStore::new());
    let stream = Arc::new(FlakyStream::new());
    let d = register(&*store, "agg-2").await;
    stream.fail_reads(true);

    let mut consumer = AlertConsumer::new(store.clone(), stream.clone(), consumer_config());
    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { consumer.run(cancel).await })
    };

    let retried = eventually(Duration::from_secs(2), || {
        let stream = stream.clone();
        async move { stream.reads() >= 3 }
    })
    .await;
    assert!(retried, "consumer did not retry failed reads");

    append_down(&*stream, &d).await;
    stream.fail_reads(false);

    let recovered = eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.list_tickets().await.unwrap().len() == 1 }
    })
    .await;
    assert!(recovered, "consumer did not recover after reads came back");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("consumer did not stop")
        .unwrap();
}
