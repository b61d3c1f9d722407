//! Integration tests for the outbox publisher.
//!
//! The in-memory tests run everywhere. The Postgres tests require a running
//! database and the `DATABASE_URL` environment variable. Run them with:
//!
//! ```bash
//! DATABASE_URL="postgresql://..." cargo test -p herald-outbox --test integration -- --ignored --nocapture
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;

use herald_common::bus::MemoryBus;
use herald_common::queues;
use herald_common::types::{LedgerStatus, OutboxStatus, RecipientType, RoutingMessage};
use herald_outbox::ledger::{IdempotencyLedger, LedgerClaim, PgLedger};
use herald_outbox::memory::{MemoryEventStore, MemoryLedger};
use herald_outbox::publisher::{OutboxPublisher, PublishOutcome, PublisherSettings};
use herald_outbox::store::{EventStore, NewOutboxEvent, PgOutboxStore};

fn memory_publisher() -> (Arc<MemoryEventStore>, Arc<MemoryLedger>, Arc<MemoryBus>, OutboxPublisher) {
    let store = Arc::new(MemoryEventStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let bus = Arc::new(MemoryBus::new());
    let publisher = OutboxPublisher::new(
        store.clone(),
        ledger.clone(),
        bus.clone(),
        PublisherSettings::default(),
    );
    (store, ledger, bus, publisher)
}

#[tokio::test]
async fn test_duplicate_event_id_publishes_once() {
    let (store, ledger, bus, publisher) = memory_publisher();

    for _ in 0..2 {
        store
            .append(
                NewOutboxEvent::new("RESERVATION_REQUESTED", "RESTAURANT", Some(3))
                    .with_event_id("dup-1")
                    .with_payload(json!({"initiated_by": "CUSTOMER", "customerName": "Ada"})),
            )
            .await
            .unwrap();
    }

    let report = publisher.poll_once().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.published, 1);
    assert_eq!(report.duplicates, 1);

    assert_eq!(bus.pending(queues::RESTAURANT_RESERVATIONS).len(), 1);
    assert_eq!(ledger.len(), 1);
    assert!(store.rows().iter().all(|row| row.status == OutboxStatus::Processed));
}

#[tokio::test]
async fn test_crash_after_marker_is_reclaimed_after_lease() {
    let (store, ledger, bus, publisher) = memory_publisher();
    let row = store
        .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("crashed"))
        .await
        .unwrap();

    // A previous instance claimed the event and died before publishing.
    ledger.try_insert("crashed", Duration::ZERO).await.unwrap();

    let outcome = publisher.publish_event(&row).await.unwrap();
    assert_eq!(outcome, PublishOutcome::Published);
    assert_eq!(bus.pending(queues::ADMIN).len(), 1);
    assert_eq!(ledger.status("crashed"), Some(LedgerStatus::Success));
}

#[tokio::test]
async fn test_crash_after_publish_heals_row_without_republishing() {
    let (store, ledger, bus, publisher) = memory_publisher();
    let row = store
        .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("half-done"))
        .await
        .unwrap();

    // Published and confirmed in the ledger, but the row update was lost.
    ledger.try_insert("half-done", Duration::from_secs(30)).await.unwrap();
    ledger.mark_success("half-done").await.unwrap();

    let report = publisher.poll_once().await.unwrap();
    assert_eq!(report.duplicates, 1);
    assert!(bus.pending(queues::ADMIN).is_empty());
    assert_eq!(store.get(row.id).unwrap().status, OutboxStatus::Processed);
}

#[tokio::test]
async fn test_broadcast_message_shape() {
    let (store, _ledger, bus, publisher) = memory_publisher();
    store
        .append(
            NewOutboxEvent::new("MAINTENANCE_WINDOW", "BROADCAST", None)
                .with_payload(json!({"audience": "CUSTOMER", "title": "Planned downtime"})),
        )
        .await
        .unwrap();

    publisher.poll_once().await.unwrap();

    let sent = bus.pending(queues::BROADCAST);
    assert_eq!(sent.len(), 1);
    let message: RoutingMessage = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(message.recipient_type, RecipientType::Broadcast);
    assert_eq!(message.payload["audience"], "CUSTOMER");
}

#[sqlx::test]
#[ignore] // Requires DATABASE_URL: run explicitly with --ignored
async fn test_pg_ledger_claims(pool: PgPool) {
    sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
    let ledger = PgLedger::new(pool.clone());
    let lease = Duration::from_secs(30);

    assert_eq!(ledger.try_insert("pg-1", lease).await.unwrap(), LedgerClaim::Acquired);
    assert_eq!(ledger.try_insert("pg-1", lease).await.unwrap(), LedgerClaim::InFlight);

    ledger.release("pg-1").await.unwrap();
    assert_eq!(ledger.try_insert("pg-1", lease).await.unwrap(), LedgerClaim::Reclaimed);

    ledger.mark_success("pg-1").await.unwrap();
    assert_eq!(ledger.try_insert("pg-1", lease).await.unwrap(), LedgerClaim::Forwarded);

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM processed_events WHERE event_id = 'pg-1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test]
#[ignore] // Requires DATABASE_URL: run explicitly with --ignored
async fn test_pg_publisher_duplicate_event_id(pool: PgPool) {
    sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
    let store = Arc::new(PgOutboxStore::new(pool.clone()));
    let bus = Arc::new(MemoryBus::new());
    let publisher = OutboxPublisher::new(
        store.clone(),
        Arc::new(PgLedger::new(pool.clone())),
        bus.clone(),
        PublisherSettings::default(),
    );

    for _ in 0..2 {
        store
            .append(
                NewOutboxEvent::new("ORDER_READY", "CUSTOMER", Some(11)).with_event_id("pg-dup"),
            )
            .await
            .unwrap();
    }

    let report = publisher.poll_once().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(bus.pending(queues::CUSTOMER).len(), 1);

    let stats = store.stats().await.unwrap();
    assert_eq!((stats.pending, stats.processed), (0, 2));
}

#[sqlx::test]
#[ignore] // Requires DATABASE_URL: run explicitly with --ignored
async fn test_pg_store_failure_bookkeeping(pool: PgPool) {
    sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
    let store = PgOutboxStore::new(pool);

    let row = store
        .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None))
        .await
        .unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert!(!row.event_id.is_empty());

    assert_eq!(store.record_failure(row.id, "bus down").await.unwrap(), 1);
    assert_eq!(store.record_failure(row.id, "bus down").await.unwrap(), 2);
    store.mark_failed(row.id).await.unwrap();
    assert_eq!(store.stats().await.unwrap().failed, 1);
    assert!(store.fetch_pending(10).await.unwrap().is_empty());

    assert!(store.requeue(row.id).await.unwrap());
    assert!(!store.requeue(row.id).await.unwrap());
    let pending = store.fetch_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 0);
}

#[sqlx::test]
#[ignore] // Requires DATABASE_URL: run explicitly with --ignored
async fn test_pg_fetch_pending_puts_failing_rows_last(pool: PgPool) {
    sqlx::migrate!("../../migrations").run(&pool).await.unwrap();
    let store = PgOutboxStore::new(pool);

    let stuck = store
        .append(NewOutboxEvent::new("X", "WAREHOUSE", Some(1)))
        .await
        .unwrap();
    store.record_failure(stuck.id, "no queue").await.unwrap();
    let fresh = store
        .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None))
        .await
        .unwrap();

    let batch = store.fetch_pending(1).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, fresh.id);
}
