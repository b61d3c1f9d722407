//! Outbox publisher: drains pending events onto the bus, once per event id.

use std::sync::Arc;
use std::time::Duration;

use herald_common::bus::MessageBus;
use herald_common::config::AppConfig;
use herald_common::error::AppError;
use herald_common::types::OutboxEvent;

use crate::envelope::routing_message;
use crate::ledger::{IdempotencyLedger, LedgerClaim};
use crate::routing::route;
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// How long a ledger claim stays exclusive.
    pub lease: Duration,
    /// Park an event as FAILED after this many failed publishes.
    pub max_attempts: Option<i32>,
}

impl PublisherSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.outbox_poll_interval_ms),
            batch_size: config.outbox_batch_size,
            lease: Duration::from_secs(config.outbox_lease_secs),
            max_attempts: config.outbox_max_attempts,
        }
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            lease: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

/// What happened to one event in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Already forwarded earlier; the row was healed to PROCESSED.
    Duplicate,
    /// Another publisher holds the claim.
    InFlight,
    /// Publish failed; the event stays PENDING.
    Retried,
    /// No queue for the event; stays PENDING for an operator.
    Unroutable,
    /// Publish failed too many times; the event is now FAILED.
    Parked,
}

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub published: usize,
    pub duplicates: usize,
    pub in_flight: usize,
    pub retried: usize,
    pub unroutable: usize,
    pub parked: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Published => self.published += 1,
            PublishOutcome::Duplicate => self.duplicates += 1,
            PublishOutcome::InFlight => self.in_flight += 1,
            PublishOutcome::Retried => self.retried += 1,
            PublishOutcome::Unroutable => self.unroutable += 1,
            PublishOutcome::Parked => self.parked += 1,
        }
    }
}

pub struct OutboxPublisher {
    store: Arc<dyn EventStore>,
    ledger: Arc<dyn IdempotencyLedger>,
    bus: Arc<dyn MessageBus>,
    settings: PublisherSettings,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<dyn EventStore>,
        ledger: Arc<dyn IdempotencyLedger>,
        bus: Arc<dyn MessageBus>,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            bus,
            settings,
        }
    }

    /// Poll forever at the configured cadence. A failed cycle is logged and
    /// retried on the next tick.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "Outbox publisher started"
        );

        loop {
            match self.poll_once().await {
                Ok(report) if report.fetched > 0 => {
                    tracing::info!(
                        fetched = report.fetched,
                        published = report.published,
                        duplicates = report.duplicates,
                        in_flight = report.in_flight,
                        retried = report.retried,
                        unroutable = report.unroutable,
                        parked = report.parked,
                        "Outbox cycle complete"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Outbox cycle failed, retrying next tick");
                }
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// One batch. Failures on single events never abort the batch.
    pub async fn poll_once(&self) -> Result<CycleReport, AppError> {
        let events = self.store.fetch_pending(self.settings.batch_size).await?;
        let mut report = CycleReport {
            fetched: events.len(),
            ..Default::default()
        };

        for event in &events {
            let outcome = match self.publish_event(event).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %e,
                        "Outbox event left pending after infrastructure error"
                    );
                    PublishOutcome::Retried
                }
            };
            report.record(outcome);
        }

        Ok(report)
    }

    /// Forward a single event.
    ///
    /// Errors are infrastructure failures of the store or the ledger; the
    /// event stays PENDING either way.
    pub async fn publish_event(&self, event: &OutboxEvent) -> Result<PublishOutcome, AppError> {
        let (queue, message) = match route(event).and_then(|q| Ok((q, routing_message(event)?))) {
            Ok(routed) => routed,
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    aggregate_type = %event.aggregate_type,
                    error = %e,
                    "Outbox event cannot be routed"
                );
                self.store.record_failure(event.id, &e.to_string()).await?;
                return Ok(PublishOutcome::Unroutable);
            }
        };

        match self.ledger.try_insert(&event.event_id, self.settings.lease).await? {
            LedgerClaim::Forwarded => {
                tracing::info!(event_id = %event.event_id, "Event already forwarded, skipping");
                self.store.mark_processed(&event.event_id).await?;
                return Ok(PublishOutcome::Duplicate);
            }
            LedgerClaim::InFlight => {
                tracing::info!(event_id = %event.event_id, "Event claimed by another publisher");
                return Ok(PublishOutcome::InFlight);
            }
            LedgerClaim::Reclaimed => {
                tracing::warn!(event_id = %event.event_id, "Reclaiming event after expired lease");
            }
            LedgerClaim::Acquired => {}
        }

        let published = match serde_json::to_string(&message) {
            Ok(body) => self.bus.publish(queue, &body).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = published {
            return self.fail_publish(event, queue, e).await;
        }

        self.ledger.mark_success(&event.event_id).await?;
        self.store.mark_processed(&event.event_id).await?;

        tracing::debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            queue,
            "Published outbox event"
        );

        Ok(PublishOutcome::Published)
    }

    async fn fail_publish(
        &self,
        event: &OutboxEvent,
        queue: &str,
        error: AppError,
    ) -> Result<PublishOutcome, AppError> {
        if let Err(e) = self.ledger.release(&event.event_id).await {
            tracing::warn!(event_id = %event.event_id, error = %e, "Failed to release ledger claim");
        }

        let attempts = self.store.record_failure(event.id, &error.to_string()).await?;

        if self
            .settings
            .max_attempts
            .is_some_and(|max| attempts >= max)
        {
            self.store.mark_failed(event.id).await?;
            tracing::error!(
                event_id = %event.event_id,
                queue,
                attempts,
                error = %error,
                "Parking outbox event after repeated publish failures"
            );
            return Ok(PublishOutcome::Parked);
        }

        tracing::warn!(
            event_id = %event.event_id,
            queue,
            attempts,
            error = %error,
            "Publish failed, event stays pending"
        );
        Ok(PublishOutcome::Retried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEventStore, MemoryLedger};
    use crate::store::NewOutboxEvent;
    use herald_common::bus::MemoryBus;
    use herald_common::queues;
    use herald_common::types::{LedgerStatus, OutboxStatus, RoutingMessage};
    use serde_json::json;

    struct Harness {
        store: Arc<MemoryEventStore>,
        ledger: Arc<MemoryLedger>,
        bus: Arc<MemoryBus>,
        publisher: OutboxPublisher,
    }

    fn harness(settings: PublisherSettings) -> Harness {
        let store = Arc::new(MemoryEventStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let bus = Arc::new(MemoryBus::new());
        let publisher = OutboxPublisher::new(store.clone(), ledger.clone(), bus.clone(), settings);
        Harness {
            store,
            ledger,
            bus,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_publishes_pending_event_once() {
        let h = harness(PublisherSettings::default());
        let row = h
            .store
            .append(
                NewOutboxEvent::new("ORDER_READY", "CUSTOMER", Some(11))
                    .with_event_id("evt-1")
                    .with_payload(json!({"orderNumber": "A-1"})),
            )
            .await
            .unwrap();

        let report = h.publisher.poll_once().await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.published, 1);

        let sent = h.bus.pending(queues::CUSTOMER);
        assert_eq!(sent.len(), 1);
        let message: RoutingMessage = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(message.event_id, "evt-1");
        assert_eq!(message.customer_id, Some(11));

        assert_eq!(h.store.get(row.id).unwrap().status, OutboxStatus::Processed);
        assert_eq!(h.ledger.status("evt-1"), Some(LedgerStatus::Success));

        let again = h.publisher.poll_once().await.unwrap();
        assert_eq!(again.fetched, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_releases_claim_and_retries() {
        let h = harness(PublisherSettings::default());
        let row = h
            .store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("evt-2"))
            .await
            .unwrap();

        h.bus.fail_publishes(Some("connection refused"));
        let report = h.publisher.poll_once().await.unwrap();
        assert_eq!(report.retried, 1);

        let stored = h.store.get(row.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("connection refused"));
        assert!(h.bus.pending(queues::ADMIN).is_empty());

        h.bus.fail_publishes(None);
        let report = h.publisher.poll_once().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(h.bus.pending(queues::ADMIN).len(), 1);
    }

    #[tokio::test]
    async fn test_parks_after_max_attempts() {
        let h = harness(PublisherSettings {
            max_attempts: Some(2),
            ..Default::default()
        });
        let row = h
            .store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None))
            .await
            .unwrap();

        h.bus.fail_publishes(Some("down"));
        assert_eq!(h.publisher.poll_once().await.unwrap().retried, 1);
        assert_eq!(h.publisher.poll_once().await.unwrap().parked, 1);
        assert_eq!(h.store.get(row.id).unwrap().status, OutboxStatus::Failed);
        assert_eq!(h.publisher.poll_once().await.unwrap().fetched, 0);
    }

    #[tokio::test]
    async fn test_unroutable_event_stays_pending_without_marker() {
        let h = harness(PublisherSettings {
            max_attempts: Some(1),
            ..Default::default()
        });
        let bad = h
            .store
            .append(NewOutboxEvent::new("X", "WAREHOUSE", Some(1)).with_event_id("bad"))
            .await
            .unwrap();
        h.store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("good"))
            .await
            .unwrap();

        let report = h.publisher.poll_once().await.unwrap();
        assert_eq!(report.unroutable, 1);
        assert_eq!(report.published, 1);

        let stored = h.store.get(bad.id).unwrap();
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert_eq!(h.ledger.status("bad"), None);
    }

    #[tokio::test]
    async fn test_unroutable_events_do_not_starve_later_events() {
        let h = harness(PublisherSettings {
            batch_size: 2,
            ..Default::default()
        });
        for id in ["stuck-1", "stuck-2"] {
            h.store
                .append(NewOutboxEvent::new("X", "WAREHOUSE", Some(1)).with_event_id(id))
                .await
                .unwrap();
        }
        let good = h
            .store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("fresh"))
            .await
            .unwrap();

        let first = h.publisher.poll_once().await.unwrap();
        assert_eq!(first.unroutable, 2);

        let second = h.publisher.poll_once().await.unwrap();
        assert_eq!(second.published, 1);
        assert_eq!(h.bus.pending(queues::ADMIN).len(), 1);
        assert_eq!(h.store.get(good.id).unwrap().status, OutboxStatus::Processed);

        let stats = h.store.stats().await.unwrap();
        assert_eq!((stats.pending, stats.processed), (2, 1));
    }

    #[tokio::test]
    async fn test_failing_publishes_do_not_starve_later_events() {
        let h = harness(PublisherSettings {
            batch_size: 1,
            ..Default::default()
        });
        h.store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("older"))
            .await
            .unwrap();

        h.bus.fail_publishes(Some("down"));
        assert_eq!(h.publisher.poll_once().await.unwrap().retried, 1);
        h.bus.fail_publishes(None);

        h.store
            .append(
                NewOutboxEvent::new("ORDER_READY", "CUSTOMER", Some(4)).with_event_id("newer"),
            )
            .await
            .unwrap();
        assert_eq!(h.publisher.poll_once().await.unwrap().published, 1);
        assert_eq!(h.bus.pending(queues::CUSTOMER).len(), 1);
        assert!(h.bus.pending(queues::ADMIN).is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_claim_is_skipped() {
        let h = harness(PublisherSettings::default());
        h.store
            .append(NewOutboxEvent::new("SYSTEM_ERROR", "ADMIN", None).with_event_id("busy"))
            .await
            .unwrap();
        h.ledger
            .try_insert("busy", Duration::from_secs(60))
            .await
            .unwrap();

        let report = h.publisher.poll_once().await.unwrap();
        assert_eq!(report.in_flight, 1);
        assert!(h.bus.pending(queues::ADMIN).is_empty());
    }
}
