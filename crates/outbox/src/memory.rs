//! In-memory Event Store and ledger with the same semantics as the Postgres
//! ones.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use herald_common::error::AppError;
use herald_common::types::{LedgerStatus, OutboxEvent, OutboxStatus};

use crate::ledger::{IdempotencyLedger, LedgerClaim};
use crate::store::{EventStore, NewOutboxEvent, OutboxStats};

fn poisoned() -> AppError {
    AppError::Internal("in-memory store lock poisoned".to_string())
}

#[derive(Default)]
pub struct MemoryEventStore {
    rows: Mutex<Vec<OutboxEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in insertion order.
    pub fn rows(&self) -> Vec<OutboxEvent> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: i64) -> Option<OutboxEvent> {
        self.rows().into_iter().find(|row| row.id == id)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, AppError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = OutboxEvent {
            id: rows.len() as i64 + 1,
            event_id: event.resolved_event_id(),
            event_type: event.event_type,
            aggregate_type: event.aggregate_type,
            aggregate_id: event.aggregate_id,
            payload: event.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            published_at: None,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut pending: Vec<OutboxEvent> = rows
            .iter()
            .filter(|row| row.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|row| (row.attempts, row.created_at, row.id));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), AppError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        for row in rows
            .iter_mut()
            .filter(|row| row.event_id == event_id && row.status == OutboxStatus::Pending)
        {
            row.status = OutboxStatus::Processed;
            row.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<i32, AppError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| AppError::NotFound(format!("outbox event {}", id)))?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        Ok(row.attempts)
    }

    async fn mark_failed(&self, id: i64) -> Result<(), AppError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        if let Some(row) = rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OutboxStatus::Pending)
        {
            row.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    async fn requeue(&self, id: i64) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        match rows
            .iter_mut()
            .find(|row| row.id == id && row.status == OutboxStatus::Failed)
        {
            Some(row) => {
                row.status = OutboxStatus::Pending;
                row.attempts = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> Result<OutboxStats, AppError> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut stats = OutboxStats::default();
        for row in rows.iter() {
            match row.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Processed => stats.processed += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    markers: Mutex<HashMap<String, (LedgerStatus, Instant)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, event_id: &str) -> Option<LedgerStatus> {
        self.markers
            .lock()
            .ok()
            .and_then(|markers| markers.get(event_id).map(|(status, _)| *status))
    }

    pub fn len(&self) -> usize {
        self.markers.lock().map(|m| m.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyLedger for MemoryLedger {
    async fn try_insert(&self, event_id: &str, lease: Duration) -> Result<LedgerClaim, AppError> {
        let mut markers = self.markers.lock().map_err(|_| poisoned())?;
        let now = Instant::now();

        match markers.get_mut(event_id) {
            None => {
                markers.insert(event_id.to_string(), (LedgerStatus::Processing, now + lease));
                Ok(LedgerClaim::Acquired)
            }
            Some((LedgerStatus::Success, _)) => Ok(LedgerClaim::Forwarded),
            Some((LedgerStatus::Processing, expires)) if *expires <= now => {
                *expires = now + lease;
                Ok(LedgerClaim::Reclaimed)
            }
            Some((LedgerStatus::Processing, _)) => Ok(LedgerClaim::InFlight),
        }
    }

    async fn mark_success(&self, event_id: &str) -> Result<(), AppError> {
        let mut markers = self.markers.lock().map_err(|_| poisoned())?;
        if let Some((status, _)) = markers.get_mut(event_id) {
            *status = LedgerStatus::Success;
        }
        Ok(())
    }

    async fn release(&self, event_id: &str) -> Result<(), AppError> {
        let mut markers = self.markers.lock().map_err(|_| poisoned())?;
        if let Some((LedgerStatus::Processing, expires)) = markers.get_mut(event_id) {
            *expires = Instant::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_claim_lifecycle() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.try_insert("e1", LEASE).await.unwrap(), LedgerClaim::Acquired);
        assert_eq!(ledger.try_insert("e1", LEASE).await.unwrap(), LedgerClaim::InFlight);

        ledger.release("e1").await.unwrap();
        assert_eq!(ledger.try_insert("e1", LEASE).await.unwrap(), LedgerClaim::Reclaimed);

        ledger.mark_success("e1").await.unwrap();
        assert_eq!(ledger.try_insert("e1", LEASE).await.unwrap(), LedgerClaim::Forwarded);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let ledger = MemoryLedger::new();
        ledger.try_insert("e2", Duration::ZERO).await.unwrap();
        assert_eq!(ledger.try_insert("e2", LEASE).await.unwrap(), LedgerClaim::Reclaimed);
    }

    #[tokio::test]
    async fn test_store_requeue_only_moves_failed_rows() {
        let store = MemoryEventStore::new();
        let row = store
            .append(NewOutboxEvent::new("ORDER_READY", "CUSTOMER", Some(1)))
            .await
            .unwrap();

        assert!(!store.requeue(row.id).await.unwrap());
        store.mark_failed(row.id).await.unwrap();
        assert_eq!(store.stats().await.unwrap().failed, 1);

        assert!(store.requeue(row.id).await.unwrap());
        let stats = store.stats().await.unwrap();
        assert_eq!((stats.pending, stats.failed), (1, 0));
    }
}
