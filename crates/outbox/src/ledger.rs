//! Idempotency ledger guarding at-most-once forwarding to the bus.
//!
//! A marker is inserted under a uniqueness constraint before an event is
//! published, with a lease. The claim outcome tells the publisher whether the
//! event was already forwarded, is being forwarded by another instance right
//! now, or is its to publish (first time, or after a crashed attempt whose
//! lease ran out).

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::LedgerStatus;

/// Outcome of claiming an event in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerClaim {
    /// First time this event id is seen; publish it.
    Acquired,
    /// A previous attempt never confirmed and its lease expired; publish again.
    Reclaimed,
    /// Another publisher holds a live lease; skip this cycle.
    InFlight,
    /// Already confirmed on the bus; only the outbox row needs healing.
    Forwarded,
}

#[async_trait]
pub trait IdempotencyLedger: Send + Sync {
    async fn try_insert(&self, event_id: &str, lease: Duration) -> Result<LedgerClaim, AppError>;

    /// Confirm the event reached the bus.
    async fn mark_success(&self, event_id: &str) -> Result<(), AppError>;

    /// Give up a claim after a failed publish so the next cycle reclaims it.
    async fn release(&self, event_id: &str) -> Result<(), AppError>;
}

/// Postgres-backed ledger on the `processed_events` table.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyLedger for PgLedger {
    async fn try_insert(&self, event_id: &str, lease: Duration) -> Result<LedgerClaim, AppError> {
        let lease_secs = lease.as_secs_f64();

        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, status, lease_expires_at)
            VALUES ($1, 'PROCESSING', NOW() + make_interval(secs => $2))
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(lease_secs)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(LedgerClaim::Acquired);
        }

        // Only one contender can win the conditional update on an expired lease.
        let reclaimed = sqlx::query(
            r#"
            UPDATE processed_events
            SET lease_expires_at = NOW() + make_interval(secs => $2), updated_at = NOW()
            WHERE event_id = $1
              AND status = 'PROCESSING'
              AND lease_expires_at <= NOW()
            "#,
        )
        .bind(event_id)
        .bind(lease_secs)
        .execute(&self.pool)
        .await?;

        if reclaimed.rows_affected() == 1 {
            return Ok(LedgerClaim::Reclaimed);
        }

        let status: Option<(LedgerStatus,)> =
            sqlx::query_as("SELECT status FROM processed_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match status {
            Some((LedgerStatus::Success,)) => LedgerClaim::Forwarded,
            _ => LedgerClaim::InFlight,
        })
    }

    async fn mark_success(&self, event_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE processed_events
            SET status = 'SUCCESS', updated_at = NOW()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn release(&self, event_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE processed_events
            SET lease_expires_at = NOW(), updated_at = NOW()
            WHERE event_id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
