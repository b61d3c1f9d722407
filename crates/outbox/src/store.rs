//! Event Store: the outbox table the publisher drains.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{OutboxEvent, OutboxStatus};

/// A domain event to append to the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    /// Producer-assigned id; a random one is generated when absent.
    pub event_id: Option<String>,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: Option<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    pub fn new(event_type: &str, aggregate_type: &str, aggregate_id: Option<i64>) -> Self {
        Self {
            event_id: None,
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            payload: serde_json::json!({}),
        }
    }

    pub fn with_event_id(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub(crate) fn resolved_event_id(&self) -> String {
        self.event_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Row counts per outbox status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: i64,
    pub processed: i64,
    pub failed: i64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, AppError>;

    /// PENDING events, at most `limit`: fewest failed attempts first, then
    /// oldest. Rows that keep failing sink behind fresh ones.
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError>;

    /// Mark every PENDING row carrying `event_id` as PROCESSED.
    async fn mark_processed(&self, event_id: &str) -> Result<(), AppError>;

    /// Record a failed attempt on a row; returns the new attempt count.
    async fn record_failure(&self, id: i64, error: &str) -> Result<i32, AppError>;

    /// Park a PENDING row as FAILED.
    async fn mark_failed(&self, id: i64) -> Result<(), AppError>;

    /// Move a FAILED row back to PENDING. `false` when the row is not FAILED.
    async fn requeue(&self, id: i64) -> Result<bool, AppError>;

    async fn stats(&self) -> Result<OutboxStats, AppError>;
}

/// Postgres-backed outbox.
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgOutboxStore {
    async fn append(&self, event: NewOutboxEvent) -> Result<OutboxEvent, AppError> {
        let row: OutboxEvent = sqlx::query_as(
            r#"
            INSERT INTO event_outbox (event_id, event_type, aggregate_type, aggregate_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(event.resolved_event_id())
        .bind(&event.event_type)
        .bind(&event.aggregate_type)
        .bind(event.aggregate_id)
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        let rows: Vec<OutboxEvent> = sqlx::query_as(
            r#"
            SELECT *
            FROM event_outbox
            WHERE status = 'PENDING'
            ORDER BY attempts ASC, created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE event_outbox
            SET status = 'PROCESSED', published_at = NOW()
            WHERE event_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<i32, AppError> {
        let (attempts,): (i32,) = sqlx::query_as(
            r#"
            UPDATE event_outbox
            SET attempts = attempts + 1, last_error = $2
            WHERE id = $1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn mark_failed(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE event_outbox SET status = 'FAILED' WHERE id = $1 AND status = 'PENDING'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn requeue(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE event_outbox
            SET status = 'PENDING', attempts = 0
            WHERE id = $1 AND status = 'FAILED'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn stats(&self) -> Result<OutboxStats, AppError> {
        let rows: Vec<(OutboxStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM event_outbox GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = OutboxStats::default();
        for (status, count) in rows {
            match status {
                OutboxStatus::Pending => stats.pending = count,
                OutboxStatus::Processed => stats.processed = count,
                OutboxStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}
