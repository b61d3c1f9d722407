use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::NotificationRecord;

/// Downstream owner of disaggregated records.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Accept a message's records as one unit. Returns how many were new.
    async fn accept(&self, records: &[NotificationRecord]) -> Result<u64, AppError>;
}

/// Persists records into the `notifications` table for channel workers.
///
/// Inserts are idempotent on `(source_event_id, user_id, channel)`, so a
/// redelivered bus message does not produce duplicate notifications.
#[derive(Clone)]
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    async fn accept(&self, records: &[NotificationRecord]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let properties = serde_json::to_value(&record.properties)?;
            let result = sqlx::query(
                r#"
                INSERT INTO notifications
                    (event_id, source_event_id, category, scope_id, user_id, channel,
                     status, priority, title, body, event_type, aggregate_type,
                     read_by_all, properties, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (source_event_id, user_id, channel) DO NOTHING
                "#,
            )
            .bind(&record.event_id)
            .bind(&record.source_event_id)
            .bind(record.category.tag())
            .bind(record.scope_id)
            .bind(record.user_id)
            .bind(record.channel.to_string())
            .bind(record.status.to_string())
            .bind(record.priority.to_string())
            .bind(&record.title)
            .bind(&record.body)
            .bind(&record.event_type)
            .bind(&record.aggregate_type)
            .bind(record.read_by_all)
            .bind(properties)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
