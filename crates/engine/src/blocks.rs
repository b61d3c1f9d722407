//! Notification Block Service: multi-level suppression.
//!
//! Levels are evaluated in order:
//! 0. Global block on the event type (optionally time-windowed)
//! 1. Event rule: a channel mandatory for the event type bypasses levels 2-4,
//!    and `user_can_disable` decides whether level 4 applies
//! 2. Organisation block (recipient category + scope id)
//! 3. Hub block (sub-scope id)
//! 4. User block
//!
//! A block row matches when its quiet-hours window contains the current time,
//! or when it lists the channel, or when it lists no channels at all.

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::{Channel, RecipientCategory};

use crate::scope::ScopeContext;

#[async_trait]
pub trait BlockService: Send + Sync {
    /// Whether `event_type` is suppressed for everyone.
    async fn is_globally_blocked(&self, event_type: &str) -> Result<bool, AppError>;

    /// Whether `user_id` may receive `event_type` on `channel` within `context`.
    async fn can_send(
        &self,
        event_type: &str,
        channel: Channel,
        user_id: i64,
        context: &ScopeContext,
    ) -> Result<bool, AppError>;
}

/// Level a block row applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLevel {
    Organization,
    Hub,
    User,
}

impl std::fmt::Display for BlockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockLevel::Organization => write!(f, "ORGANIZATION"),
            BlockLevel::Hub => write!(f, "HUB"),
            BlockLevel::User => write!(f, "USER"),
        }
    }
}

/// One active block row, already filtered by event type.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockRow {
    pub channels: Vec<String>,
    pub quiet_start: Option<NaiveTime>,
    pub quiet_end: Option<NaiveTime>,
}

/// Whether `now` falls inside a quiet-hours window.
///
/// A window whose start is after its end wraps midnight (22:00-08:00).
pub fn in_quiet_hours(start: NaiveTime, end: NaiveTime, now: NaiveTime) -> bool {
    if start < end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

impl BlockRow {
    /// Whether this row suppresses `channel` at `now`.
    pub fn blocks(&self, channel: Channel, now: NaiveTime) -> bool {
        if let (Some(start), Some(end)) = (self.quiet_start, self.quiet_end)
            && in_quiet_hours(start, end, now)
        {
            return true;
        }

        self.channels.is_empty()
            || self
                .channels
                .iter()
                .any(|name| name.parse::<Channel>().is_ok_and(|c| c == channel))
    }
}

/// Postgres-backed block service.
#[derive(Clone)]
pub struct PgBlockService {
    pool: PgPool,
}

impl PgBlockService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mandatory channels and the `user_can_disable` flag for an event type.
    async fn event_rule(&self, event_type: &str) -> Result<(Vec<String>, bool), AppError> {
        let row: Option<(Vec<String>, bool)> = sqlx::query_as(
            r#"
            SELECT mandatory_channels, user_can_disable
            FROM notification_block_rules
            WHERE event_type = $1
            "#,
        )
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.unwrap_or_else(|| (Vec::new(), true)))
    }

    async fn is_blocked_at(
        &self,
        level: BlockLevel,
        category: RecipientCategory,
        target_id: i64,
        event_type: &str,
        channel: Channel,
    ) -> Result<bool, AppError> {
        let rows: Vec<BlockRow> = sqlx::query_as(
            r#"
            SELECT channels, quiet_start, quiet_end
            FROM notification_blocks
            WHERE active = true
              AND level = $1
              AND category = $2
              AND target_id = $3
              AND (event_type IS NULL OR event_type = $4)
            "#,
        )
        .bind(level.to_string())
        .bind(category.tag())
        .bind(target_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;

        let now = Utc::now().time();
        Ok(rows.iter().any(|row| row.blocks(channel, now)))
    }
}

#[async_trait]
impl BlockService for PgBlockService {
    async fn is_globally_blocked(&self, event_type: &str) -> Result<bool, AppError> {
        let (blocked,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM global_notification_blocks
                WHERE active = true
                  AND event_type = $1
                  AND (starts_at IS NULL OR starts_at <= NOW())
                  AND (ends_at IS NULL OR ends_at > NOW())
            )
            "#,
        )
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(blocked)
    }

    async fn can_send(
        &self,
        event_type: &str,
        channel: Channel,
        user_id: i64,
        context: &ScopeContext,
    ) -> Result<bool, AppError> {
        if self.is_globally_blocked(event_type).await? {
            return Ok(false);
        }

        let (mandatory, user_can_disable) = self.event_rule(event_type).await?;
        if mandatory
            .iter()
            .any(|name| name.parse::<Channel>().is_ok_and(|c| c == channel))
        {
            return Ok(true);
        }

        if let Some(scope_id) = context.scope_id
            && self
                .is_blocked_at(BlockLevel::Organization, context.category, scope_id, event_type, channel)
                .await?
        {
            tracing::debug!(event_type, %channel, scope_id, "Blocked at organisation level");
            return Ok(false);
        }

        if let Some(hub_id) = context.sub_scope_id
            && self
                .is_blocked_at(BlockLevel::Hub, context.category, hub_id, event_type, channel)
                .await?
        {
            tracing::debug!(event_type, %channel, hub_id, "Blocked at hub level");
            return Ok(false);
        }

        if user_can_disable
            && self
                .is_blocked_at(BlockLevel::User, context.category, user_id, event_type, channel)
                .await?
        {
            tracing::debug!(event_type, %channel, user_id, "Blocked by user");
            return Ok(false);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_quiet_hours_same_day() {
        assert!(in_quiet_hours(t(9, 0), t(17, 0), t(12, 0)));
        assert!(in_quiet_hours(t(9, 0), t(17, 0), t(9, 0)));
        assert!(!in_quiet_hours(t(9, 0), t(17, 0), t(17, 0)));
        assert!(!in_quiet_hours(t(9, 0), t(17, 0), t(20, 0)));
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        assert!(in_quiet_hours(t(22, 0), t(8, 0), t(23, 30)));
        assert!(in_quiet_hours(t(22, 0), t(8, 0), t(3, 0)));
        assert!(!in_quiet_hours(t(22, 0), t(8, 0), t(12, 0)));
    }

    #[test]
    fn test_row_blocks_listed_channel_only() {
        let row = BlockRow {
            channels: vec!["SMS".to_string(), "push".to_string()],
            quiet_start: None,
            quiet_end: None,
        };
        assert!(row.blocks(Channel::Sms, t(12, 0)));
        assert!(row.blocks(Channel::Push, t(12, 0)));
        assert!(!row.blocks(Channel::Email, t(12, 0)));
    }

    #[test]
    fn test_row_without_channels_blocks_everything() {
        let row = BlockRow {
            channels: vec![],
            quiet_start: None,
            quiet_end: None,
        };
        assert!(row.blocks(Channel::Websocket, t(12, 0)));
    }

    #[test]
    fn test_quiet_window_blocks_every_channel() {
        let row = BlockRow {
            channels: vec!["SMS".to_string()],
            quiet_start: Some(t(22, 0)),
            quiet_end: Some(t(7, 0)),
        };
        assert!(row.blocks(Channel::Email, t(23, 0)));
        assert!(!row.blocks(Channel::Email, t(12, 0)));
        assert!(row.blocks(Channel::Sms, t(12, 0)));
    }
}
