//! Channel policy lookups: event-type rules, group settings and user
//! preferences.
//!
//! [`DefaultPolicy`] carries the built-in rules per recipient category.
//! [`PgPolicyStore`] reads operator overrides from Postgres and falls back to
//! the defaults when no override row exists.

use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::{Channel, RecipientCategory};

use crate::channels::{ChannelSet, set};
use crate::scope::ScopeContext;

/// Mandatory and optional channels configured for an event type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelRule {
    pub mandatory: ChannelSet,
    pub optional: ChannelSet,
}

impl ChannelRule {
    pub fn new(mandatory: &[Channel], optional: &[Channel]) -> Self {
        Self {
            mandatory: set(mandatory),
            optional: set(optional),
        }
    }
}

/// Read-only policy collaborator queried by orchestrators.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn event_type_rules(
        &self,
        category: RecipientCategory,
        event_type: &str,
    ) -> Result<ChannelRule, AppError>;

    /// Channels the recipient's group (restaurant, agency, ...) has enabled.
    async fn group_settings(&self, context: &ScopeContext) -> Result<ChannelSet, AppError>;

    async fn user_preferences(
        &self,
        category: RecipientCategory,
        user_id: i64,
    ) -> Result<ChannelSet, AppError>;
}

/// Built-in channel policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl DefaultPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn rule(category: RecipientCategory, event_type: &str) -> ChannelRule {
        use Channel::*;

        match category {
            RecipientCategory::Admin => match event_type {
                "SYSTEM_ERROR" | "CRITICAL_INCIDENT" => {
                    ChannelRule::new(&[Email, Sms], &[Push, Slack, Websocket])
                }
                "DATABASE_ALERT" | "SERVICE_DOWN" => ChannelRule::new(&[Email], &[Push, Sms, Slack]),
                "SECURITY_INCIDENT" => ChannelRule::new(&[Sms, Slack], &[Email, Push]),
                "RESOURCE_QUOTA" => ChannelRule::new(&[Email], &[Slack, Push, Websocket]),
                "SUPPORT_TICKET_CREATED" | "SUPPORT_TICKET_REOPENED" => {
                    ChannelRule::new(&[Email, Websocket], &[Push, Slack])
                }
                "SUPPORT_TICKET_ESCALATED" => {
                    ChannelRule::new(&[Email, Sms], &[Push, Slack, Websocket])
                }
                "SUPPORT_TICKET_RESOLVED" => ChannelRule::new(&[Email], &[Push, Websocket]),
                _ => ChannelRule::new(&[Email], &[Push, Slack, Websocket]),
            },
            RecipientCategory::Customer => match event_type {
                "RESERVATION_CONFIRMED" => ChannelRule::new(&[Email], &[Push, Websocket]),
                "ORDER_READY" => ChannelRule::new(&[Push], &[Email, Websocket]),
                "ORDER_STATUS_UPDATE" => ChannelRule::new(&[Websocket], &[Push, Email]),
                "RESERVATION_REMINDER" => ChannelRule::new(&[], &[Email, Push, Websocket]),
                _ => ChannelRule::new(&[Websocket], &[Email, Push]),
            },
            RecipientCategory::RestaurantUser => match event_type {
                "KITCHEN_ALERT" => ChannelRule::new(&[Websocket, Push], &[Sms, Email]),
                "TASK_ASSIGNMENT" | "DIRECT_MESSAGE" => {
                    ChannelRule::new(&[], &[Email, Sms, Websocket])
                }
                _ => ChannelRule::new(&[Websocket], &[Email, Push, Sms]),
            },
            RecipientCategory::RestaurantTeam => {
                ChannelRule::new(&[Websocket], &[Email, Push, Sms])
            }
            RecipientCategory::Agency => match event_type {
                "URGENT_BOOKING" => ChannelRule::new(&[Websocket, Push], &[Sms, Email]),
                "ASSIGNMENT_AVAILABLE" => ChannelRule::new(&[], &[Email, Sms, Websocket]),
                _ => ChannelRule::new(&[Websocket], &[Email, Push, Sms]),
            },
            RecipientCategory::Chat => match event_type {
                "CHAT_MESSAGE_RECEIVED" | "CHAT_GROUP_MESSAGE" | "CHAT_RESERVATION_MESSAGE" => {
                    ChannelRule::new(&[Websocket], &[Push])
                }
                _ => ChannelRule::new(&[Websocket], &[]),
            },
            RecipientCategory::Social => match event_type {
                "SOCIAL_NEW_POST" | "SOCIAL_NEW_STORY" | "SOCIAL_POST_LIKED"
                | "SOCIAL_POST_COMMENTED" | "SOCIAL_POST_SHARED" => {
                    ChannelRule::new(&[Websocket], &[Push])
                }
                "SOCIAL_NEW_FOLLOWER" | "SOCIAL_FOLLOW_REQUEST" | "SOCIAL_FOLLOW_ACCEPTED" => {
                    ChannelRule::new(&[Websocket, Push], &[])
                }
                "EVENT_CREATED" => ChannelRule::new(&[Websocket], &[Push, Email]),
                "EVENT_REMINDER" => ChannelRule::new(&[Websocket, Push], &[Email]),
                "EVENT_CANCELLED" => ChannelRule::new(&[Websocket, Push, Email], &[]),
                _ => ChannelRule::new(&[Websocket], &[]),
            },
        }
    }

    pub fn group(category: RecipientCategory) -> ChannelSet {
        use Channel::*;

        match category {
            RecipientCategory::Admin => set(&Channel::ALL),
            RecipientCategory::Customer => set(&[Email, Push, Websocket]),
            RecipientCategory::RestaurantUser
            | RecipientCategory::RestaurantTeam
            | RecipientCategory::Agency => set(&[Email, Push, Sms, Websocket]),
            RecipientCategory::Chat | RecipientCategory::Social => set(&[Websocket, Push]),
        }
    }

    pub fn user(category: RecipientCategory) -> ChannelSet {
        use Channel::*;

        match category {
            RecipientCategory::Admin => set(&Channel::ALL),
            RecipientCategory::Customer => set(&[Email, Push, Websocket]),
            RecipientCategory::RestaurantUser | RecipientCategory::RestaurantTeam => {
                set(&[Websocket, Email])
            }
            RecipientCategory::Agency => set(&[Websocket, Email, Push]),
            RecipientCategory::Chat | RecipientCategory::Social => set(&[Websocket, Push]),
        }
    }
}

#[async_trait]
impl PolicyStore for DefaultPolicy {
    async fn event_type_rules(
        &self,
        category: RecipientCategory,
        event_type: &str,
    ) -> Result<ChannelRule, AppError> {
        Ok(Self::rule(category, event_type))
    }

    async fn group_settings(&self, context: &ScopeContext) -> Result<ChannelSet, AppError> {
        Ok(Self::group(context.category))
    }

    async fn user_preferences(
        &self,
        category: RecipientCategory,
        _user_id: i64,
    ) -> Result<ChannelSet, AppError> {
        Ok(Self::user(category))
    }
}

/// Postgres-backed policy store with built-in fallbacks.
#[derive(Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_channels(names: &[String]) -> Result<ChannelSet, AppError> {
    names
        .iter()
        .map(|name| {
            name.parse::<Channel>()
                .map_err(|_| AppError::Policy(format!("Unknown channel '{}' in policy table", name)))
        })
        .collect()
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn event_type_rules(
        &self,
        category: RecipientCategory,
        event_type: &str,
    ) -> Result<ChannelRule, AppError> {
        let row: Option<(Vec<String>, Vec<String>)> = sqlx::query_as(
            r#"
            SELECT mandatory, optional
            FROM event_type_channel_rules
            WHERE category = $1 AND event_type = $2
            "#,
        )
        .bind(category.tag())
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Policy(format!("Loading channel rules failed: {}", e)))?;

        match row {
            Some((mandatory, optional)) => Ok(ChannelRule {
                mandatory: parse_channels(&mandatory)?,
                optional: parse_channels(&optional)?,
            }),
            None => Ok(DefaultPolicy::rule(category, event_type)),
        }
    }

    async fn group_settings(&self, context: &ScopeContext) -> Result<ChannelSet, AppError> {
        let Some(scope_id) = context.scope_id else {
            return Ok(DefaultPolicy::group(context.category));
        };

        let row: Option<(Vec<String>,)> = sqlx::query_as(
            r#"
            SELECT enabled
            FROM group_channel_settings
            WHERE category = $1 AND scope_id = $2
            "#,
        )
        .bind(context.category.tag())
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Policy(format!("Loading group settings failed: {}", e)))?;

        match row {
            Some((enabled,)) => parse_channels(&enabled),
            None => Ok(DefaultPolicy::group(context.category)),
        }
    }

    async fn user_preferences(
        &self,
        category: RecipientCategory,
        user_id: i64,
    ) -> Result<ChannelSet, AppError> {
        let row: Option<(Vec<String>,)> = sqlx::query_as(
            r#"
            SELECT enabled
            FROM user_channel_preferences
            WHERE category = $1 AND user_id = $2
            "#,
        )
        .bind(category.tag())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Policy(format!("Loading user preferences failed: {}", e)))?;

        match row {
            Some((enabled,)) => parse_channels(&enabled),
            None => Ok(DefaultPolicy::user(category)),
        }
    }
}
