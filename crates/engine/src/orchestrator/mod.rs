//! Disaggregation orchestrators.
//!
//! Every orchestrator expands one routing message into per-recipient,
//! per-channel notification records with the same algorithm:
//! 1. Short-circuit when the event type is globally blocked
//! 2. Resolve recipients (one targeted user, or every active member)
//! 3. Load the event-type channel rule and the group settings
//! 4. Per recipient: load preferences, resolve channels, drop blocked channels
//! 5. Build one record per surviving channel
//!
//! Category specifics (recipients, scope, priority, team sharing,
//! destinations) are plugged in through the [`Orchestrator`] trait methods.
//! Any lookup failure aborts the whole message: no partial fan-out.

pub mod admin;
pub mod agency;
pub mod chat;
pub mod customer;
pub mod restaurant_team;
pub mod restaurant_user;
pub mod social;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::types::{
    Channel, DESTINATION_PROPERTY, DeliveryStatus, NotificationRecord, Priority,
    RecipientCategory, RecipientType, RoutingMessage,
};

use crate::blocks::BlockService;
use crate::channels::resolve_channels;
use crate::directory::RecipientDirectory;
use crate::policy::PolicyStore;
use crate::scope::ScopeContext;
use crate::templates;

pub use admin::AdminOrchestrator;
pub use agency::AgencyOrchestrator;
pub use chat::ChatOrchestrator;
pub use customer::CustomerOrchestrator;
pub use restaurant_team::RestaurantTeamOrchestrator;
pub use restaurant_user::RestaurantUserOrchestrator;
pub use social::SocialOrchestrator;

/// Read-only collaborators shared by every orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub policy: Arc<dyn PolicyStore>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub blocks: Arc<dyn BlockService>,
}

impl Collaborators {
    pub fn new(
        policy: Arc<dyn PolicyStore>,
        directory: Arc<dyn RecipientDirectory>,
        blocks: Arc<dyn BlockService>,
    ) -> Self {
        Self {
            policy,
            directory,
            blocks,
        }
    }
}

/// Id of a disaggregated record: `{event}_{user}_{channel}_{millis}`.
pub fn disaggregated_event_id(
    event_id: &str,
    user_id: i64,
    channel: Channel,
    emitted_at: DateTime<Utc>,
) -> String {
    format!(
        "{}_{}_{}_{}",
        event_id,
        user_id,
        channel,
        emitted_at.timestamp_millis()
    )
}

/// The single recipient of a TARGETED message.
///
/// `recipient_id` wins; `fallback` is the category's own id (e.g. the
/// customer an event belongs to) when the category has one.
pub fn targeted_recipient(
    message: &RoutingMessage,
    fallback: Option<i64>,
) -> Result<i64, AppError> {
    message.recipient_id.or(fallback).ok_or_else(|| {
        AppError::MalformedPayload(format!(
            "TARGETED {} event {} carries no recipient id",
            message.event_type, message.event_id
        ))
    })
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn category(&self) -> RecipientCategory;

    fn collaborators(&self) -> &Collaborators;

    /// Scope used for group settings and block checks.
    fn context(&self, message: &RoutingMessage) -> Result<ScopeContext, AppError>;

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError>;

    /// Team-shared notifications substitute the group's channels for each
    /// member's personal preferences.
    fn shares_group_channels(&self) -> bool {
        false
    }

    fn priority(&self, _event_type: &str) -> Priority {
        Priority::Normal
    }

    fn read_by_all(&self, _event_type: &str) -> bool {
        false
    }

    /// Real-time destination attached to websocket records.
    fn destination(
        &self,
        message: &RoutingMessage,
        context: &ScopeContext,
        user_id: i64,
    ) -> Option<String>;

    /// Expand `message` into notification records.
    async fn disaggregate(
        &self,
        message: &RoutingMessage,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let category = self.category();
        let collaborators = self.collaborators();
        let event_type = message.event_type.as_str();

        if collaborators.blocks.is_globally_blocked(event_type).await? {
            tracing::info!(
                event_id = %message.event_id,
                event_type,
                %category,
                "Event type globally blocked, nothing to disaggregate"
            );
            return Ok(Vec::new());
        }

        let context = self.context(message)?;
        let (title, body) = templates::compose(category, event_type, &message.payload)?;
        let recipients: BTreeSet<i64> = self
            .resolve_recipients(message, &context)
            .await?
            .into_iter()
            .collect();

        if recipients.is_empty() {
            tracing::debug!(event_id = %message.event_id, %category, "No recipients resolved");
            return Ok(Vec::new());
        }

        let rule = collaborators
            .policy
            .event_type_rules(category, event_type)
            .await?;
        let group_enabled = collaborators.policy.group_settings(&context).await?;

        let base_properties = payload::string_map(&message.payload, "properties")?;
        let priority = self.priority(event_type);
        let read_by_all = self.read_by_all(event_type);
        let emitted_at = Utc::now();

        let mut records = Vec::new();
        for user_id in recipients {
            let user_enabled = if self.shares_group_channels() {
                group_enabled.clone()
            } else {
                collaborators
                    .policy
                    .user_preferences(category, user_id)
                    .await?
            };

            let channels = resolve_channels(
                &rule.mandatory,
                &rule.optional,
                &group_enabled,
                &user_enabled,
            );

            for channel in channels {
                if !collaborators
                    .blocks
                    .can_send(event_type, channel, user_id, &context)
                    .await?
                {
                    tracing::debug!(
                        event_id = %message.event_id,
                        user_id,
                        %channel,
                        "Channel suppressed by block service"
                    );
                    continue;
                }

                let mut properties = base_properties.clone();
                if channel == Channel::Websocket
                    && let Some(destination) = self.destination(message, &context, user_id)
                {
                    properties.insert(DESTINATION_PROPERTY.to_string(), destination);
                }

                records.push(NotificationRecord {
                    event_id: disaggregated_event_id(&message.event_id, user_id, channel, emitted_at),
                    source_event_id: message.event_id.clone(),
                    category,
                    scope_id: context.scope_id,
                    user_id,
                    channel,
                    status: DeliveryStatus::Pending,
                    priority,
                    title: title.clone(),
                    body: body.clone(),
                    event_type: message.event_type.clone(),
                    aggregate_type: message.aggregate_type.clone(),
                    read_by_all,
                    properties,
                    created_at: emitted_at,
                });
            }
        }

        tracing::debug!(
            event_id = %message.event_id,
            %category,
            records = records.len(),
            "Message disaggregated"
        );
        Ok(records)
    }
}

/// Members of `category` for a BROADCAST message, or the single targeted user.
pub(crate) async fn members_or_target(
    collaborators: &Collaborators,
    message: &RoutingMessage,
    category: RecipientCategory,
    scope_id: Option<i64>,
    fallback: Option<i64>,
) -> Result<Vec<i64>, AppError> {
    match message.recipient_type {
        RecipientType::Broadcast => {
            collaborators
                .directory
                .active_members(category, scope_id)
                .await
        }
        RecipientType::Targeted => Ok(vec![targeted_recipient(message, fallback)?]),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use herald_common::types::{RecipientType, RoutingMessage};

    use super::Collaborators;
    use crate::memory::{StaticBlocks, StaticDirectory, StaticPolicy};

    pub fn collaborators(
        policy: StaticPolicy,
        directory: StaticDirectory,
        blocks: StaticBlocks,
    ) -> Collaborators {
        Collaborators::new(Arc::new(policy), Arc::new(directory), Arc::new(blocks))
    }

    pub fn message(event_type: &str, aggregate_type: &str, payload: serde_json::Value) -> RoutingMessage {
        RoutingMessage {
            event_id: "evt-1".to_string(),
            event_type: event_type.to_string(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: None,
            recipient_type: RecipientType::Targeted,
            recipient_id: None,
            hub_id: None,
            restaurant_id: None,
            customer_id: None,
            agency_id: None,
            admin_id: None,
            payload,
        }
    }
}
