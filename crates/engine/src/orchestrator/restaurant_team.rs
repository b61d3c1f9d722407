use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Priority, RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator};
use crate::scope::ScopeContext;

/// Team-shared reservation notifications for every active staff member of a
/// restaurant.
///
/// Recipients are always the full active staff, whatever the message's
/// recipient type. Channels come from the restaurant's group settings only,
/// and every record is shared (`read_by_all`). The scope is the restaurant
/// itself, so restaurant-level blocks and settings apply to team and
/// personal notifications alike.
pub struct RestaurantTeamOrchestrator {
    collaborators: Collaborators,
}

impl RestaurantTeamOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for RestaurantTeamOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::RestaurantTeam
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        let restaurant_id = message.restaurant_id.ok_or_else(|| {
            AppError::MalformedPayload(format!(
                "team event {} carries no restaurant_id",
                message.event_id
            ))
        })?;
        Ok(ScopeContext::new(
            RecipientCategory::RestaurantUser,
            Some(restaurant_id),
            message.hub_id,
        ))
    }

    async fn resolve_recipients(
        &self,
        _message: &RoutingMessage,
        context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        self.collaborators
            .directory
            .active_members(RecipientCategory::RestaurantUser, context.scope_id)
            .await
    }

    fn shares_group_channels(&self) -> bool {
        true
    }

    fn priority(&self, event_type: &str) -> Priority {
        if event_type.starts_with("RESERVATION_") {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    fn read_by_all(&self, _event_type: &str) -> bool {
        true
    }

    fn destination(
        &self,
        _message: &RoutingMessage,
        context: &ScopeContext,
        _user_id: i64,
    ) -> Option<String> {
        context
            .scope_id
            .map(|restaurant_id| format!("/topic/restaurant/{}/reservations", restaurant_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{StaticBlocks, StaticDirectory, StaticPolicy};
    use crate::orchestrator::test_support::{collaborators, message};
    use herald_common::types::Channel;

    fn staff() -> StaticDirectory {
        StaticDirectory::new().with_members(RecipientCategory::RestaurantUser, Some(3), &[7, 8, 9])
    }

    #[tokio::test]
    async fn test_every_team_record_is_shared_and_high() {
        let orchestrator = RestaurantTeamOrchestrator::new(collaborators(
            StaticPolicy::new()
                .with_group(RecipientCategory::RestaurantUser, &[Channel::Websocket, Channel::Push])
                // personal preferences are ignored for team notifications
                .with_user(RecipientCategory::RestaurantTeam, 7, &[]),
            staff(),
            StaticBlocks::new(),
        ));

        let mut msg = message(
            "RESERVATION_REQUESTED",
            "CUSTOMER",
            serde_json::json!({"customerName": "Ada", "pax": 4, "date": "2026-05-01"}),
        );
        msg.restaurant_id = Some(3);

        let records = orchestrator.disaggregate(&msg).await.unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.read_by_all));
        assert!(records.iter().all(|r| r.priority == Priority::High));
        assert_eq!(
            records[0].body,
            "New reservation from Ada for 4 people on 2026-05-01"
        );

        for record in records.iter().filter(|r| r.channel == Channel::Websocket) {
            assert_eq!(record.destination(), Some("/topic/restaurant/3/reservations"));
        }
    }

    #[tokio::test]
    async fn test_missing_restaurant_is_malformed() {
        let orchestrator = RestaurantTeamOrchestrator::new(collaborators(
            StaticPolicy::new(),
            staff(),
            StaticBlocks::new(),
        ));

        let msg = message("RESERVATION_REQUESTED", "CUSTOMER", serde_json::json!({}));
        let err = orchestrator.disaggregate(&msg).await.unwrap_err();
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_non_reservation_team_event_keeps_normal_priority() {
        let orchestrator = RestaurantTeamOrchestrator::new(collaborators(
            StaticPolicy::new(),
            staff(),
            StaticBlocks::new(),
        ));

        let mut msg = message("SHIFT_CHANGED", "RESTAURANT", serde_json::json!({}));
        msg.restaurant_id = Some(3);

        let records = orchestrator.disaggregate(&msg).await.unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|r| r.read_by_all));
        assert!(records.iter().all(|r| r.priority == Priority::Normal));
    }
}
