use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Priority, RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator, members_or_target};
use crate::scope::ScopeContext;

/// Agency staff notifications, scoped to the agency and an optional hub.
pub struct AgencyOrchestrator {
    collaborators: Collaborators,
}

impl AgencyOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for AgencyOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::Agency
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        Ok(ScopeContext::new(
            RecipientCategory::Agency,
            message.agency_id,
            message.hub_id,
        ))
    }

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        members_or_target(
            &self.collaborators,
            message,
            RecipientCategory::Agency,
            context.scope_id,
            None,
        )
        .await
    }

    fn priority(&self, event_type: &str) -> Priority {
        match event_type {
            "URGENT_BOOKING" | "CRITICAL_ASSIGNMENT" | "BOOKING_REQUEST" | "NEW_BOOKING" => {
                Priority::High
            }
            _ => Priority::Normal,
        }
    }

    fn read_by_all(&self, event_type: &str) -> bool {
        matches!(
            event_type,
            "BOOKING_REQUEST" | "NEW_BOOKING" | "URGENT_BOOKING"
        )
    }

    fn destination(
        &self,
        _message: &RoutingMessage,
        context: &ScopeContext,
        user_id: i64,
    ) -> Option<String> {
        context
            .scope_id
            .map(|agency_id| format!("/topic/agency/{}/user/{}", agency_id, user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{StaticBlocks, StaticDirectory, StaticPolicy};
    use crate::orchestrator::test_support::{collaborators, message};
    use herald_common::types::Channel;

    #[tokio::test]
    async fn test_urgent_booking_is_shared_and_pushes() {
        let orchestrator = AgencyOrchestrator::new(collaborators(
            StaticPolicy::new(),
            StaticDirectory::new(),
            StaticBlocks::new(),
        ));

        let mut msg = message("URGENT_BOOKING", "AGENCY", serde_json::json!({"bookingId": 5}));
        msg.agency_id = Some(2);
        msg.recipient_id = Some(31);

        let records = orchestrator.disaggregate(&msg).await.unwrap();
        let channels: Vec<Channel> = records.iter().map(|r| r.channel).collect();
        // mandatory websocket + push, plus email allowed by group and user
        assert_eq!(channels, vec![Channel::Email, Channel::Push, Channel::Websocket]);
        assert!(records.iter().all(|r| r.read_by_all && r.priority == Priority::High));

        let websocket = records.iter().find(|r| r.channel == Channel::Websocket).unwrap();
        assert_eq!(websocket.destination(), Some("/topic/agency/2/user/31"));
    }

    #[tokio::test]
    async fn test_user_block_is_respected() {
        let orchestrator = AgencyOrchestrator::new(collaborators(
            StaticPolicy::new(),
            StaticDirectory::new(),
            StaticBlocks::new().block_user_channel(31, Channel::Email),
        ));

        let mut msg = message("ASSIGNMENT_AVAILABLE", "AGENCY", serde_json::json!({}));
        msg.agency_id = Some(2);
        msg.recipient_id = Some(31);

        let records = orchestrator.disaggregate(&msg).await.unwrap();
        let channels: Vec<Channel> = records.iter().map(|r| r.channel).collect();
        assert_eq!(channels, vec![Channel::Websocket]);
        assert!(records.iter().all(|r| !r.read_by_all));
    }
}
