use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Priority, RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator, members_or_target};
use crate::scope::ScopeContext;

/// Personal notifications for restaurant staff.
pub struct RestaurantUserOrchestrator {
    collaborators: Collaborators,
}

impl RestaurantUserOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for RestaurantUserOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::RestaurantUser
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        Ok(ScopeContext::new(
            RecipientCategory::RestaurantUser,
            message.restaurant_id,
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
            RecipientCategory::RestaurantUser,
            context.scope_id,
            None,
        )
        .await
    }

    fn priority(&self, event_type: &str) -> Priority {
        match event_type {
            "KITCHEN_ALERT" | "CRITICAL_RESERVATION" | "RESERVATION_REQUESTED" | "NEW_ORDER" => {
                Priority::High
            }
            _ => Priority::Normal,
        }
    }

    fn read_by_all(&self, event_type: &str) -> bool {
        matches!(
            event_type,
            "RESERVATION_REQUESTED" | "NEW_ORDER" | "KITCHEN_ALERT"
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
            .map(|restaurant_id| format!("/topic/restaurant/{}/user/{}", restaurant_id, user_id))
    }
}
