use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Priority, RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator, members_or_target};
use crate::scope::ScopeContext;

/// Customers: reservation and order updates.
pub struct CustomerOrchestrator {
    collaborators: Collaborators,
}

impl CustomerOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for CustomerOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::Customer
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, _message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        Ok(ScopeContext::unscoped(RecipientCategory::Customer))
    }

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        _context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        members_or_target(
            &self.collaborators,
            message,
            RecipientCategory::Customer,
            None,
            message.customer_id,
        )
        .await
    }

    fn priority(&self, event_type: &str) -> Priority {
        match event_type {
            "RESERVATION_CONFIRMED" | "ORDER_READY" => Priority::High,
            _ => Priority::Normal,
        }
    }

    fn destination(
        &self,
        _message: &RoutingMessage,
        _context: &ScopeContext,
        user_id: i64,
    ) -> Option<String> {
        Some(format!("/topic/customer/{}", user_id))
    }
}
