use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Priority, RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator, members_or_target};
use crate::scope::ScopeContext;

/// Platform administrators: incidents, alerts and support tickets.
pub struct AdminOrchestrator {
    collaborators: Collaborators,
}

impl AdminOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for AdminOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::Admin
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, _message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        Ok(ScopeContext::unscoped(RecipientCategory::Admin))
    }

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        _context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        members_or_target(
            &self.collaborators,
            message,
            RecipientCategory::Admin,
            None,
            message.admin_id,
        )
        .await
    }

    fn priority(&self, event_type: &str) -> Priority {
        match event_type {
            "SYSTEM_ERROR"
            | "CRITICAL_INCIDENT"
            | "SECURITY_INCIDENT"
            | "SERVICE_DOWN"
            | "SUPPORT_TICKET_ESCALATED" => Priority::High,
            "SUPPORT_TICKET_RESOLVED" => Priority::Low,
            _ => Priority::Normal,
        }
    }

    fn destination(
        &self,
        _message: &RoutingMessage,
        _context: &ScopeContext,
        user_id: i64,
    ) -> Option<String> {
        Some(format!("/topic/admin/{}", user_id))
    }
}
