use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::types::{RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator};
use crate::scope::ScopeContext;

/// Chat events fan out to every participant of the conversation except the
/// sender.
pub struct ChatOrchestrator {
    collaborators: Collaborators,
}

impl ChatOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

#[async_trait]
impl Orchestrator for ChatOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::Chat
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        let conversation_id = payload::req_i64(&message.payload, "conversationId")?;
        Ok(ScopeContext::new(
            RecipientCategory::Chat,
            Some(conversation_id),
            None,
        ))
    }

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        let Some(conversation_id) = context.scope_id else {
            return Ok(Vec::new());
        };
        let sender = payload::opt_i64(&message.payload, "senderId")?;

        let participants = self
            .collaborators
            .directory
            .conversation_participants(conversation_id)
            .await?;

        Ok(participants
            .into_iter()
            .filter(|user| Some(*user) != sender)
            .collect())
    }

    fn destination(
        &self,
        message: &RoutingMessage,
        context: &ScopeContext,
        _user_id: i64,
    ) -> Option<String> {
        let conversation_id = context.scope_id?;
        let destination = match message.event_type.as_str() {
            "CHAT_MESSAGE_RECEIVED" => format!("/topic/chat/direct/{}", conversation_id),
            "CHAT_GROUP_MESSAGE" => format!("/topic/chat/group/{}", conversation_id),
            "CHAT_RESERVATION_MESSAGE" => {
                let reservation = payload::opt_i64(&message.payload, "reservationId")
                    .ok()
                    .flatten()
                    .unwrap_or(conversation_id);
                format!("/topic/chat/reservation/{}", reservation)
            }
            "CHAT_TYPING_INDICATOR" | "CHAT_MESSAGES_READ" | "CHAT_USER_JOINED"
            | "CHAT_USER_LEFT" => format!("/topic/chat/presence/{}", conversation_id),
            _ => format!("/topic/chat/{}", conversation_id),
        };
        Some(destination)
    }
}
