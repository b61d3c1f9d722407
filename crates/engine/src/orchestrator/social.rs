use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::types::{RecipientCategory, RoutingMessage};

use super::{Collaborators, Orchestrator};
use crate::scope::ScopeContext;

/// Social feed and restaurant event notifications.
///
/// Recipients depend on the event type: followers of an author or a
/// restaurant, the author of the post or story that was acted on, the
/// followed or following user, or the attendee of an event.
pub struct SocialOrchestrator {
    collaborators: Collaborators,
}

impl SocialOrchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }
}

fn single(payload: &serde_json::Value, key: &str) -> Result<Vec<i64>, AppError> {
    Ok(payload::opt_i64(payload, key)?.into_iter().collect())
}

#[async_trait]
impl Orchestrator for SocialOrchestrator {
    fn category(&self) -> RecipientCategory {
        RecipientCategory::Social
    }

    fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    fn context(&self, _message: &RoutingMessage) -> Result<ScopeContext, AppError> {
        Ok(ScopeContext::unscoped(RecipientCategory::Social))
    }

    async fn resolve_recipients(
        &self,
        message: &RoutingMessage,
        _context: &ScopeContext,
    ) -> Result<Vec<i64>, AppError> {
        let payload = &message.payload;
        let directory = &self.collaborators.directory;

        match message.event_type.as_str() {
            "SOCIAL_NEW_POST" | "SOCIAL_NEW_STORY" => {
                match payload::opt_i64(payload, "authorId")? {
                    Some(author) => {
                        let followers = if payload::opt_str(payload, "authorType")
                            .is_some_and(|t| t.eq_ignore_ascii_case("RESTAURANT"))
                        {
                            directory.followers_of_restaurant(author).await?
                        } else {
                            directory.followers_of_user(author).await?
                        };
                        Ok(followers)
                    }
                    None => Ok(Vec::new()),
                }
            }
            "SOCIAL_POST_LIKED" | "SOCIAL_POST_COMMENTED" | "SOCIAL_POST_SHARED"
            | "SOCIAL_USER_MENTIONED" => single(payload, "postAuthorId"),
            "SOCIAL_NEW_FOLLOWER" | "SOCIAL_FOLLOW_REQUEST" => single(payload, "followingId"),
            "SOCIAL_FOLLOW_ACCEPTED" => single(payload, "followerId"),
            "SOCIAL_STORY_REPLY" => single(payload, "storyAuthorId"),
            "EVENT_CREATED" => match payload::opt_i64(payload, "restaurantId")? {
                Some(restaurant) => directory.followers_of_restaurant(restaurant).await,
                None => Ok(Vec::new()),
            },
            "EVENT_REMINDER" | "EVENT_UPDATED" | "EVENT_CANCELLED"
            | "EVENT_RSVP_STATUS_CHANGED" => single(payload, "userId"),
            _ => Ok(message
                .recipient_id
                .or(payload::opt_i64(payload, "recipientId")?)
                .into_iter()
                .collect()),
        }
    }

    fn destination(
        &self,
        message: &RoutingMessage,
        _context: &ScopeContext,
        user_id: i64,
    ) -> Option<String> {
        let topic = match message.event_type.as_str() {
            "SOCIAL_NEW_POST" | "SOCIAL_POST_LIKED" | "SOCIAL_POST_COMMENTED"
            | "SOCIAL_POST_SHARED" => "social/feed",
            "SOCIAL_NEW_FOLLOWER" | "SOCIAL_FOLLOW_REQUEST" | "SOCIAL_FOLLOW_ACCEPTED" => {
                "social/followers"
            }
            "SOCIAL_NEW_STORY" | "SOCIAL_STORY_REPLY" => "social/stories",
            "SOCIAL_USER_MENTIONED" => "social/mentions",
            "EVENT_CREATED" | "EVENT_REMINDER" | "EVENT_UPDATED" | "EVENT_CANCELLED"
            | "EVENT_RSVP_STATUS_CHANGED" => "event",
            _ => "social",
        };
        Some(format!("/topic/{}/{}", topic, user_id))
    }
}
