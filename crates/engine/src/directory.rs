//! Recipient directory: who belongs to a category, a conversation, or a
//! follower graph.

use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::RecipientCategory;

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Active members of `category`, optionally limited to one organisation.
    async fn active_members(
        &self,
        category: RecipientCategory,
        scope_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError>;

    async fn conversation_participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError>;

    async fn followers_of_user(&self, user_id: i64) -> Result<Vec<i64>, AppError>;

    async fn followers_of_restaurant(&self, restaurant_id: i64) -> Result<Vec<i64>, AppError>;
}

/// Postgres-backed directory.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for PgDirectory {
    async fn active_members(
        &self,
        category: RecipientCategory,
        scope_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT user_id
            FROM recipient_memberships
            WHERE category = $1
              AND active = true
              AND ($2::BIGINT IS NULL OR scope_id = $2)
            "#,
        )
        .bind(category.tag())
        .bind(scope_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn conversation_participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id
            FROM conversation_participants
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn followers_of_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT follower_id
            FROM social_follows
            WHERE followed_type = 'USER'
              AND followed_id = $1
              AND notifications_enabled = true
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn followers_of_restaurant(&self, restaurant_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT follower_id
            FROM social_follows
            WHERE followed_type = 'RESTAURANT'
              AND followed_id = $1
              AND notifications_enabled = true
            "#,
        )
        .bind(restaurant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
