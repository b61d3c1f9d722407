//! In-memory collaborators for tests and single-node runs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use herald_common::error::AppError;
use herald_common::types::{Channel, NotificationRecord, RecipientCategory};

use crate::blocks::BlockService;
use crate::channels::ChannelSet;
use crate::directory::RecipientDirectory;
use crate::policy::{ChannelRule, DefaultPolicy, PolicyStore};
use crate::scope::ScopeContext;
use crate::sink::NotificationSink;

/// Fixed recipient directory.
#[derive(Default)]
pub struct StaticDirectory {
    members: HashMap<(RecipientCategory, Option<i64>), Vec<i64>>,
    participants: HashMap<i64, Vec<i64>>,
    user_followers: HashMap<i64, Vec<i64>>,
    restaurant_followers: HashMap<i64, Vec<i64>>,
    lookups: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(
        mut self,
        category: RecipientCategory,
        scope_id: Option<i64>,
        users: &[i64],
    ) -> Self {
        self.members
            .entry((category, scope_id))
            .or_default()
            .extend_from_slice(users);
        self
    }

    pub fn with_participants(mut self, conversation_id: i64, users: &[i64]) -> Self {
        self.participants.insert(conversation_id, users.to_vec());
        self
    }

    pub fn with_user_followers(mut self, user_id: i64, followers: &[i64]) -> Self {
        self.user_followers.insert(user_id, followers.to_vec());
        self
    }

    pub fn with_restaurant_followers(mut self, restaurant_id: i64, followers: &[i64]) -> Self {
        self.restaurant_followers
            .insert(restaurant_id, followers.to_vec());
        self
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn active_members(
        &self,
        category: RecipientCategory,
        scope_id: Option<i64>,
    ) -> Result<Vec<i64>, AppError> {
        self.count();
        let users: BTreeSet<i64> = self
            .members
            .iter()
            .filter(|((c, s), _)| *c == category && (scope_id.is_none() || *s == scope_id))
            .flat_map(|(_, users)| users.iter().copied())
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn conversation_participants(&self, conversation_id: i64) -> Result<Vec<i64>, AppError> {
        self.count();
        Ok(self
            .participants
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn followers_of_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        self.count();
        Ok(self.user_followers.get(&user_id).cloned().unwrap_or_default())
    }

    async fn followers_of_restaurant(&self, restaurant_id: i64) -> Result<Vec<i64>, AppError> {
        self.count();
        Ok(self
            .restaurant_followers
            .get(&restaurant_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Policy with per-test overrides on top of [`DefaultPolicy`].
#[derive(Default)]
pub struct StaticPolicy {
    rules: HashMap<(RecipientCategory, String), ChannelRule>,
    groups: HashMap<RecipientCategory, ChannelSet>,
    users: HashMap<(RecipientCategory, i64), ChannelSet>,
    failing: AtomicBool,
}

impl StaticPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(
        mut self,
        category: RecipientCategory,
        event_type: &str,
        mandatory: &[Channel],
        optional: &[Channel],
    ) -> Self {
        self.rules.insert(
            (category, event_type.to_string()),
            ChannelRule::new(mandatory, optional),
        );
        self
    }

    pub fn with_group(mut self, category: RecipientCategory, enabled: &[Channel]) -> Self {
        self.groups
            .insert(category, enabled.iter().copied().collect());
        self
    }

    pub fn with_user(mut self, category: RecipientCategory, user_id: i64, enabled: &[Channel]) -> Self {
        self.users
            .insert((category, user_id), enabled.iter().copied().collect());
        self
    }

    /// Make every lookup fail, simulating an unreachable policy store.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Policy("policy store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for StaticPolicy {
    async fn event_type_rules(
        &self,
        category: RecipientCategory,
        event_type: &str,
    ) -> Result<ChannelRule, AppError> {
        self.check()?;
        Ok(self
            .rules
            .get(&(category, event_type.to_string()))
            .cloned()
            .unwrap_or_else(|| DefaultPolicy::rule(category, event_type)))
    }

    async fn group_settings(&self, context: &ScopeContext) -> Result<ChannelSet, AppError> {
        self.check()?;
        Ok(self
            .groups
            .get(&context.category)
            .cloned()
            .unwrap_or_else(|| DefaultPolicy::group(context.category)))
    }

    async fn user_preferences(
        &self,
        category: RecipientCategory,
        user_id: i64,
    ) -> Result<ChannelSet, AppError> {
        self.check()?;
        Ok(self
            .users
            .get(&(category, user_id))
            .cloned()
            .unwrap_or_else(|| DefaultPolicy::user(category)))
    }
}

/// Block service driven by explicit suppression sets.
#[derive(Default)]
pub struct StaticBlocks {
    global: HashSet<String>,
    user_channels: HashSet<(i64, Channel)>,
    scope_channels: HashSet<(RecipientCategory, i64, Channel)>,
}

impl StaticBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_event_type(mut self, event_type: &str) -> Self {
        self.global.insert(event_type.to_string());
        self
    }

    pub fn block_user_channel(mut self, user_id: i64, channel: Channel) -> Self {
        self.user_channels.insert((user_id, channel));
        self
    }

    pub fn block_scope_channel(
        mut self,
        category: RecipientCategory,
        scope_id: i64,
        channel: Channel,
    ) -> Self {
        self.scope_channels.insert((category, scope_id, channel));
        self
    }
}

#[async_trait]
impl BlockService for StaticBlocks {
    async fn is_globally_blocked(&self, event_type: &str) -> Result<bool, AppError> {
        Ok(self.global.contains(event_type))
    }

    async fn can_send(
        &self,
        event_type: &str,
        channel: Channel,
        user_id: i64,
        context: &ScopeContext,
    ) -> Result<bool, AppError> {
        if self.global.contains(event_type) || self.user_channels.contains(&(user_id, channel)) {
            return Ok(false);
        }
        let scope_blocked = context
            .scope_id
            .is_some_and(|scope| self.scope_channels.contains(&(context.category, scope, channel)));
        Ok(!scope_blocked)
    }
}

/// Sink that keeps records in memory, idempotent like the Postgres sink.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<NotificationRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn accept(&self, records: &[NotificationRecord]) -> Result<u64, AppError> {
        let mut stored = self
            .records
            .lock()
            .map_err(|_| AppError::Internal("memory sink lock poisoned".to_string()))?;

        let mut inserted = 0;
        for record in records {
            let duplicate = stored.iter().any(|r| {
                r.source_event_id == record.source_event_id
                    && r.user_id == record.user_id
                    && r.channel == record.channel
            });
            if !duplicate {
                stored.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
