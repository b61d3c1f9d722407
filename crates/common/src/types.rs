use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle of a row in the event outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Processed,
    /// Parked after exhausting the configured publish attempts.
    Failed,
}

/// Processing state of an idempotency ledger marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    Processing,
    Success,
}

/// Coarse routing tag written by domain code on every outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateType {
    Restaurant,
    Customer,
    Agency,
    Admin,
    Broadcast,
    Chat,
    Social,
}

impl FromStr for AggregateType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTAURANT" => Ok(AggregateType::Restaurant),
            "CUSTOMER" => Ok(AggregateType::Customer),
            "AGENCY" => Ok(AggregateType::Agency),
            "ADMIN" => Ok(AggregateType::Admin),
            "BROADCAST" => Ok(AggregateType::Broadcast),
            "CHAT" => Ok(AggregateType::Chat),
            "SOCIAL" => Ok(AggregateType::Social),
            _ => Err(AppError::UnknownRecipientType(s.to_string())),
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateType::Restaurant => write!(f, "RESTAURANT"),
            AggregateType::Customer => write!(f, "CUSTOMER"),
            AggregateType::Agency => write!(f, "AGENCY"),
            AggregateType::Admin => write!(f, "ADMIN"),
            AggregateType::Broadcast => write!(f, "BROADCAST"),
            AggregateType::Chat => write!(f, "CHAT"),
            AggregateType::Social => write!(f, "SOCIAL"),
        }
    }
}

/// Whether a message addresses every member of a category or one recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecipientType {
    Broadcast,
    #[default]
    Targeted,
}

impl RecipientType {
    /// Lenient decode used for the optional `recipientType` payload hint.
    /// Anything other than `BROADCAST` addresses a single recipient.
    pub fn from_hint(hint: &str) -> Self {
        if hint.trim().eq_ignore_ascii_case("BROADCAST") {
            RecipientType::Broadcast
        } else {
            RecipientType::Targeted
        }
    }
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientType::Broadcast => write!(f, "BROADCAST"),
            RecipientType::Targeted => write!(f, "TARGETED"),
        }
    }
}

/// Recipient category served by exactly one disaggregation orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecipientCategory {
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "CUSTOMER")]
    Customer,
    /// Personal notifications for restaurant staff.
    #[serde(rename = "RESTAURANT")]
    RestaurantUser,
    /// Team-shared notifications for every on-duty staff member.
    #[serde(rename = "RESTAURANT_TEAM")]
    RestaurantTeam,
    #[serde(rename = "AGENCY")]
    Agency,
    #[serde(rename = "CHAT")]
    Chat,
    #[serde(rename = "SOCIAL")]
    Social,
}

impl RecipientCategory {
    pub const ALL: [RecipientCategory; 7] = [
        RecipientCategory::Admin,
        RecipientCategory::Customer,
        RecipientCategory::RestaurantUser,
        RecipientCategory::RestaurantTeam,
        RecipientCategory::Agency,
        RecipientCategory::Chat,
        RecipientCategory::Social,
    ];

    /// Dispatch tag shared by the publisher's routing and the orchestrator factory.
    pub fn tag(&self) -> &'static str {
        match self {
            RecipientCategory::Admin => "ADMIN",
            RecipientCategory::Customer => "CUSTOMER",
            RecipientCategory::RestaurantUser => "RESTAURANT",
            RecipientCategory::RestaurantTeam => "RESTAURANT_TEAM",
            RecipientCategory::Agency => "AGENCY",
            RecipientCategory::Chat => "CHAT",
            RecipientCategory::Social => "SOCIAL",
        }
    }
}

impl FromStr for RecipientCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RecipientCategory::ALL
            .into_iter()
            .find(|c| c.tag() == wanted)
            .ok_or_else(|| AppError::UnknownRecipientType(s.to_string()))
    }
}

impl std::fmt::Display for RecipientCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Notification delivery channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Push,
    Sms,
    Websocket,
    Slack,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Email,
        Channel::Push,
        Channel::Sms,
        Channel::Websocket,
        Channel::Slack,
    ];
}

impl FromStr for Channel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMAIL" => Ok(Channel::Email),
            "PUSH" => Ok(Channel::Push),
            "SMS" => Ok(Channel::Sms),
            "WEBSOCKET" => Ok(Channel::Websocket),
            "SLACK" => Ok(Channel::Slack),
            _ => Err(AppError::Validation(format!("Unknown channel '{}'", s))),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Email => write!(f, "EMAIL"),
            Channel::Push => write!(f, "PUSH"),
            Channel::Sms => write!(f, "SMS"),
            Channel::Websocket => write!(f, "WEBSOCKET"),
            Channel::Slack => write!(f, "SLACK"),
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
        }
    }
}

/// Notification delivery status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "PENDING"),
            DeliveryStatus::Sent => write!(f, "SENT"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "PENDING"),
            OutboxStatus::Processed => write!(f, "PROCESSED"),
            OutboxStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerStatus::Processing => write!(f, "PROCESSING"),
            LedgerStatus::Success => write!(f, "SUCCESS"),
        }
    }
}

/// A domain event waiting in the outbox table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEvent {
    /// Row id; `event_id` is the logical identity.
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    /// Kept as text so unknown tags can be stored and surfaced.
    pub aggregate_type: String,
    pub aggregate_id: Option<i64>,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Lightweight bus payload produced once per outbox event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMessage {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    #[serde(default)]
    pub aggregate_id: Option<i64>,
    #[serde(default)]
    pub recipient_type: RecipientType,
    #[serde(rename = "recipient_id", default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<i64>,
    #[serde(rename = "hub_id", default, skip_serializing_if = "Option::is_none")]
    pub hub_id: Option<i64>,
    #[serde(rename = "restaurant_id", default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<i64>,
    #[serde(rename = "customer_id", default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(rename = "agency_id", default, skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<i64>,
    #[serde(rename = "admin_id", default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<i64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Property key holding the real-time destination of a websocket record.
pub const DESTINATION_PROPERTY: &str = "destination";

/// One (recipient, channel) notification produced by an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Disaggregated id, unique per record.
    pub event_id: String,
    pub source_event_id: String,
    pub category: RecipientCategory,
    /// Restaurant, agency or conversation the record belongs to.
    pub scope_id: Option<i64>,
    pub user_id: i64,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub event_type: String,
    pub aggregate_type: String,
    /// `true` for team-shared notifications, `false` for personal ones.
    pub read_by_all: bool,
    pub properties: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn destination(&self) -> Option<&str> {
        self.properties.get(DESTINATION_PROPERTY).map(String::as_str)
    }
}
