//! Turns one bus delivery into stored notification records.

use std::sync::Arc;

use herald_common::error::AppError;
use herald_common::payload;
use herald_common::queues;
use herald_common::types::{RecipientCategory, RoutingMessage};
use herald_engine::factory::OrchestratorFactory;
use herald_engine::sink::NotificationSink;

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub category: RecipientCategory,
    /// Records produced by disaggregation.
    pub records: usize,
    /// Records the sink had not seen before.
    pub inserted: u64,
}

pub struct Dispatcher {
    factory: Arc<OrchestratorFactory>,
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(factory: Arc<OrchestratorFactory>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { factory, sink }
    }

    pub fn decode(body: &str) -> Result<RoutingMessage, AppError> {
        serde_json::from_str(body)
            .map_err(|e| AppError::MalformedPayload(format!("undecodable routing message: {}", e)))
    }

    /// Category whose orchestrator handles `message` received on `queue`.
    pub fn category_for(queue: &str, message: &RoutingMessage) -> Result<RecipientCategory, AppError> {
        if let Some(category) = queues::category_of(queue) {
            return Ok(category);
        }
        if queue == queues::BROADCAST {
            return payload::opt_str(&message.payload, "audience")
                .ok_or_else(|| {
                    AppError::UnknownRecipientType(format!(
                        "broadcast {} has no audience",
                        message.event_id
                    ))
                })?
                .parse();
        }
        Err(AppError::UnknownRecipientType(format!("no category for queue {}", queue)))
    }

    /// Decode, disaggregate and store. Nothing reaches the sink unless the
    /// whole fan-out succeeded.
    pub async fn dispatch(&self, queue: &str, body: &str) -> Result<Dispatched, AppError> {
        let message = Self::decode(body)?;
        let category = Self::category_for(queue, &message)?;
        let orchestrator = self.factory.resolve(category.tag())?;

        let records = orchestrator.disaggregate(&message).await?;
        let inserted = if records.is_empty() {
            0
        } else {
            self.sink.accept(&records).await?
        };

        tracing::info!(
            event_id = %message.event_id,
            event_type = %message.event_type,
            %category,
            records = records.len(),
            inserted,
            "Disaggregated event"
        );

        Ok(Dispatched {
            category,
            records: records.len(),
            inserted,
        })
    }
}
