//! One consumer loop per queue.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use herald_common::bus::{Delivery, MessageBus};
use herald_common::error::AppError;

use crate::dispatch::Dispatcher;

/// Pause after a bus error or a requeued delivery.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// What was done with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Acked,
    Requeued,
    DeadLettered,
}

/// Heartbeat lifetime when none is configured.
pub const DEFAULT_CONSUMER_TTL: Duration = Duration::from_secs(30);

/// Consumes one queue. Each instance gets its own id; the deliveries it holds
/// are only returned to the queue once its heartbeat lapses.
pub struct QueueConsumer {
    queue: String,
    id: String,
    bus: Arc<dyn MessageBus>,
    dispatcher: Arc<Dispatcher>,
    block_timeout_secs: f64,
    ttl: Duration,
}

impl QueueConsumer {
    pub fn new(
        queue: &str,
        bus: Arc<dyn MessageBus>,
        dispatcher: Arc<Dispatcher>,
        block_timeout_secs: f64,
    ) -> Self {
        Self {
            queue: queue.to_string(),
            id: Uuid::new_v4().to_string(),
            bus,
            dispatcher,
            block_timeout_secs,
            ttl: DEFAULT_CONSUMER_TTL,
        }
    }

    /// Heartbeat lifetime. Must exceed the block timeout.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Refresh this consumer's heartbeat.
    pub async fn heartbeat(&self) -> Result<(), AppError> {
        self.bus.heartbeat(&self.queue, &self.id, self.ttl).await
    }

    /// Return deliveries held by dead consumers of this queue.
    pub async fn recover_orphans(&self) -> Result<usize, AppError> {
        let recovered = self.bus.recover(&self.queue).await?;
        if recovered > 0 {
            tracing::warn!(queue = %self.queue, recovered, "Returned orphaned deliveries to queue");
        }
        Ok(recovered)
    }

    /// Consume until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.heartbeat().await?;
        self.recover_orphans().await?;

        tracing::info!(queue = %self.queue, consumer = %self.id, "Queue consumer started");

        tokio::select! {
            result = self.keep_alive() => result,
            result = self.consume() => result,
        }
    }

    async fn keep_alive(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval((self.ttl / 3).max(Duration::from_millis(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = self.heartbeat().await {
                tracing::warn!(queue = %self.queue, error = %e, "Consumer heartbeat failed");
                continue;
            }
            // Deliveries of an instance that died while this one runs.
            if let Err(e) = self.recover_orphans().await {
                tracing::warn!(queue = %self.queue, error = %e, "Orphan recovery failed");
            }
        }
    }

    async fn consume(&self) -> anyhow::Result<()> {
        loop {
            match self.poll_once().await {
                Ok(Some(Handled::Requeued)) => tokio::time::sleep(RETRY_BACKOFF).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(queue = %self.queue, error = %e, "Bus receive failed, retrying");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    /// Wait for and handle at most one delivery.
    pub async fn poll_once(&self) -> Result<Option<Handled>, AppError> {
        match self.bus.receive(&self.queue, &self.id, self.block_timeout_secs).await? {
            Some(delivery) => Ok(Some(self.handle(&delivery).await?)),
            None => Ok(None),
        }
    }

    /// Ack on success; requeue retryable failures; dead-letter the rest.
    pub async fn handle(&self, delivery: &Delivery) -> Result<Handled, AppError> {
        match self.dispatcher.dispatch(&delivery.queue, &delivery.body).await {
            Ok(_) => {
                self.bus.ack(delivery).await?;
                Ok(Handled::Acked)
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(queue = %delivery.queue, error = %e, "Dispatch failed, requeueing");
                self.bus.nack(delivery, true).await?;
                Ok(Handled::Requeued)
            }
            Err(e) => {
                tracing::error!(queue = %delivery.queue, error = %e, "Dispatch rejected, dead-lettering");
                self.bus.nack(delivery, false).await?;
                Ok(Handled::DeadLettered)
            }
        }
    }
}
