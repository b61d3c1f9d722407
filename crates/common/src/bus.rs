//! Durable message bus between the outbox publisher and the notifier.
//!
//! Queues are Redis lists used as reliable queues:
//! 1. `publish` LPUSHes onto the queue
//! 2. `receive` BLMOVEs the oldest message into the consumer's own
//!    `<queue>:processing:<consumer>` list
//! 3. `ack` LREMs it from that processing list
//! 4. `nack` moves it back to the queue or into the dead-letter queue
//! 5. `heartbeat` keeps `<queue>:alive:<consumer>` alive for a TTL
//! 6. `recover` returns the deliveries of consumers whose heartbeat lapsed
//!
//! [`MemoryBus`] implements the same contract in-process for tests and
//! single-node runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::error::AppError;
use crate::queues;

/// A message taken from a queue but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    /// Consumer instance holding the delivery.
    pub consumer: String,
    pub body: String,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Durably enqueue `body` on `queue`.
    async fn publish(&self, queue: &str, body: &str) -> Result<(), AppError>;

    /// Wait up to `timeout_secs` for the next message on `queue` and hold it
    /// for `consumer` until acked or nacked.
    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout_secs: f64,
    ) -> Result<Option<Delivery>, AppError>;

    /// Confirm a delivery was fully handled.
    async fn ack(&self, delivery: &Delivery) -> Result<(), AppError>;

    /// Reject a delivery. `requeue` puts it back for another attempt,
    /// otherwise it is parked on the dead-letter queue.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), AppError>;

    /// Mark `consumer` alive on `queue` for `ttl`.
    async fn heartbeat(&self, queue: &str, consumer: &str, ttl: Duration) -> Result<(), AppError>;

    /// Return to the queue the deliveries held by consumers of `queue` whose
    /// heartbeat has lapsed. Live consumers keep theirs.
    async fn recover(&self, queue: &str) -> Result<usize, AppError>;
}

fn processing_key(queue: &str, consumer: &str) -> String {
    format!("{}:processing:{}", queue, consumer)
}

fn alive_key(queue: &str, consumer: &str) -> String {
    format!("{}:alive:{}", queue, consumer)
}

fn consumers_key(queue: &str) -> String {
    format!("{}:consumers", queue)
}

/// Redis-backed bus.
#[derive(Clone)]
pub struct RedisBus {
    redis: ConnectionManager,
}

impl RedisBus {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, queue: &str, body: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(queue)
            .arg(body)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout_secs: f64,
    ) -> Result<Option<Delivery>, AppError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("SADD")
            .arg(consumers_key(queue))
            .arg(consumer)
            .query_async(&mut redis)
            .await?;

        let body: Option<String> = redis::cmd("BLMOVE")
            .arg(queue)
            .arg(processing_key(queue, consumer))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout_secs)
            .query_async(&mut redis)
            .await?;

        Ok(body.map(|body| Delivery {
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            body,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(processing_key(&delivery.queue, &delivery.consumer))
            .arg(1)
            .arg(&delivery.body)
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(processing_key(&delivery.queue, &delivery.consumer))
            .arg(1)
            .arg(&delivery.body)
            .ignore();

        if requeue {
            pipe.cmd("LPUSH").arg(&delivery.queue).arg(&delivery.body).ignore();
        } else {
            pipe.cmd("LPUSH")
                .arg(queues::DEAD_LETTER)
                .arg(&delivery.body)
                .ignore();
        }

        let _: () = pipe.query_async(&mut redis).await?;
        Ok(())
    }

    async fn heartbeat(&self, queue: &str, consumer: &str, ttl: Duration) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(alive_key(queue, consumer))
            .arg(1)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .ignore()
            .cmd("SADD")
            .arg(consumers_key(queue))
            .arg(consumer)
            .ignore()
            .query_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize, AppError> {
        let mut redis = self.redis.clone();
        let consumers: Vec<String> = redis::cmd("SMEMBERS")
            .arg(consumers_key(queue))
            .query_async(&mut redis)
            .await?;
        let mut recovered = 0;

        for consumer in consumers {
            let alive: bool = redis::cmd("EXISTS")
                .arg(alive_key(queue, &consumer))
                .query_async(&mut redis)
                .await?;
            if alive {
                continue;
            }

            let processing = processing_key(queue, &consumer);
            loop {
                let moved: Option<String> = redis::cmd("LMOVE")
                    .arg(&processing)
                    .arg(queue)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(&mut redis)
                    .await?;
                if moved.is_none() {
                    break;
                }
                recovered += 1;
            }

            let _: i64 = redis::cmd("SREM")
                .arg(consumers_key(queue))
                .arg(&consumer)
                .query_async(&mut redis)
                .await?;
        }

        if recovered > 0 {
            tracing::warn!(queue, recovered, "Recovered deliveries of dead consumers");
        }
        Ok(recovered)
    }
}

type ConsumerKey = (String, String);

#[derive(Default)]
struct MemoryQueues {
    ready: HashMap<String, VecDeque<String>>,
    processing: HashMap<ConsumerKey, Vec<String>>,
    consumers: HashMap<String, HashSet<String>>,
    alive_until: HashMap<ConsumerKey, tokio::time::Instant>,
}

/// In-process bus with the same queue semantics as [`RedisBus`].
#[derive(Default)]
pub struct MemoryBus {
    queues: Mutex<MemoryQueues>,
    arrivals: tokio::sync::Notify,
    fail_publish: Mutex<Option<String>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `publish` fail with `reason` until cleared.
    pub fn fail_publishes(&self, reason: Option<&str>) {
        if let Ok(mut guard) = self.fail_publish.lock() {
            *guard = reason.map(str::to_string);
        }
    }

    /// Messages waiting on `queue`, oldest first.
    pub fn pending(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .map(|q| {
                q.ready
                    .get(queue)
                    .map(|messages| messages.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Messages delivered from `queue` but not yet acknowledged, across
    /// every consumer.
    pub fn unacked(&self, queue: &str) -> Vec<String> {
        self.queues
            .lock()
            .map(|q| {
                q.processing
                    .iter()
                    .filter(|((q, _), _)| q == queue)
                    .flat_map(|(_, messages)| messages.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryQueues>, AppError> {
        self.queues
            .lock()
            .map_err(|_| AppError::Bus("memory bus lock poisoned".to_string()))
    }

    fn take_ready(&self, queue: &str, consumer: &str) -> Result<Option<String>, AppError> {
        let mut queues = self.lock()?;
        queues
            .consumers
            .entry(queue.to_string())
            .or_default()
            .insert(consumer.to_string());
        let body = queues.ready.get_mut(queue).and_then(VecDeque::pop_front);
        if let Some(body) = &body {
            queues
                .processing
                .entry((queue.to_string(), consumer.to_string()))
                .or_default()
                .push(body.clone());
        }
        Ok(body)
    }

    fn remove_processing(queues: &mut MemoryQueues, delivery: &Delivery) {
        let key = (delivery.queue.clone(), delivery.consumer.clone());
        if let Some(messages) = queues.processing.get_mut(&key)
            && let Some(pos) = messages.iter().position(|m| *m == delivery.body)
        {
            messages.remove(pos);
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, queue: &str, body: &str) -> Result<(), AppError> {
        let failure = self
            .fail_publish
            .lock()
            .map_err(|_| AppError::Bus("memory bus lock poisoned".to_string()))?
            .clone();
        if let Some(reason) = failure {
            return Err(AppError::Bus(reason));
        }

        self.lock()?
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_back(body.to_string());
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout_secs: f64,
    ) -> Result<Option<Delivery>, AppError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(timeout_secs.max(0.0));

        loop {
            let notified = self.arrivals.notified();
            if let Some(body) = self.take_ready(queue, consumer)? {
                return Ok(Some(Delivery {
                    queue: queue.to_string(),
                    consumer: consumer.to_string(),
                    body,
                }));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), AppError> {
        let mut queues = self.lock()?;
        Self::remove_processing(&mut queues, delivery);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), AppError> {
        {
            let mut queues = self.lock()?;
            Self::remove_processing(&mut queues, delivery);
            let target = if requeue {
                delivery.queue.as_str()
            } else {
                queues::DEAD_LETTER
            };
            queues
                .ready
                .entry(target.to_string())
                .or_default()
                .push_back(delivery.body.clone());
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn heartbeat(&self, queue: &str, consumer: &str, ttl: Duration) -> Result<(), AppError> {
        let mut queues = self.lock()?;
        queues
            .consumers
            .entry(queue.to_string())
            .or_default()
            .insert(consumer.to_string());
        queues.alive_until.insert(
            (queue.to_string(), consumer.to_string()),
            tokio::time::Instant::now() + ttl,
        );
        Ok(())
    }

    async fn recover(&self, queue: &str) -> Result<usize, AppError> {
        let recovered = {
            let mut guard = self.lock()?;
            let queues = &mut *guard;
            let now = tokio::time::Instant::now();

            let dead: Vec<String> = queues
                .consumers
                .get(queue)
                .map(|members| {
                    members
                        .iter()
                        .filter(|consumer| {
                            queues
                                .alive_until
                                .get(&(queue.to_string(), consumer.to_string()))
                                .is_none_or(|until| *until <= now)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let mut orphans = Vec::new();
            for consumer in dead {
                let key = (queue.to_string(), consumer.clone());
                orphans.extend(queues.processing.remove(&key).unwrap_or_default());
                queues.alive_until.remove(&key);
                if let Some(members) = queues.consumers.get_mut(queue) {
                    members.remove(&consumer);
                }
            }

            let count = orphans.len();
            let ready = queues.ready.entry(queue.to_string()).or_default();
            for body in orphans.into_iter().rev() {
                ready.push_front(body);
            }
            count
        };
        if recovered > 0 {
            self.arrivals.notify_waiters();
        }
        Ok(recovered)
    }
}
