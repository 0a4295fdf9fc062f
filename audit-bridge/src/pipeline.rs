//! Intake, admission, conversion and delivery of queued audit events.
//!
//! Messages enter through a bounded [`Intake`] queue. A single dispatcher drains
//! it in arrival order, waits for the rate limiter, and hands each admitted
//! message to its own task. Each task converts the payload once, then posts it
//! until it is accepted or the retry budget is spent. Every path through
//! [`DeliveryPipeline::process`] ends in exactly one acknowledgment.

use common_observability::BridgeMetrics;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::delivery::EventSink;
use crate::model::TargetAuditEvent;
use crate::rate_limiter::RateLimiterEngine;
use crate::source::{Ack, QueueMessage};
use crate::transform::{decode, transform};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Pause before each retry. Zero retries immediately.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, delay: Duration::ZERO }
    }
}

/// Terminal state of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered { attempts: u32 },
    Malformed,
    DeliveryFailed { attempts: u32 },
}

#[derive(Debug, Error)]
#[error("delivery pipeline is no longer accepting messages")]
pub struct IntakeClosed;

/// Producer side of the pipeline's work queue, handed to the subscription.
#[derive(Clone)]
pub struct Intake {
    tx: mpsc::Sender<QueueMessage>,
}

impl Intake {
    /// Queue a message for admission. Waits while the queue is full. A message
    /// rejected here is dropped unacknowledged and will be redelivered.
    pub async fn on_message(&self, message: QueueMessage) -> Result<(), IntakeClosed> {
        self.tx.send(message).await.map_err(|_| IntakeClosed)
    }
}

pub struct DeliveryPipeline {
    sink: Arc<dyn EventSink>,
    limiter: Arc<dyn RateLimiterEngine>,
    metrics: BridgeMetrics,
    retry: RetryPolicy,
    worker_concurrency: usize,
    verbose: bool,
}

impl DeliveryPipeline {
    pub fn new(
        sink: Arc<dyn EventSink>,
        limiter: Arc<dyn RateLimiterEngine>,
        metrics: BridgeMetrics,
    ) -> Self {
        Self {
            sink,
            limiter,
            metrics,
            retry: RetryPolicy::default(),
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            verbose: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers.clamp(1, u32::MAX as usize);
        self
    }

    /// Log every payload and converted event at debug level.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Spawn the dispatcher. The returned handle completes once every [`Intake`]
    /// clone is dropped and all admitted messages have settled.
    pub fn start(self, queue_capacity: usize) -> (Intake, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = tokio::spawn(Arc::new(self).run(rx));
        (Intake { tx }, handle)
    }

    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<QueueMessage>) {
        let workers = Arc::new(Semaphore::new(self.worker_concurrency));
        while let Some(message) = rx.recv().await {
            let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                break;
            };
            // token is spent only once a worker is free to start the message
            self.limiter.acquire().await;
            let pipeline = Arc::clone(&self);
            tokio::spawn(async move {
                let _permit = permit;
                pipeline.process(message).await;
            });
        }
        // every permit back means every lifecycle has settled
        let _ = workers.acquire_many(self.worker_concurrency as u32).await;
        info!("delivery pipeline drained");
    }

    /// Run one admitted message to its terminal state.
    pub async fn process(&self, message: QueueMessage) -> Outcome {
        self.metrics.events_received.inc();
        let (message_id, data, ack) = message.into_parts();
        if self.verbose {
            debug!(%message_id, payload = %String::from_utf8_lossy(&data), "receive message");
        }

        let raw = match decode(&data) {
            Ok(raw) => raw,
            Err(err) => {
                error!(%message_id, error = %err, "failed to decode audit event");
                return self.reject(&message_id, ack).await;
            }
        };
        let event = match transform(&raw) {
            Ok(event) => event,
            Err(err) => {
                error!(%message_id, insert_id = %raw.insert_id, error = %err, "failed to convert audit event");
                return self.reject(&message_id, ack).await;
            }
        };
        if self.verbose {
            if let Ok(pretty) = serde_json::to_string_pretty(&event) {
                debug!(audit_id = %event.audit_id, event = %pretty, "converted audit event");
            }
        }

        self.deliver(&message_id, event, ack).await
    }

    async fn reject(&self, message_id: &str, ack: Box<dyn Ack>) -> Outcome {
        settle(message_id, ack).await;
        self.metrics.events_parse_errors.inc();
        Outcome::Malformed
    }

    async fn deliver(&self, message_id: &str, event: TargetAuditEvent, ack: Box<dyn Ack>) -> Outcome {
        let mut attempt: u32 = 0;
        loop {
            match self.sink.deliver(&event).await {
                Ok(()) => {
                    settle(message_id, ack).await;
                    self.metrics.events_delivered.inc();
                    return Outcome::Delivered { attempts: attempt + 1 };
                }
                Err(err) => {
                    error!(
                        audit_id = %event.audit_id,
                        try_number = attempt,
                        status = ?err.status(),
                        error = %err,
                        "failed to send event"
                    );
                    if attempt >= self.retry.max_retries {
                        settle(message_id, ack).await;
                        self.metrics.events_delivery_errors.inc();
                        return Outcome::DeliveryFailed { attempts: attempt + 1 };
                    }
                    attempt += 1;
                    if !self.retry.delay.is_zero() {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }
    }
}

async fn settle(message_id: &str, ack: Box<dyn Ack>) {
    if let Err(err) = ack.ack().await {
        warn!(%message_id, error = %err, "failed to acknowledge message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy_allows_three_immediate_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert!(policy.delay.is_zero());
    }
}
