use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::offsets::OffsetTracker;
use crate::pipeline::Intake;
use crate::source::{Ack, QueueMessage};

/// Audit log subscription backed by a Kafka consumer group.
///
/// Offsets are stored only when a message is acknowledged, and never past an
/// older message that is still in flight, so anything unsettled at shutdown is
/// consumed again by the next member of the group.
pub struct KafkaSubscription {
    consumer: Arc<StreamConsumer>,
    tracker: Arc<OffsetTracker>,
    in_flight: Arc<Semaphore>,
    topic: String,
}

impl KafkaSubscription {
    pub fn connect(config: &BridgeConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_bootstrap)
            .set("group.id", &config.subscription)
            .set("enable.partition.eof", "false")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create()
            .context("failed to create kafka consumer")?;
        consumer
            .subscribe(&[&config.topic])
            .with_context(|| format!("failed to subscribe to {}", config.topic))?;
        info!(topic = %config.topic, group = %config.subscription, "subscribed to audit topic");
        Ok(Self {
            consumer: Arc::new(consumer),
            tracker: Arc::new(OffsetTracker::new()),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
            topic: config.topic.clone(),
        })
    }

    /// Feed messages into the pipeline. At most `max_in_flight` messages are
    /// outstanding at once. Only returns when the subscription is gone, which
    /// is always an error for a long-running bridge.
    pub async fn forward(self, intake: Intake) -> Result<()> {
        let mut stream = self.consumer.stream();
        loop {
            let permit = Arc::clone(&self.in_flight)
                .acquire_owned()
                .await
                .context("in-flight limiter closed")?;
            let Some(message) = stream.next().await else {
                break;
            };
            let m = match message {
                Ok(m) => m,
                Err(err) => {
                    warn!(error = %err, "kafka consumer error");
                    continue;
                }
            };
            let partition = m.partition();
            let offset = m.offset();
            let data = m.payload().map(<[u8]>::to_vec).unwrap_or_default();
            let id = format!("{}/{}/{}", m.topic(), partition, offset);
            drop(m);
            self.tracker.track(partition, offset);
            let ack = KafkaAck {
                consumer: Arc::clone(&self.consumer),
                tracker: Arc::clone(&self.tracker),
                topic: self.topic.clone(),
                partition,
                offset,
                _permit: permit,
            };
            intake
                .on_message(QueueMessage::new(id, data, ack))
                .await
                .context("delivery pipeline stopped accepting messages")?;
        }
        anyhow::bail!("subscription to {} closed unexpectedly", self.topic)
    }
}

struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    tracker: Arc<OffsetTracker>,
    topic: String,
    partition: i32,
    offset: i64,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Ack for KafkaAck {
    async fn ack(self: Box<Self>) -> Result<()> {
        let Some(next) = self.tracker.complete(self.partition, self.offset) else {
            return Ok(());
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, Offset::Offset(next))?;
        self.consumer.store_offsets(&tpl)?;
        Ok(())
    }
}
