use async_trait::async_trait;
use std::fmt;

/// Settles one message with the queue it came from.
///
/// Consuming `self` makes acknowledgment a one-shot operation: once a message has
/// been acked its handle is gone and cannot be acked again. Dropping a handle
/// without calling `ack` leaves the message unacknowledged, so the queue will
/// redeliver it.
#[async_trait]
pub trait Ack: Send {
    async fn ack(self: Box<Self>) -> anyhow::Result<()>;
}

/// Handle for queues (or tests) that need no acknowledgment.
pub struct NoopAck;

#[async_trait]
impl Ack for NoopAck {
    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// One opaque payload pulled from the audit subscription.
pub struct QueueMessage {
    id: String,
    data: Vec<u8>,
    ack: Box<dyn Ack>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>, ack: impl Ack + 'static) -> Self {
        Self { id: id.into(), data: data.into(), ack: Box::new(ack) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_parts(self) -> (String, Vec<u8>, Box<dyn Ack>) {
        (self.id, self.data, self.ack)
    }
}

impl fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueMessage")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}
