//! Message-bus capability traits with two backends.
//!
//! The pipeline composes over these traits; production wires the Kafka
//! backend, tests and local runs wire the in-memory backend. Delivery is
//! at-least-once in both: a negative-ack puts the message back in line.

pub mod kafka;
pub mod memory;

use async_trait::async_trait;

/// A message as seen by a consumer.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    /// Backend delivery handle (Kafka offset, memory queue tag).
    pub offset: i64,
    pub partition: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publish to {topic} failed: {reason}")]
    Send { topic: String, reason: String },

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

/// Fire a message at a topic. Completion of the future is the send result —
/// an `Err` means the broker never accepted the message.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError>;
}

/// One consumer's view of a (topic, group) subscription.
///
/// `next` blocks until a message is available. `ack` marks it consumed;
/// `nack` requests redelivery. Messages neither acked nor nacked are
/// redelivered after the consumer fails.
#[async_trait]
pub trait BusSubscriber: Send {
    async fn next(&mut self) -> anyhow::Result<BusMessage>;
    async fn ack(&mut self, message: &BusMessage) -> anyhow::Result<()>;
    async fn nack(&mut self, message: &BusMessage) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    fn publisher(&self) -> std::sync::Arc<dyn BusPublisher>;
    async fn subscribe(&self, topic: &str, group: &str) -> anyhow::Result<Box<dyn BusSubscriber>>;
}
