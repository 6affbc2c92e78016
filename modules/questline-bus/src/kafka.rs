//! Kafka backend over rdkafka.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset, TopicPartitionList};
use tracing::warn;

use crate::{BusMessage, BusPublisher, BusSubscriber, MessageBus, PublishError};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBus {
    brokers: String,
    producer: Arc<KafkaPublisher>,
}

impl KafkaBus {
    pub fn connect(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create Kafka producer")?;

        Ok(Self {
            brokers: brokers.to_string(),
            producer: Arc::new(KafkaPublisher { producer }),
        })
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    fn publisher(&self) -> Arc<dyn BusPublisher> {
        self.producer.clone()
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn BusSubscriber>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .with_context(|| format!("failed to create Kafka consumer for group {group}"))?;

        consumer
            .subscribe(&[topic])
            .with_context(|| format!("failed to subscribe to {topic}"))?;

        Ok(Box::new(KafkaSubscriber { consumer }))
    }
}

pub struct KafkaPublisher {
    producer: FutureProducer,
}

#[async_trait]
impl BusPublisher for KafkaPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| PublishError::Serialization(e.to_string()))?;

        let record = FutureRecord::to(topic).key(key).payload(&bytes);
        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| PublishError::Send {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

pub struct KafkaSubscriber {
    consumer: StreamConsumer,
}

#[async_trait]
impl BusSubscriber for KafkaSubscriber {
    async fn next(&mut self) -> Result<BusMessage> {
        loop {
            let message = self.consumer.recv().await.context("Kafka receive failed")?;
            let Some(bytes) = message.payload() else {
                warn!(
                    topic = message.topic(),
                    offset = message.offset(),
                    "Skipping message with empty payload"
                );
                continue;
            };

            match serde_json::from_slice(bytes) {
                Ok(payload) => {
                    return Ok(BusMessage {
                        topic: message.topic().to_string(),
                        payload,
                        offset: message.offset(),
                        partition: message.partition(),
                    });
                }
                Err(e) => {
                    // A poison message would redeliver forever; drop it.
                    warn!(
                        topic = message.topic(),
                        offset = message.offset(),
                        error = %e,
                        "Skipping undecodable message"
                    );
                    continue;
                }
            }
        }
    }

    async fn ack(&mut self, message: &BusMessage) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .context("Kafka offset commit failed")?;
        Ok(())
    }

    async fn nack(&mut self, message: &BusMessage) -> Result<()> {
        // Rewind to the message so the next poll delivers it again.
        self.consumer
            .seek(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset),
                SEND_TIMEOUT,
            )
            .context("Kafka seek failed")?;
        Ok(())
    }
}
