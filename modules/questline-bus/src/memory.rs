//! In-memory at-least-once bus for tests and single-process runs.
//!
//! Topics retain every accepted publish; a group joining later starts from
//! the beginning (the earliest-offset behavior of the Kafka backend).
//! Nacked messages rejoin their group queue. A per-topic failure toggle
//! lets tests exercise the outbox path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::{BusMessage, BusPublisher, BusSubscriber, MessageBus, PublishError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
struct Inner {
    /// Retained log per topic.
    topics: HashMap<String, Vec<serde_json::Value>>,
    /// Pending and in-flight messages per (topic, group).
    groups: HashMap<(String, String), GroupQueue>,
    /// Topics whose publishes currently fail.
    failing: HashSet<String>,
    next_tag: i64,
}

#[derive(Default)]
struct GroupQueue {
    queue: VecDeque<BusMessage>,
    in_flight: HashMap<i64, BusMessage>,
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to `topic` fail until restored.
    pub fn fail_topic(&self, topic: &str) {
        self.inner.lock().unwrap().failing.insert(topic.to_string());
    }

    pub fn restore_topic(&self, topic: &str) {
        self.inner.lock().unwrap().failing.remove(topic);
    }

    /// How many publishes a topic has accepted.
    pub fn published_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .topics
            .get(topic)
            .map(|log| log.len())
            .unwrap_or(0)
    }

    /// Accepted payloads for a topic, in publish order.
    pub fn published_payloads(&self, topic: &str) -> Vec<serde_json::Value> {
        self.inner
            .lock()
            .unwrap()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn publish(
        &self,
        topic: &str,
        _key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(topic) {
            return Err(PublishError::Send {
                topic: topic.to_string(),
                reason: "memory bus: topic forced to fail".to_string(),
            });
        }

        inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(payload.clone());

        // Fan out to every group subscribed to this topic.
        let keys: Vec<(String, String)> = inner
            .groups
            .keys()
            .filter(|(t, _)| t == topic)
            .cloned()
            .collect();
        for key in keys {
            inner.next_tag += 1;
            let message = BusMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
                offset: inner.next_tag,
                partition: 0,
            };
            if let Some(group) = inner.groups.get_mut(&key) {
                group.queue.push_back(message);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn publisher(&self) -> Arc<dyn BusPublisher> {
        Arc::new(self.clone())
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn BusSubscriber>> {
        let mut inner = self.inner.lock().unwrap();
        let key = (topic.to_string(), group.to_string());

        if !inner.groups.contains_key(&key) {
            // New group: replay the retained log from the beginning.
            let backlog: Vec<serde_json::Value> =
                inner.topics.get(topic).cloned().unwrap_or_default();
            let mut queue = GroupQueue::default();
            for payload in backlog {
                inner.next_tag += 1;
                queue.queue.push_back(BusMessage {
                    topic: topic.to_string(),
                    payload,
                    offset: inner.next_tag,
                    partition: 0,
                });
            }
            inner.groups.insert(key.clone(), queue);
        }

        Ok(Box::new(MemorySubscriber {
            inner: self.inner.clone(),
            key,
        }))
    }
}

pub struct MemorySubscriber {
    inner: Arc<Mutex<Inner>>,
    key: (String, String),
}

#[async_trait]
impl BusSubscriber for MemorySubscriber {
    async fn next(&mut self) -> Result<BusMessage> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(group) = inner.groups.get_mut(&self.key) {
                    if let Some(message) = group.queue.pop_front() {
                        group.in_flight.insert(message.offset, message.clone());
                        return Ok(message);
                    }
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&mut self, message: &BusMessage) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(group) = inner.groups.get_mut(&self.key) {
            group.in_flight.remove(&message.offset);
        }
        Ok(())
    }

    async fn nack(&mut self, message: &BusMessage) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(group) = inner.groups.get_mut(&self.key) {
            if let Some(message) = group.in_flight.remove(&message.offset) {
                group.queue.push_back(message);
            }
        }
        Ok(())
    }
}
