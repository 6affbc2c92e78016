//! Outbox sweeper: re-publishes buffered messages on a fixed cadence.
//!
//! Single-threaded per process. The outbox is not an ordered queue —
//! reordering under retry is acceptable because every downstream consumer
//! is idempotent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use questline_bus::BusPublisher;
use questline_common::OUTBOX_RETRY_DELAY_SECS;

use crate::traits::OutboxStore;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub sent: usize,
    pub rescheduled: usize,
    pub failed: usize,
}

pub struct OutboxSweeper {
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<dyn BusPublisher>,
    batch_size: i64,
}

impl OutboxSweeper {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<dyn BusPublisher>,
        batch_size: i64,
    ) -> Self {
        Self {
            outbox,
            publisher,
            batch_size,
        }
    }

    /// Sweep every 30 seconds until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh enqueue gets
        // its full 30-second delay.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep_once(Utc::now()).await {
                warn!(error = %e, "Outbox sweep failed");
            }
        }
    }

    /// One sweep pass: re-publish every due PENDING entry synchronously.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let due = self.outbox.due(now, self.batch_size).await?;
        let mut stats = SweepStats::default();
        if due.is_empty() {
            return Ok(stats);
        }

        info!(count = due.len(), "Processing pending outbox messages");

        for entry in due {
            let result = self
                .publisher
                .publish(&entry.topic, &entry.event_id.to_string(), &entry.payload)
                .await;

            match result {
                Ok(()) => {
                    self.outbox.delete(entry.event_id).await?;
                    stats.sent += 1;
                    info!(event_id = %entry.event_id, topic = entry.topic.as_str(), "Resent outbox message");
                }
                Err(e) if entry.retry_count + 1 >= entry.max_retries => {
                    self.outbox
                        .mark_failed(entry.event_id, &e.to_string())
                        .await?;
                    stats.failed += 1;
                    error!(
                        event_id = %entry.event_id,
                        topic = entry.topic.as_str(),
                        "Outbox message exceeded max retries"
                    );
                }
                Err(e) => {
                    let next = now + chrono::Duration::seconds(OUTBOX_RETRY_DELAY_SECS);
                    self.outbox
                        .reschedule(entry.event_id, &e.to_string(), next)
                        .await?;
                    stats.rescheduled += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Buffer a failed publish for the sweeper. Best-effort: an outbox write
/// failure is logged, not propagated — the original publish error already
/// decided the caller's outcome.
pub async fn enqueue_failed_publish(
    outbox: &dyn OutboxStore,
    event_id: uuid::Uuid,
    topic: &str,
    payload: &serde_json::Value,
    event_type: &str,
    error: &str,
) {
    let next_retry_at = Utc::now() + chrono::Duration::seconds(OUTBOX_RETRY_DELAY_SECS);
    if let Err(e) = outbox
        .enqueue(event_id, topic, payload, event_type, error, next_retry_at)
        .await
    {
        error!(%event_id, topic, error = %e, "Failed to save message to outbox");
    } else {
        info!(%event_id, topic, "Saved failed message to outbox");
    }
}
