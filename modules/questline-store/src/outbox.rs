//! Outbox bookkeeping for failed bus publishes.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use questline_common::{OutboxEntry, OUTBOX_MAX_RETRIES};

use crate::error::Result;
use crate::PgStore;

impl PgStore {
    /// Buffer a failed publish. Unique on event id — re-enqueueing the same
    /// event is a no-op.
    pub async fn outbox_enqueue(
        &self,
        event_id: Uuid,
        topic: &str,
        payload: &serde_json::Value,
        event_type: &str,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO message_outbox
                (event_id, topic, payload, event_type, status, retry_count,
                 max_retries, next_retry_at, last_error)
            VALUES ($1, $2, $3, $4, 'PENDING', 0, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(topic)
        .bind(payload)
        .bind(event_type)
        .bind(OUTBOX_MAX_RETRIES)
        .bind(next_retry_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Pending entries due for a retry, oldest first.
    pub async fn outbox_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT event_id, topic, payload, event_type, status, retry_count,
                   max_retries, next_retry_at, last_error, created_at
            FROM message_outbox
            WHERE status = 'PENDING' AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn outbox_delete(&self, event_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM message_outbox WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Bump the retry counter and schedule the next attempt.
    pub async fn outbox_reschedule(
        &self,
        event_id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE message_outbox
            SET retry_count = retry_count + 1, last_error = $2, next_retry_at = $3
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal failure — the entry stays for operator attention.
    pub async fn outbox_mark_failed(&self, event_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE message_outbox
            SET status = 'FAILED', retry_count = retry_count + 1, last_error = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
