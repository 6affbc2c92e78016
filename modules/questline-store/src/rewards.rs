//! Reward disbursement: the guard insert and the points credit share one
//! transaction so a reward row can never be orphaned.

use questline_common::MissionReward;

use crate::error::{Result, StoreError};
use crate::PgStore;

impl PgStore {
    /// Idempotent award. Returns `false` when a reward with this
    /// (user, type, period) key already exists; `true` when this call
    /// inserted the guard row and credited the points.
    pub async fn award(
        &self,
        user_id: i64,
        reward_type: &str,
        reward_period: &str,
        points: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO mission_rewards (user_id, reward_type, reward_period, points)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, reward_type, reward_period) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(reward_type)
        .bind(reward_period)
        .bind(points)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let credited = sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
            .bind(user_id)
            .bind(points)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if credited == 0 {
            // The transaction aborts with the error, taking the guard row
            // with it.
            return Err(StoreError::Integrity(format!(
                "reward inserted but points update matched no user row for user {user_id}"
            )));
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Reward history, most recent first.
    pub async fn rewards_for(&self, user_id: i64) -> Result<Vec<MissionReward>> {
        let rows = sqlx::query_as::<_, MissionReward>(
            r#"
            SELECT user_id, reward_type, reward_period, points, distributed_at
            FROM mission_rewards
            WHERE user_id = $1
            ORDER BY distributed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
