//! Mission rows: insert-if-absent seeding and the single CAS transition.

use chrono::{DateTime, NaiveDate, Utc};

use questline_common::{Mission, MissionType};

use crate::error::Result;
use crate::PgStore;

impl PgStore {
    /// Missions whose cycle-start falls inside the active window.
    pub async fn missions_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<Mission>> {
        let rows = sqlx::query_as::<_, Mission>(
            r#"
            SELECT id, user_id, mission_type, cycle_start_date, is_completed, completed_at
            FROM missions
            WHERE user_id = $1 AND cycle_start_date >= $2
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_missions_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM missions WHERE user_id = $1 AND cycle_start_date >= $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn count_completed_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM missions
            WHERE user_id = $1 AND cycle_start_date >= $2 AND is_completed = TRUE
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Seed a fresh cycle in one transaction. Each insert is conditional on
    /// the (user, type, cycle-start) unique key; the commit happens before
    /// this returns, so a competing waiter that observes the rows can rely
    /// on them. Returns how many rows were actually created.
    pub async fn insert_missions_if_absent(
        &self,
        user_id: i64,
        mission_types: &[MissionType],
        cycle_start: NaiveDate,
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0u64;

        for mission_type in mission_types {
            let result = sqlx::query(
                r#"
                INSERT INTO missions (user_id, mission_type, cycle_start_date)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, mission_type, cycle_start_date) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(mission_type.as_str())
            .bind(cycle_start)
            .execute(&mut *tx)
            .await?;

            created += result.rows_affected();
        }

        tx.commit().await?;
        Ok(created)
    }

    /// The completion CAS. Exactly one concurrent caller observes 1.
    pub async fn mark_completed(
        &self,
        mission_id: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE missions
            SET is_completed = TRUE, completed_at = $2
            WHERE id = $1 AND is_completed = FALSE
            "#,
        )
        .bind(mission_id)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
