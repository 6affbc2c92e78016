//! Append-only activity records: login days, game launches, play sessions.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::PlayStats;
use crate::PgStore;

impl PgStore {
    /// Record a login day. Returns whether a row was created.
    pub async fn record_login(&self, user_id: i64, login_date: NaiveDate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_login_records (user_id, login_date)
            VALUES ($1, $2)
            ON CONFLICT (user_id, login_date) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(login_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Login days within the window, most recent first.
    pub async fn login_days_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT login_date FROM user_login_records
            WHERE user_id = $1 AND login_date >= $2
            ORDER BY login_date DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Record a game launch for a calendar day. Returns whether a row was created.
    pub async fn record_launch(
        &self,
        user_id: i64,
        game_id: i64,
        launch_date: NaiveDate,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_game_launches (user_id, game_id, launch_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, game_id, launch_date) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(game_id)
        .bind(launch_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn distinct_games_launched_since(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT game_id) FROM user_game_launches
            WHERE user_id = $1 AND launch_date >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Record a play session keyed by ingress event id. Returns whether a
    /// row was created — redelivered events report `false`.
    pub async fn record_play(
        &self,
        event_id: Uuid,
        user_id: i64,
        game_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO games_play_record (event_id, user_id, game_id, score, played_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(game_id)
        .bind(score)
        .bind(played_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn play_stats_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<PlayStats> {
        let (count, total_score) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COALESCE(SUM(score), 0)::BIGINT FROM games_play_record
            WHERE user_id = $1 AND played_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(PlayStats { count, total_score })
    }
}
