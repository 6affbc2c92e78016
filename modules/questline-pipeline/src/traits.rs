// Trait abstractions for the pipeline's Event Store dependencies.
//
// The pipeline never touches `PgStore` directly — every read and write goes
// through one of these capability sets, so tests run against the in-memory
// store in `testing` with no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use questline_common::{Game, Mission, MissionReward, MissionType, OutboxEntry, User};
use questline_store::{PgStore, PlayStats};

// ---------------------------------------------------------------------------
// CatalogStore — users and the game catalog
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn user_exists(&self, user_id: i64) -> Result<bool>;
    async fn game_exists(&self, game_id: i64) -> Result<bool>;
    async fn list_games(&self) -> Result<Vec<Game>>;
}

// ---------------------------------------------------------------------------
// ActivityStore — append-only action records
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Idempotent insert on (user, date). Returns whether a row was created.
    async fn record_login(&self, user_id: i64, login_date: NaiveDate) -> Result<bool>;

    /// Login days within the window, most recent first.
    async fn login_days_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<NaiveDate>>;

    /// Idempotent insert on (user, game, date). Returns whether a row was created.
    async fn record_launch(
        &self,
        user_id: i64,
        game_id: i64,
        launch_date: NaiveDate,
    ) -> Result<bool>;

    async fn distinct_games_launched_since(&self, user_id: i64, since: NaiveDate) -> Result<i64>;

    /// Idempotent insert on event id. Returns whether a row was created.
    async fn record_play(
        &self,
        event_id: Uuid,
        user_id: i64,
        game_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn play_stats_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<PlayStats>;
}

// ---------------------------------------------------------------------------
// MissionStore — cycle rows: seeded by the initializer, flipped by the CAS
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn missions_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<Mission>>;
    async fn count_missions_since(&self, user_id: i64, since: NaiveDate) -> Result<i64>;
    async fn count_completed_since(&self, user_id: i64, since: NaiveDate) -> Result<i64>;

    /// Transactional insert-if-absent of a full mission set. The commit
    /// happens before this returns.
    async fn insert_missions_if_absent(
        &self,
        user_id: i64,
        mission_types: &[MissionType],
        cycle_start: NaiveDate,
    ) -> Result<u64>;

    /// Conditional completion update; returns the affected-row count.
    async fn mark_completed(&self, mission_id: i64, completed_at: DateTime<Utc>) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// RewardStore — idempotent disbursement
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RewardStore: Send + Sync {
    /// Guard insert + points credit in one transaction. `Ok(false)` when the
    /// (user, type, period) key already exists; an error when the guard row
    /// was inserted but the points update matched no user.
    async fn award(
        &self,
        user_id: i64,
        reward_type: &str,
        reward_period: &str,
        points: i64,
    ) -> Result<bool>;

    async fn rewards_for(&self, user_id: i64) -> Result<Vec<MissionReward>>;
}

// ---------------------------------------------------------------------------
// OutboxStore — persist-and-retry buffer for failed publishes
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(
        &self,
        event_id: Uuid,
        topic: &str,
        payload: &serde_json::Value,
        event_type: &str,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>>;
    async fn delete(&self, event_id: Uuid) -> Result<()>;
    async fn reschedule(
        &self,
        event_id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn mark_failed(&self, event_id: Uuid, error: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// PgStore implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl CatalogStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.find_user_by_username(username).await?)
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.user_exists(user_id).await?)
    }

    async fn game_exists(&self, game_id: i64) -> Result<bool> {
        Ok(self.game_exists(game_id).await?)
    }

    async fn list_games(&self) -> Result<Vec<Game>> {
        Ok(self.list_games().await?)
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn record_login(&self, user_id: i64, login_date: NaiveDate) -> Result<bool> {
        Ok(self.record_login(user_id, login_date).await?)
    }

    async fn login_days_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<NaiveDate>> {
        Ok(self.login_days_since(user_id, since).await?)
    }

    async fn record_launch(
        &self,
        user_id: i64,
        game_id: i64,
        launch_date: NaiveDate,
    ) -> Result<bool> {
        Ok(self.record_launch(user_id, game_id, launch_date).await?)
    }

    async fn distinct_games_launched_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        Ok(self.distinct_games_launched_since(user_id, since).await?)
    }

    async fn record_play(
        &self,
        event_id: Uuid,
        user_id: i64,
        game_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .record_play(event_id, user_id, game_id, score, played_at)
            .await?)
    }

    async fn play_stats_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<PlayStats> {
        Ok(self.play_stats_since(user_id, since).await?)
    }
}

#[async_trait]
impl MissionStore for PgStore {
    async fn missions_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<Mission>> {
        Ok(self.missions_since(user_id, since).await?)
    }

    async fn count_missions_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        Ok(self.count_missions_since(user_id, since).await?)
    }

    async fn count_completed_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        Ok(self.count_completed_since(user_id, since).await?)
    }

    async fn insert_missions_if_absent(
        &self,
        user_id: i64,
        mission_types: &[MissionType],
        cycle_start: NaiveDate,
    ) -> Result<u64> {
        Ok(self
            .insert_missions_if_absent(user_id, mission_types, cycle_start)
            .await?)
    }

    async fn mark_completed(&self, mission_id: i64, completed_at: DateTime<Utc>) -> Result<u64> {
        Ok(self.mark_completed(mission_id, completed_at).await?)
    }
}

#[async_trait]
impl RewardStore for PgStore {
    async fn award(
        &self,
        user_id: i64,
        reward_type: &str,
        reward_period: &str,
        points: i64,
    ) -> Result<bool> {
        Ok(self
            .award(user_id, reward_type, reward_period, points)
            .await?)
    }

    async fn rewards_for(&self, user_id: i64) -> Result<Vec<MissionReward>> {
        Ok(self.rewards_for(user_id).await?)
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn enqueue(
        &self,
        event_id: Uuid,
        topic: &str,
        payload: &serde_json::Value,
        event_type: &str,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self
            .outbox_enqueue(event_id, topic, payload, event_type, error, next_retry_at)
            .await?)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>> {
        Ok(self.outbox_due(now, limit).await?)
    }

    async fn delete(&self, event_id: Uuid) -> Result<()> {
        Ok(self.outbox_delete(event_id).await?)
    }

    async fn reschedule(
        &self,
        event_id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(self.outbox_reschedule(event_id, error, next_retry_at).await?)
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> Result<()> {
        Ok(self.outbox_mark_failed(event_id, error).await?)
    }
}
