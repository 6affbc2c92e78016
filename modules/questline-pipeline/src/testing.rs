// In-memory Event Store for pipeline tests.
//
// One stateful mock implementing every store capability trait, honoring the
// same unique keys as the Postgres schema. Thread-safe via interior Mutex.
// Failure toggles let tests exercise the release-and-retry paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use questline_common::{
    Game, Mission, MissionReward, MissionType, OutboxEntry, OutboxStatus, User,
    OUTBOX_MAX_RETRIES,
};
use questline_store::PlayStats;

use crate::traits::{ActivityStore, CatalogStore, MissionStore, OutboxStore, RewardStore};

#[derive(Debug, Clone)]
struct PlayRow {
    user_id: i64,
    score: i64,
    played_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    games: HashMap<i64, Game>,
    next_user_id: i64,
    next_game_id: i64,
    next_mission_id: i64,
    login_days: HashSet<(i64, NaiveDate)>,
    launches: HashSet<(i64, i64, NaiveDate)>,
    plays: HashMap<Uuid, PlayRow>,
    missions: Vec<Mission>,
    rewards: Vec<MissionReward>,
    outbox: HashMap<Uuid, OutboxEntry>,
    fail_activity_writes: bool,
    fail_activity_reads: bool,
}

/// Stateful in-memory Event Store. `record_*` honors the schema's unique
/// keys; `award` mirrors the transactional guard-then-credit semantics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seed helpers ---

    pub fn add_user(&self, username: &str, password: &str) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_user_id += 1;
        let id = inner.next_user_id;
        inner.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
                password: password.to_string(),
                points: 0,
            },
        );
        id
    }

    pub fn add_game(&self, name: &str) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_game_id += 1;
        let id = inner.next_game_id;
        inner.games.insert(
            id,
            Game {
                id,
                name: name.to_string(),
            },
        );
        id
    }

    // --- Failure toggles ---

    /// Make every `record_*` call fail until switched off.
    pub fn fail_activity_writes(&self, on: bool) {
        self.inner.lock().unwrap().fail_activity_writes = on;
    }

    /// Make every activity read fail until switched off.
    pub fn fail_activity_reads(&self, on: bool) {
        self.inner.lock().unwrap().fail_activity_reads = on;
    }

    // --- Assertion helpers ---

    pub fn play_session_count(&self, user_id: i64) -> usize {
        self.inner
            .lock()
            .unwrap()
            .plays
            .values()
            .filter(|p| p.user_id == user_id)
            .count()
    }

    pub fn login_day_count(&self, user_id: i64) -> usize {
        self.inner
            .lock()
            .unwrap()
            .login_days
            .iter()
            .filter(|(u, _)| *u == user_id)
            .count()
    }

    pub fn points_for(&self, user_id: i64) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .map(|u| u.points)
            .unwrap_or(0)
    }

    pub fn reward_count(&self, user_id: i64) -> usize {
        self.inner
            .lock()
            .unwrap()
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }

    pub fn missions_for(&self, user_id: i64) -> Vec<Mission> {
        self.inner
            .lock()
            .unwrap()
            .missions
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    /// The user's mission of a given type in the freshest cycle.
    pub fn mission(&self, user_id: i64, mission_type: MissionType) -> Option<Mission> {
        self.inner
            .lock()
            .unwrap()
            .missions
            .iter()
            .filter(|m| m.user_id == user_id && m.mission_type == mission_type)
            .max_by_key(|m| m.cycle_start_date)
            .cloned()
    }

    pub fn outbox_entry(&self, event_id: Uuid) -> Option<OutboxEntry> {
        self.inner.lock().unwrap().outbox.get(&event_id).cloned()
    }

    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.inner.lock().unwrap().outbox.values().cloned().collect()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.inner.lock().unwrap().users.contains_key(&user_id))
    }

    async fn game_exists(&self, game_id: i64) -> Result<bool> {
        Ok(self.inner.lock().unwrap().games.contains_key(&game_id))
    }

    async fn list_games(&self) -> Result<Vec<Game>> {
        let inner = self.inner.lock().unwrap();
        let mut games: Vec<Game> = inner.games.values().cloned().collect();
        games.sort_by_key(|g| g.id);
        Ok(games)
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn record_login(&self, user_id: i64, login_date: NaiveDate) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_activity_writes {
            bail!("MemoryStore: activity writes forced to fail");
        }
        Ok(inner.login_days.insert((user_id, login_date)))
    }

    async fn login_days_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<NaiveDate>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_activity_reads {
            bail!("MemoryStore: activity reads forced to fail");
        }
        let mut days: Vec<NaiveDate> = inner
            .login_days
            .iter()
            .filter(|(u, d)| *u == user_id && *d >= since)
            .map(|(_, d)| *d)
            .collect();
        days.sort_unstable_by(|a, b| b.cmp(a));
        Ok(days)
    }

    async fn record_launch(
        &self,
        user_id: i64,
        game_id: i64,
        launch_date: NaiveDate,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_activity_writes {
            bail!("MemoryStore: activity writes forced to fail");
        }
        Ok(inner.launches.insert((user_id, game_id, launch_date)))
    }

    async fn distinct_games_launched_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_activity_reads {
            bail!("MemoryStore: activity reads forced to fail");
        }
        let games: HashSet<i64> = inner
            .launches
            .iter()
            .filter(|(u, _, d)| *u == user_id && *d >= since)
            .map(|(_, g, _)| *g)
            .collect();
        Ok(games.len() as i64)
    }

    async fn record_play(
        &self,
        event_id: Uuid,
        user_id: i64,
        _game_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_activity_writes {
            bail!("MemoryStore: activity writes forced to fail");
        }
        if inner.plays.contains_key(&event_id) {
            return Ok(false);
        }
        inner.plays.insert(
            event_id,
            PlayRow {
                user_id,
                score,
                played_at,
            },
        );
        Ok(true)
    }

    async fn play_stats_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<PlayStats> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_activity_reads {
            bail!("MemoryStore: activity reads forced to fail");
        }
        let mut stats = PlayStats::default();
        for play in inner.plays.values() {
            if play.user_id == user_id && play.played_at >= since {
                stats.count += 1;
                stats.total_score += play.score;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn missions_since(&self, user_id: i64, since: NaiveDate) -> Result<Vec<Mission>> {
        let inner = self.inner.lock().unwrap();
        let mut missions: Vec<Mission> = inner
            .missions
            .iter()
            .filter(|m| m.user_id == user_id && m.cycle_start_date >= since)
            .cloned()
            .collect();
        missions.sort_by_key(|m| m.id);
        Ok(missions)
    }

    async fn count_missions_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        Ok(self.missions_since(user_id, since).await?.len() as i64)
    }

    async fn count_completed_since(&self, user_id: i64, since: NaiveDate) -> Result<i64> {
        Ok(self
            .missions_since(user_id, since)
            .await?
            .iter()
            .filter(|m| m.is_completed)
            .count() as i64)
    }

    async fn insert_missions_if_absent(
        &self,
        user_id: i64,
        mission_types: &[MissionType],
        cycle_start: NaiveDate,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut created = 0u64;
        for &mission_type in mission_types {
            let exists = inner.missions.iter().any(|m| {
                m.user_id == user_id
                    && m.mission_type == mission_type
                    && m.cycle_start_date == cycle_start
            });
            if exists {
                continue;
            }
            inner.next_mission_id += 1;
            let id = inner.next_mission_id;
            inner.missions.push(Mission {
                id,
                user_id,
                mission_type,
                cycle_start_date: cycle_start,
                is_completed: false,
                completed_at: None,
            });
            created += 1;
        }
        Ok(created)
    }

    async fn mark_completed(&self, mission_id: i64, completed_at: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .missions
            .iter_mut()
            .find(|m| m.id == mission_id && !m.is_completed)
        {
            Some(mission) => {
                mission.is_completed = true;
                mission.completed_at = Some(completed_at);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl RewardStore for MemoryStore {
    async fn award(
        &self,
        user_id: i64,
        reward_type: &str,
        reward_period: &str,
        points: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let exists = inner.rewards.iter().any(|r| {
            r.user_id == user_id && r.reward_type == reward_type && r.reward_period == reward_period
        });
        if exists {
            return Ok(false);
        }
        if !inner.users.contains_key(&user_id) {
            bail!("reward inserted but points update matched no user row for user {user_id}");
        }
        inner.rewards.push(MissionReward {
            user_id,
            reward_type: reward_type.to_string(),
            reward_period: reward_period.to_string(),
            points,
            distributed_at: Utc::now(),
        });
        inner.users.get_mut(&user_id).unwrap().points += points;
        Ok(true)
    }

    async fn rewards_for(&self, user_id: i64) -> Result<Vec<MissionReward>> {
        let inner = self.inner.lock().unwrap();
        let mut rewards: Vec<MissionReward> = inner
            .rewards
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rewards.sort_by(|a, b| b.distributed_at.cmp(&a.distributed_at));
        Ok(rewards)
    }
}

#[async_trait]
impl OutboxStore for MemoryStore {
    async fn enqueue(
        &self,
        event_id: Uuid,
        topic: &str,
        payload: &serde_json::Value,
        event_type: &str,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.outbox.entry(event_id).or_insert_with(|| OutboxEntry {
            event_id,
            topic: topic.to_string(),
            payload: payload.clone(),
            event_type: event_type.to_string(),
            status: OutboxStatus::Pending,
            retry_count: 0,
            max_retries: OUTBOX_MAX_RETRIES,
            next_retry_at,
            last_error: Some(error.to_string()),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.lock().unwrap();
        let mut due: Vec<OutboxEntry> = inner
            .outbox
            .values()
            .filter(|e| e.status == OutboxStatus::Pending && e.next_retry_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_retry_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn delete(&self, event_id: Uuid) -> Result<()> {
        self.inner.lock().unwrap().outbox.remove(&event_id);
        Ok(())
    }

    async fn reschedule(
        &self,
        event_id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.outbox.get_mut(&event_id) {
            entry.retry_count += 1;
            entry.last_error = Some(error.to_string());
            entry.next_retry_at = next_retry_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.outbox.get_mut(&event_id) {
            entry.status = OutboxStatus::Failed;
            entry.retry_count += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}
