//! Domain types shared across the workspace.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unrecognized {column} value: {value}").into(),
    }
}

/// Rolling lookback that defines the active mission cycle.
pub const CYCLE_WINDOW_DAYS: i64 = 30;

/// Consecutive login days required by the login mission.
pub const CONSECUTIVE_LOGIN_TARGET: i64 = 3;
/// Distinct games required by the launch mission.
pub const DISTINCT_LAUNCH_TARGET: i64 = 3;
/// Play sessions required by the play mission.
pub const PLAY_SESSION_TARGET: i64 = 3;
/// Total score the play sessions must strictly exceed.
pub const PLAY_SCORE_THRESHOLD: i64 = 1000;

/// The single reward type disbursed by this system.
pub const REWARD_TYPE_MISSION_COMPLETION: &str = "MISSION_COMPLETION";
/// Points granted once per cycle period when all three missions complete.
pub const REWARD_POINTS: i64 = 777;

pub const OUTBOX_MAX_RETRIES: i32 = 10;
pub const OUTBOX_RETRY_DELAY_SECS: i64 = 30;

// ---------------------------------------------------------------------------
// Mission types — a closed set of three
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionType {
    #[serde(rename = "LOGIN_3_CONSECUTIVE")]
    Login3Consecutive,
    #[serde(rename = "LAUNCH_3_DISTINCT")]
    Launch3Distinct,
    #[serde(rename = "PLAY_3_SESSIONS_SCORE_OVER_1000")]
    Play3SessionsScoreOver1000,
}

impl MissionType {
    /// Every mission a fresh cycle is seeded with.
    pub const ALL: [MissionType; 3] = [
        MissionType::Login3Consecutive,
        MissionType::Launch3Distinct,
        MissionType::Play3SessionsScoreOver1000,
    ];

    /// The string stored in the `mission_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionType::Login3Consecutive => "LOGIN_3_CONSECUTIVE",
            MissionType::Launch3Distinct => "LAUNCH_3_DISTINCT",
            MissionType::Play3SessionsScoreOver1000 => "PLAY_3_SESSIONS_SCORE_OVER_1000",
        }
    }

    pub fn parse(s: &str) -> Option<MissionType> {
        match s {
            "LOGIN_3_CONSECUTIVE" => Some(MissionType::Login3Consecutive),
            "LAUNCH_3_DISTINCT" => Some(MissionType::Launch3Distinct),
            "PLAY_3_SESSIONS_SCORE_OVER_1000" => Some(MissionType::Play3SessionsScoreOver1000),
            _ => None,
        }
    }
}

impl std::fmt::Display for MissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub points: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            points: row.try_get("points")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
}

impl<'r> sqlx::FromRow<'r, PgRow> for Game {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Game {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
        })
    }
}

/// One mission row in a user's cycle. Identity is
/// (user_id, mission_type, cycle_start_date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: i64,
    pub user_id: i64,
    pub mission_type: MissionType,
    pub cycle_start_date: NaiveDate,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for Mission {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let type_str: String = row.try_get("mission_type")?;
        let mission_type = MissionType::parse(&type_str)
            .ok_or_else(|| decode_error("mission_type", &type_str))?;
        Ok(Mission {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            mission_type,
            cycle_start_date: row.try_get("cycle_start_date")?,
            is_completed: row.try_get("is_completed")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionReward {
    pub user_id: i64,
    pub reward_type: String,
    pub reward_period: String,
    pub points: i64,
    pub distributed_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for MissionReward {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(MissionReward {
            user_id: row.try_get("user_id")?,
            reward_type: row.try_get("reward_type")?,
            reward_period: row.try_get("reward_period")?,
            points: row.try_get("points")?,
            distributed_at: row.try_get("distributed_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<OutboxStatus> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// A publish that failed and is waiting for the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub event_id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub event_type: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for OutboxEntry {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        let status_str: String = row.try_get("status")?;
        let status =
            OutboxStatus::parse(&status_str).ok_or_else(|| decode_error("status", &status_str))?;
        Ok(OutboxEntry {
            event_id: row.try_get("event_id")?,
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            event_type: row.try_get("event_type")?,
            status,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            next_retry_at: row.try_get("next_retry_at")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Cycle and period helpers
// ---------------------------------------------------------------------------

/// Earliest cycle-start date still considered active at `now`.
pub fn cycle_window_start(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive() - Duration::days(CYCLE_WINDOW_DAYS)
}

/// The `YYYY-MM` period key used for reward idempotency.
pub fn reward_period(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}
