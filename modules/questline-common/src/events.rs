//! Bus event payloads for the mission pipeline.
//!
//! Every payload carries its own `event_id` — the deduplication key for the
//! consumer side — and serializes to the JSON object that travels on the bus.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::MissionType;

// ---------------------------------------------------------------------------
// Topics and consumer groups
// ---------------------------------------------------------------------------

pub const TOPIC_LOGIN: &str = "mission-login-event";
pub const TOPIC_GAME_LAUNCH: &str = "mission-game-launch-event";
pub const TOPIC_GAME_PLAY: &str = "mission-game-play-event";
pub const TOPIC_MISSION_COMPLETED: &str = "mission-completed-event";

pub const GROUP_LOGIN: &str = "mission-login-consumer";
pub const GROUP_GAME_LAUNCH: &str = "mission-game-launch-consumer";
pub const GROUP_GAME_PLAY: &str = "mission-game-play-consumer";
pub const GROUP_REWARD: &str = "reward-distribution";

// ---------------------------------------------------------------------------
// Dedup key namespaces (short-TTL markers in the key/value service)
// ---------------------------------------------------------------------------

pub const DEDUP_PREFIX_LOGIN: &str = "processed:login:";
pub const DEDUP_PREFIX_GAME_LAUNCH: &str = "processed:game-launch:";
pub const DEDUP_PREFIX_GAME_PLAY: &str = "processed:game-play:";
pub const DEDUP_PREFIX_MISSION_COMPLETED: &str = "processed:mission-completed:";

pub const INIT_LOCK_PREFIX: &str = "mission:init:";
pub const PROGRESS_CACHE_PREFIX: &str = "mission:progress:";

// ---------------------------------------------------------------------------
// Ingress payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub event_id: Uuid,
    pub user_id: i64,
    pub login_date: NaiveDate,
}

impl LoginEvent {
    pub fn new(user_id: i64, login_date: NaiveDate) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            login_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameLaunchEvent {
    pub event_id: Uuid,
    pub user_id: i64,
    pub game_id: i64,
    pub launch_time: DateTime<Utc>,
}

impl GameLaunchEvent {
    pub fn new(user_id: i64, game_id: i64, launch_time: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            game_id,
            launch_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayEvent {
    pub event_id: Uuid,
    pub user_id: i64,
    pub game_id: i64,
    /// Server-generated, uniform on [0, 1000].
    pub score: i64,
    pub play_time: DateTime<Utc>,
}

impl GamePlayEvent {
    pub fn new(user_id: i64, game_id: i64, score: i64, play_time: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            game_id,
            score,
            play_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionCompletedEvent {
    pub event_id: Uuid,
    pub user_id: i64,
    pub mission_type: MissionType,
    pub completed_at: DateTime<Utc>,
}

impl MissionCompletedEvent {
    pub fn new(user_id: i64, mission_type: MissionType, completed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id,
            mission_type,
            completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload serialization
// ---------------------------------------------------------------------------

macro_rules! payload_impl {
    ($ty:ty, $event_type:literal) => {
        impl $ty {
            /// The string stored in the outbox `event_type` column.
            pub fn event_type(&self) -> &'static str {
                $event_type
            }

            pub fn to_payload(&self) -> serde_json::Value {
                serde_json::to_value(self).expect("event payload serialization is infallible")
            }

            pub fn from_payload(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
                serde_json::from_value(payload.clone())
            }
        }
    };
}

payload_impl!(LoginEvent, "LOGIN");
payload_impl!(GameLaunchEvent, "GAME_LAUNCH");
payload_impl!(GamePlayEvent, "GAME_PLAY");
payload_impl!(MissionCompletedEvent, "MISSION_COMPLETED");
