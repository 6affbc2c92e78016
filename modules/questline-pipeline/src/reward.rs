//! Reward distribution: idempotent per (user, reward type, calendar period).

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use questline_common::{
    cycle_window_start, reward_period, MissionReward, MissionType,
    REWARD_POINTS, REWARD_TYPE_MISSION_COMPLETION,
};

use crate::traits::{MissionStore, RewardStore};

#[derive(Clone)]
pub struct RewardDistributor {
    missions: Arc<dyn MissionStore>,
    rewards: Arc<dyn RewardStore>,
}

impl RewardDistributor {
    pub fn new(missions: Arc<dyn MissionStore>, rewards: Arc<dyn RewardStore>) -> Self {
        Self { missions, rewards }
    }

    /// Award 777 points when all three missions in the active cycle are
    /// completed. Returns `false` when the cycle is unfinished or this
    /// period was already rewarded. An award whose points credit matches no
    /// user row aborts with an integrity error — the guard row must not be
    /// orphaned.
    pub async fn distribute(&self, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let completed = self
            .missions
            .count_completed_since(user_id, cycle_window_start(now))
            .await?;

        if completed < MissionType::ALL.len() as i64 {
            debug!(user_id, completed, "Not all missions completed, skipping reward");
            return Ok(false);
        }

        let period = reward_period(now);
        let awarded = self
            .rewards
            .award(user_id, REWARD_TYPE_MISSION_COMPLETION, &period, REWARD_POINTS)
            .await?;

        if awarded {
            info!(user_id, period = period.as_str(), points = REWARD_POINTS, "Reward distributed");
        } else {
            info!(user_id, period = period.as_str(), "Reward already distributed this period");
        }
        Ok(awarded)
    }

    /// Reward history, most recent first.
    pub async fn reward_history(&self, user_id: i64) -> Result<Vec<MissionReward>> {
        self.rewards.rewards_for(user_id).await
    }
}
