//! Completion engine: the single linearization point for a mission's
//! incomplete → completed transition.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use questline_common::{cycle_window_start, MissionType};

use crate::cache::ProgressCache;
use crate::traits::MissionStore;

#[derive(Clone)]
pub struct CompletionEngine {
    missions: Arc<dyn MissionStore>,
    cache: ProgressCache,
}

impl CompletionEngine {
    pub fn new(missions: Arc<dyn MissionStore>, cache: ProgressCache) -> Self {
        Self { missions, cache }
    }

    /// Evaluate `predicate` and, if it holds, attempt the conditional
    /// completion update. Returns `true` only for the caller that won the
    /// transition — concurrent workers race freely on the CAS and exactly
    /// one observes an affected row.
    pub async fn check_and_complete<F, Fut>(
        &self,
        user_id: i64,
        mission_type: MissionType,
        predicate: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = bool> + Send,
    {
        let now = Utc::now();
        let missions = self
            .missions
            .missions_since(user_id, cycle_window_start(now))
            .await?;

        // After a cycle rollover, rows from the consumed cycle can still sit
        // inside the window; the freshest cycle-start is the active one.
        let mission = missions
            .iter()
            .filter(|m| m.mission_type == mission_type)
            .max_by_key(|m| m.cycle_start_date);

        let mission = match mission {
            Some(mission) => mission,
            None => {
                warn!(user_id, %mission_type, "Mission not found in active cycle");
                return Ok(false);
            }
        };

        if mission.is_completed {
            debug!(user_id, %mission_type, "Mission already completed");
            return Ok(false);
        }

        if !predicate().await {
            return Ok(false);
        }

        let updated = self.missions.mark_completed(mission.id, now).await?;
        if updated == 0 {
            debug!(
                user_id,
                %mission_type,
                "Mission was completed by another worker"
            );
            return Ok(false);
        }

        self.cache.invalidate(user_id).await?;
        info!(user_id, %mission_type, "Mission completed");
        Ok(true)
    }
}
