//! Mission initialization: ensure a user has a full mission set in the
//! active cycle, creating a fresh one under a distributed lock when needed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use questline_common::{cycle_window_start, MissionType, QuestlineError};

use crate::cache::ProgressCache;
use crate::keeper::IdempotencyKeeper;
use crate::traits::MissionStore;

const WAIT_ATTEMPTS: u32 = 50;
const WAIT_STEP: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct MissionInitializer {
    missions: Arc<dyn MissionStore>,
    keeper: IdempotencyKeeper,
    cache: ProgressCache,
}

impl MissionInitializer {
    pub fn new(
        missions: Arc<dyn MissionStore>,
        keeper: IdempotencyKeeper,
        cache: ProgressCache,
    ) -> Self {
        Self {
            missions,
            keeper,
            cache,
        }
    }

    /// Ensure three missions exist for `user_id` in the active cycle.
    ///
    /// A cycle whose three missions are all completed is consumed: a fresh
    /// set is seeded so progress can accumulate toward the next reward.
    /// Failure to observe the rows within the wait bound is a retryable
    /// error — the bus redelivers the triggering message.
    pub async fn ensure_missions(&self, user_id: i64) -> Result<()> {
        let window = cycle_window_start(Utc::now());

        let missions = self.missions.missions_since(user_id, window).await?;
        if missions.len() >= MissionType::ALL.len() {
            if missions.iter().any(|m| !m.is_completed) {
                debug!(user_id, "Active cycle stands, skipping init");
                return Ok(());
            }
            debug!(user_id, "Cycle consumed, seeding a fresh mission set");
        }

        if self.keeper.try_init_lock(user_id).await? {
            // Commit happens inside seed_cycle, before the lock release, so
            // any competing waiter observes the rows.
            let seeded = self.seed_cycle(user_id).await;
            self.keeper.unlock_init(user_id).await?;
            seeded
        } else {
            self.wait_for_initialization(user_id).await
        }
    }

    /// Double-checked seeding under the init lock.
    async fn seed_cycle(&self, user_id: i64) -> Result<()> {
        let now = Utc::now();
        let window = cycle_window_start(now);

        // Re-query after acquiring the lock; a competitor may have won.
        let recheck = self.missions.missions_since(user_id, window).await?;
        let fresh_needed = recheck.len() < MissionType::ALL.len()
            || recheck.iter().all(|m| m.is_completed);
        if !fresh_needed {
            debug!(user_id, "Missions already initialized by another worker");
            return Ok(());
        }

        let cycle_start = now.date_naive();
        info!(user_id, %cycle_start, "Initializing missions");
        self.missions
            .insert_missions_if_absent(user_id, &MissionType::ALL, cycle_start)
            .await?;
        self.cache.invalidate(user_id).await?;
        Ok(())
    }

    /// Poll for the lock holder's rows to land. Bounded at 5 seconds, then
    /// retryable so the message bus redelivers.
    async fn wait_for_initialization(&self, user_id: i64) -> Result<()> {
        let window = cycle_window_start(Utc::now());
        debug!(user_id, "Waiting for mission initialization by another worker");

        for _ in 0..WAIT_ATTEMPTS {
            tokio::time::sleep(WAIT_STEP).await;
            let count = self.missions.count_missions_since(user_id, window).await?;
            if count >= MissionType::ALL.len() as i64 {
                debug!(user_id, "Mission init completed by another worker");
                return Ok(());
            }
        }

        Err(QuestlineError::InitTimeout { user_id }.into())
    }
}
