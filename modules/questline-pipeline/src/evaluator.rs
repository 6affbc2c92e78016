//! Completion predicates: pure reads over the Event Store, each scoped to a
//! 30-day lookback from the evaluation instant. Read failures log and
//! evaluate to incomplete — they never mark a mission done by default.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use questline_common::{
    cycle_window_start, MissionType, CONSECUTIVE_LOGIN_TARGET, CYCLE_WINDOW_DAYS,
    DISTINCT_LAUNCH_TARGET, PLAY_SCORE_THRESHOLD, PLAY_SESSION_TARGET,
};
use questline_store::PlayStats;

use crate::traits::ActivityStore;

/// Length of the consecutive-day run anchored at the most recent entry.
///
/// `days` must be sorted descending. The chain anchors at the first element,
/// not at today — a run that ended a day ago still counts.
pub fn consecutive_day_run(days: &[NaiveDate]) -> i64 {
    let mut expected = match days.first() {
        Some(day) => *day,
        None => return 0,
    };

    let mut run = 0;
    for &day in days {
        if day == expected {
            run += 1;
            expected = expected - Duration::days(1);
        } else if day < expected {
            // Gap — stop counting.
            break;
        }
    }
    run
}

#[derive(Clone)]
pub struct MissionEvaluator {
    activity: Arc<dyn ActivityStore>,
}

impl MissionEvaluator {
    pub fn new(activity: Arc<dyn ActivityStore>) -> Self {
        Self { activity }
    }

    pub async fn is_completed(&self, user_id: i64, mission_type: MissionType) -> bool {
        let now = Utc::now();
        match mission_type {
            MissionType::Login3Consecutive => self.is_login_mission_completed(user_id, now).await,
            MissionType::Launch3Distinct => self.is_launch_mission_completed(user_id, now).await,
            MissionType::Play3SessionsScoreOver1000 => {
                self.is_play_mission_completed(user_id, now).await
            }
        }
    }

    pub async fn is_login_mission_completed(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        let days = self.consecutive_login_days(user_id, now).await;
        let completed = days >= CONSECUTIVE_LOGIN_TARGET;
        debug!(user_id, days, completed, "Login mission check");
        completed
    }

    pub async fn is_launch_mission_completed(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        let distinct = self.distinct_games_launched(user_id, now).await;
        let completed = distinct >= DISTINCT_LAUNCH_TARGET;
        debug!(user_id, distinct, completed, "Launch mission check");
        completed
    }

    pub async fn is_play_mission_completed(&self, user_id: i64, now: DateTime<Utc>) -> bool {
        let stats = self.play_stats(user_id, now).await;
        // Strict inequality on the score sum.
        let completed =
            stats.count >= PLAY_SESSION_TARGET && stats.total_score > PLAY_SCORE_THRESHOLD;
        debug!(
            user_id,
            plays = stats.count,
            total_score = stats.total_score,
            completed,
            "Play mission check"
        );
        completed
    }

    /// Consecutive login days within the window, anchored at the most
    /// recent login. 0 on read failure.
    pub async fn consecutive_login_days(&self, user_id: i64, now: DateTime<Utc>) -> i64 {
        match self
            .activity
            .login_days_since(user_id, cycle_window_start(now))
            .await
        {
            Ok(days) => consecutive_day_run(&days),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read login days");
                0
            }
        }
    }

    /// Distinct games launched within the window. 0 on read failure.
    pub async fn distinct_games_launched(&self, user_id: i64, now: DateTime<Utc>) -> i64 {
        match self
            .activity
            .distinct_games_launched_since(user_id, cycle_window_start(now))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to count distinct launches");
                0
            }
        }
    }

    /// Play count and score sum within the window. Zeroes on read failure.
    pub async fn play_stats(&self, user_id: i64, now: DateTime<Utc>) -> PlayStats {
        match self
            .activity
            .play_stats_since(user_id, now - Duration::days(CYCLE_WINDOW_DAYS))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read play stats");
                PlayStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_history_has_no_run() {
        assert_eq!(consecutive_day_run(&[]), 0);
    }

    #[test]
    fn single_day_is_a_run_of_one() {
        assert_eq!(consecutive_day_run(&[d(2025, 11, 28)]), 1);
    }

    #[test]
    fn unbroken_chain_counts_fully() {
        let days = [d(2025, 11, 28), d(2025, 11, 27), d(2025, 11, 26)];
        assert_eq!(consecutive_day_run(&days), 3);
    }

    #[test]
    fn gap_stops_the_run() {
        let days = [d(2025, 11, 28), d(2025, 11, 27), d(2025, 11, 24)];
        assert_eq!(consecutive_day_run(&days), 2);
    }

    #[test]
    fn chain_anchors_at_most_recent_login_not_today() {
        // The run D, D-1, D-2 is complete even when D is in the past.
        let days = [d(2025, 11, 20), d(2025, 11, 19), d(2025, 11, 18)];
        assert_eq!(consecutive_day_run(&days), 3);
    }

    #[test]
    fn run_crosses_month_boundary() {
        let days = [d(2025, 12, 1), d(2025, 11, 30), d(2025, 11, 29)];
        assert_eq!(consecutive_day_run(&days), 3);
    }
}
