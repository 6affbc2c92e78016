// End-to-end pipeline scenarios over the in-memory backends: dedup,
// initialization, completion, reward distribution, and replay behavior.

mod support;

use chrono::{Duration, Utc};
use uuid::Uuid;

use questline_common::{
    GameLaunchEvent, GamePlayEvent, LoginEvent, MissionType, INIT_LOCK_PREFIX, REWARD_POINTS,
    TOPIC_MISSION_COMPLETED,
};
use questline_pipeline::cache::ProgressCache;
use questline_pipeline::keeper::KeyValue;
use questline_pipeline::{CompletionEngine, ConsumerOutcome, MissionStore};

use support::{days_ago, harness, published_completions, today};

async fn login(h: &support::Harness, user_id: i64, days_back: i64) -> ConsumerOutcome {
    let event = LoginEvent::new(user_id, days_ago(days_back));
    h.router.process_ingress(&event).await
}

async fn launch(h: &support::Harness, user_id: i64, game_id: i64) -> ConsumerOutcome {
    let event = GameLaunchEvent::new(user_id, game_id, Utc::now());
    h.router.process_ingress(&event).await
}

async fn play(h: &support::Harness, user_id: i64, score: i64) -> ConsumerOutcome {
    let event = GamePlayEvent::new(user_id, 1, score, Utc::now());
    h.router.process_ingress(&event).await
}

/// Drive all three missions to completion: 3 consecutive logins, 3 distinct
/// launches, 3 plays totalling over 1000.
async fn complete_all_missions(h: &support::Harness, user_id: i64) {
    for days_back in [2, 1, 0] {
        login(h, user_id, days_back).await;
    }
    for game_id in [1, 2, 3] {
        launch(h, user_id, game_id).await;
    }
    for score in [400, 400, 400] {
        play(h, user_id, score).await;
    }
}

#[tokio::test]
async fn login_chain_completes_mission_in_any_order() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    // Out-of-order delivery: D-1, D-2, then D.
    assert!(matches!(login(&h, user, 1).await, ConsumerOutcome::Processed));
    assert!(matches!(login(&h, user, 2).await, ConsumerOutcome::Processed));

    let mission = h.store.mission(user, MissionType::Login3Consecutive).unwrap();
    assert!(!mission.is_completed, "two logins must not complete");

    assert!(matches!(login(&h, user, 0).await, ConsumerOutcome::Processed));

    let mission = h.store.mission(user, MissionType::Login3Consecutive).unwrap();
    assert!(mission.is_completed);
    assert!(mission.completed_at.is_some());
    assert_eq!(mission.cycle_start_date, today());

    let completions = published_completions(&h);
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].mission_type, MissionType::Login3Consecutive);
    assert_eq!(completions[0].user_id, user);
}

#[tokio::test]
async fn completed_mission_never_reverts() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    for days_back in [2, 1, 0] {
        login(&h, user, days_back).await;
    }
    let completed_at = h
        .store
        .mission(user, MissionType::Login3Consecutive)
        .unwrap()
        .completed_at;
    assert!(completed_at.is_some());

    // A later login re-evaluates but cannot flip the mission back.
    let event = LoginEvent::new(user, days_ago(0) - Duration::days(5));
    h.router.process_ingress(&event).await;

    let mission = h.store.mission(user, MissionType::Login3Consecutive).unwrap();
    assert!(mission.is_completed);
    assert_eq!(mission.completed_at, completed_at);
    assert_eq!(published_completions(&h).len(), 1);
}

#[tokio::test]
async fn duplicate_play_event_records_once() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    let event = GamePlayEvent::new(user, 1, 500, Utc::now());
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Processed
    ));
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Duplicate
    ));

    assert_eq!(h.store.play_session_count(user), 1);
    let stats = h
        .router
        .evaluator()
        .play_stats(user, Utc::now())
        .await;
    assert_eq!(stats.count, 1);
    assert_eq!(stats.total_score, 500);
}

#[tokio::test]
async fn redelivery_after_failure_reaches_same_end_state() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    let event = LoginEvent::new(user, today());

    // First delivery crashes at the record step; the dedup key must be
    // released so redelivery is not treated as a duplicate.
    h.store.fail_activity_writes(true);
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Retry(_)
    ));

    h.store.fail_activity_writes(false);
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Processed
    ));
    assert_eq!(h.store.login_day_count(user), 1);
}

#[tokio::test(start_paused = true)]
async fn init_wait_timeout_is_retryable() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    // Another worker holds the init lock and never finishes.
    let lock_key = format!("{INIT_LOCK_PREFIX}{user}");
    h.kv.set_if_absent(&lock_key, "1", std::time::Duration::from_secs(3600))
        .await
        .unwrap();

    let event = LoginEvent::new(user, today());
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Retry(_)
    ));

    // Redelivery succeeds once the lock is gone.
    h.kv.remove(&lock_key).await.unwrap();
    assert!(matches!(
        h.router.process_ingress(&event).await,
        ConsumerOutcome::Processed
    ));
    assert_eq!(h.store.missions_for(user).len(), 3);
}

#[tokio::test]
async fn concurrent_login_completion_publishes_once() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    login(&h, user, 2).await;
    login(&h, user, 1).await;

    // Two workers deliver distinct events for the final day concurrently.
    let first = LoginEvent::new(user, today());
    let second = LoginEvent::new(user, today());
    let (a, b) = tokio::join!(
        h.router.process_ingress(&first),
        h.router.process_ingress(&second)
    );
    assert!(matches!(a, ConsumerOutcome::Processed));
    assert!(matches!(b, ConsumerOutcome::Processed));

    assert_eq!(h.bus.published_count(TOPIC_MISSION_COMPLETED), 1);
}

#[tokio::test]
async fn cas_transition_wins_for_exactly_one_caller() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");
    h.store
        .insert_missions_if_absent(user, &MissionType::ALL, today())
        .await
        .unwrap();

    let engine = CompletionEngine::new(h.store.clone(), ProgressCache::new(h.kv.clone()));
    let (a, b) = tokio::join!(
        engine.check_and_complete(user, MissionType::Launch3Distinct, || async { true }),
        engine.check_and_complete(user, MissionType::Launch3Distinct, || async { true }),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a ^ b, "exactly one caller must win the transition");
}

#[tokio::test]
async fn play_mission_requires_strictly_over_1000() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    for score in [400, 300, 300] {
        play(&h, user, score).await;
    }
    let mission = h
        .store
        .mission(user, MissionType::Play3SessionsScoreOver1000)
        .unwrap();
    assert!(!mission.is_completed, "a sum of exactly 1000 must not complete");

    play(&h, user, 1).await;
    let mission = h
        .store
        .mission(user, MissionType::Play3SessionsScoreOver1000)
        .unwrap();
    assert!(mission.is_completed);
}

#[tokio::test]
async fn launch_mission_needs_three_distinct_games() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    // Three launches of the same game on different days: still one game.
    for event in [
        GameLaunchEvent::new(user, 1, Utc::now() - Duration::days(2)),
        GameLaunchEvent::new(user, 1, Utc::now() - Duration::days(1)),
        GameLaunchEvent::new(user, 1, Utc::now()),
    ] {
        h.router.process_ingress(&event).await;
    }
    let mission = h.store.mission(user, MissionType::Launch3Distinct).unwrap();
    assert!(!mission.is_completed);

    launch(&h, user, 2).await;
    launch(&h, user, 3).await;
    let mission = h.store.mission(user, MissionType::Launch3Distinct).unwrap();
    assert!(mission.is_completed);
}

#[tokio::test]
async fn cycle_rollover_seeds_fresh_missions() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    // A cycle completed 35 days ago has aged out of the window.
    let old_start = days_ago(35);
    h.store
        .insert_missions_if_absent(user, &MissionType::ALL, old_start)
        .await
        .unwrap();
    for mission in h.store.missions_for(user) {
        h.store.mark_completed(mission.id, Utc::now()).await.unwrap();
    }

    login(&h, user, 0).await;

    let missions = h.store.missions_for(user);
    assert_eq!(missions.len(), 6, "prior rows remain, fresh set added");
    let fresh: Vec<_> = missions
        .iter()
        .filter(|m| m.cycle_start_date == today())
        .collect();
    assert_eq!(fresh.len(), 3);
    // Only the login mission can have completed from this single event.
    assert!(fresh
        .iter()
        .all(|m| m.mission_type == MissionType::Login3Consecutive || !m.is_completed));
}

#[tokio::test]
async fn consumed_cycle_inside_window_starts_fresh_set() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    // All three completed just 10 days ago — still inside the window, but
    // consumed, so a new action opens a new cycle.
    let recent_start = days_ago(10);
    h.store
        .insert_missions_if_absent(user, &MissionType::ALL, recent_start)
        .await
        .unwrap();
    for mission in h.store.missions_for(user) {
        h.store.mark_completed(mission.id, Utc::now()).await.unwrap();
    }

    login(&h, user, 0).await;

    let missions = h.store.missions_for(user);
    assert_eq!(missions.len(), 6);
    let mission = h.store.mission(user, MissionType::Login3Consecutive).unwrap();
    assert_eq!(mission.cycle_start_date, today());
    assert!(!mission.is_completed, "one login does not complete the fresh chain");
}

#[tokio::test]
async fn reward_flows_once_and_replays_are_noops() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    complete_all_missions(&h, user).await;
    let completions = published_completions(&h);
    assert_eq!(completions.len(), 3);

    for event in &completions {
        h.router.process_mission_completed(event).await;
    }
    assert_eq!(h.store.reward_count(user), 1);
    assert_eq!(h.store.points_for(user), REWARD_POINTS);

    // Redelivery of the same events: dedup short-circuits.
    for event in &completions {
        assert!(matches!(
            h.router.process_mission_completed(event).await,
            ConsumerOutcome::Duplicate
        ));
    }

    // Fresh event ids for the same completions: the (user, type, period)
    // guard still holds.
    for event in &completions {
        let mut replay = event.clone();
        replay.event_id = Uuid::new_v4();
        h.router.process_mission_completed(&replay).await;
    }

    assert_eq!(h.store.reward_count(user), 1);
    assert_eq!(h.store.points_for(user), REWARD_POINTS);
}

#[tokio::test]
async fn no_reward_until_all_three_complete() {
    let h = harness();
    let user = h.store.add_user("alice", "pw");

    for days_back in [2, 1, 0] {
        login(&h, user, days_back).await;
    }
    let completions = published_completions(&h);
    assert_eq!(completions.len(), 1);

    h.router.process_mission_completed(&completions[0]).await;
    assert_eq!(h.store.reward_count(user), 0);
    assert_eq!(h.store.points_for(user), 0);
}
