// Property tests: the pipeline's end state is invariant under duplicated
// and reordered deliveries.

mod support;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use questline_common::{
    GameLaunchEvent, GamePlayEvent, LoginEvent, REWARD_POINTS,
};
use support::harness;

#[derive(Debug, Clone)]
enum Action {
    Login { days_back: i64 },
    Launch { game_id: i64, days_back: i64 },
    Play { score: i64 },
}

#[derive(Debug, Clone)]
enum Ingress {
    Login(LoginEvent),
    Launch(GameLaunchEvent),
    Play(GamePlayEvent),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0i64..5).prop_map(|days_back| Action::Login { days_back }),
        ((1i64..5), (0i64..5))
            .prop_map(|(game_id, days_back)| Action::Launch { game_id, days_back }),
        (0i64..=1000).prop_map(|score| Action::Play { score }),
    ]
}

fn materialize(user_id: i64, action: &Action) -> Ingress {
    let now = Utc::now();
    match action {
        Action::Login { days_back } => Ingress::Login(LoginEvent::new(
            user_id,
            now.date_naive() - Duration::days(*days_back),
        )),
        Action::Launch { game_id, days_back } => Ingress::Launch(GameLaunchEvent::new(
            user_id,
            *game_id,
            now - Duration::days(*days_back),
        )),
        Action::Play { score } => Ingress::Play(GamePlayEvent::new(user_id, 1, *score, now)),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Final row counts depend only on the distinct events delivered, never
    /// on duplication or delivery order.
    #[test]
    fn end_state_is_invariant_under_duplication_and_reorder(
        actions in prop::collection::vec(action_strategy(), 1..12),
        order in prop::collection::vec(any::<prop::sample::Index>(), 1..30),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = harness();
            let user = h.store.add_user("alice", "pw");
            let events: Vec<Ingress> =
                actions.iter().map(|a| materialize(user, a)).collect();

            // Deliver with arbitrary duplicates and ordering.
            let mut delivered: HashSet<usize> = HashSet::new();
            for index in &order {
                let i = index.index(events.len());
                delivered.insert(i);
                match &events[i] {
                    Ingress::Login(e) => h.router.process_ingress(e).await,
                    Ingress::Launch(e) => h.router.process_ingress(e).await,
                    Ingress::Play(e) => h.router.process_ingress(e).await,
                };
            }

            // Play rows equal the distinct play event ids delivered.
            let distinct_plays = delivered
                .iter()
                .filter(|&&i| matches!(events[i], Ingress::Play(_)))
                .count();
            prop_assert_eq!(h.store.play_session_count(user), distinct_plays);

            // Login rows equal the distinct (user, date) pairs delivered.
            let distinct_dates: HashSet<_> = delivered
                .iter()
                .filter_map(|&i| match &events[i] {
                    Ingress::Login(e) => Some(e.login_date),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(h.store.login_day_count(user), distinct_dates.len());

            // Drain completions, replaying each twice: at most one reward
            // per period, and points stay locked to the reward count.
            let completions = support::published_completions(&h);
            for event in completions.iter().chain(completions.iter()) {
                h.router.process_mission_completed(event).await;
            }
            let rewards = h.store.reward_count(user);
            prop_assert!(rewards <= 1);
            prop_assert_eq!(h.store.points_for(user), REWARD_POINTS * rewards as i64);
            Ok(())
        })?;
    }

    /// Replaying a mission-completed event with a fresh id never double
    /// rewards within a period.
    #[test]
    fn completion_replay_with_fresh_ids_is_idempotent(extra_replays in 1usize..5) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = harness();
            let user = h.store.add_user("alice", "pw");

            let now = Utc::now();
            for days_back in [2, 1, 0] {
                let e = LoginEvent::new(user, now.date_naive() - Duration::days(days_back));
                h.router.process_ingress(&e).await;
            }
            for game_id in [1, 2, 3] {
                let e = GameLaunchEvent::new(user, game_id, now);
                h.router.process_ingress(&e).await;
            }
            for score in [500, 500, 500] {
                let e = GamePlayEvent::new(user, 1, score, now);
                h.router.process_ingress(&e).await;
            }

            let completions = support::published_completions(&h);
            prop_assert_eq!(completions.len(), 3);
            for _ in 0..extra_replays {
                for event in &completions {
                    let mut replay = event.clone();
                    replay.event_id = Uuid::new_v4();
                    h.router.process_mission_completed(&replay).await;
                }
            }

            prop_assert_eq!(h.store.reward_count(user), 1);
            prop_assert_eq!(h.store.points_for(user), REWARD_POINTS);
            Ok(())
        })?;
    }
}
