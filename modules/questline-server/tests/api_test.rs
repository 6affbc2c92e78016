// API-surface tests over the in-memory backends: authentication, existence
// checks, fire-and-queue publishing, and the cached read paths.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};

use questline_bus::memory::MemoryBus;
use questline_common::{
    Config, LoginEvent, MissionType, QuestlineError, TOPIC_GAME_PLAY, TOPIC_LOGIN,
};
use questline_pipeline::testing::MemoryStore;
use questline_pipeline::MissionStore;
use questline_server::{api, AppDeps};

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        kafka_brokers: String::new(),
        consumers_per_topic: 1,
        outbox_batch_size: 100,
    }
}

struct TestApp {
    store: Arc<MemoryStore>,
    bus: MemoryBus,
    deps: AppDeps,
}

fn app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let bus = MemoryBus::new();
    let deps = AppDeps::assemble(test_config(), store.clone(), Arc::new(bus.clone()));
    TestApp { store, bus, deps }
}

/// Wait out the fire-and-queue publish task.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    let app = app();
    app.store.add_user("alice", "pw");

    let wrong_password =
        api::authenticate_and_login(&app.deps, "alice", "nope", None).await;
    assert!(matches!(wrong_password, Err(QuestlineError::Authentication)));

    let unknown_user = api::authenticate_and_login(&app.deps, "mallory", "pw", None).await;
    assert!(matches!(unknown_user, Err(QuestlineError::Authentication)));

    assert_eq!(app.bus.published_count(TOPIC_LOGIN), 0);
}

#[tokio::test]
async fn login_publishes_event_with_requested_date() {
    let app = app();
    let user = app.store.add_user("alice", "pw");
    let date = NaiveDate::from_ymd_opt(2026, 7, 30).unwrap();

    let logged_in = api::authenticate_and_login(&app.deps, "alice", "pw", Some(date))
        .await
        .unwrap();
    assert_eq!(logged_in.id, user);

    eventually(|| app.bus.published_count(TOPIC_LOGIN) == 1).await;
    let payload = &app.bus.published_payloads(TOPIC_LOGIN)[0];
    let event = LoginEvent::from_payload(payload).unwrap();
    assert_eq!(event.user_id, user);
    assert_eq!(event.login_date, date);
}

#[tokio::test]
async fn launch_requires_known_user_and_game() {
    let app = app();
    let user = app.store.add_user("alice", "pw");
    let game = app.store.add_game("Star Forge");

    let missing_game = api::launch_game(&app.deps, user, game + 1).await;
    assert!(matches!(
        missing_game,
        Err(QuestlineError::NotFound { resource: "Game", .. })
    ));

    let missing_user = api::launch_game(&app.deps, user + 1, game).await;
    assert!(matches!(
        missing_user,
        Err(QuestlineError::NotFound { resource: "User", .. })
    ));

    api::launch_game(&app.deps, user, game).await.unwrap();
}

#[tokio::test]
async fn play_echoes_the_published_score() {
    let app = app();
    let user = app.store.add_user("alice", "pw");
    let game = app.store.add_game("Star Forge");

    let score = api::play_game(&app.deps, user, game).await.unwrap();
    assert!((0..=1000).contains(&score));

    eventually(|| app.bus.published_count(TOPIC_GAME_PLAY) == 1).await;
    let payload = &app.bus.published_payloads(TOPIC_GAME_PLAY)[0];
    assert_eq!(payload["score"].as_i64(), Some(score));
    assert_eq!(payload["user_id"].as_i64(), Some(user));
}

#[tokio::test]
async fn mission_progress_reads_through_the_cache() {
    let app = app();
    let user = app.store.add_user("alice", "pw");
    app.store
        .insert_missions_if_absent(user, &MissionType::ALL, Utc::now().date_naive())
        .await
        .unwrap();

    let first = api::mission_progress(&app.deps, user).await.unwrap();
    assert_eq!(first.len(), 3);
    assert!(first.iter().all(|m| !m.is_completed));

    // A direct store write is invisible until the cache is invalidated.
    let mission = app.store.mission(user, MissionType::Login3Consecutive).unwrap();
    app.store.mark_completed(mission.id, Utc::now()).await.unwrap();

    let cached = api::mission_progress(&app.deps, user).await.unwrap();
    assert!(cached.iter().all(|m| !m.is_completed));

    app.deps.cache.invalidate(user).await.unwrap();
    let fresh = api::mission_progress(&app.deps, user).await.unwrap();
    assert_eq!(fresh.iter().filter(|m| m.is_completed).count(), 1);
}

#[tokio::test]
async fn ingress_publish_failure_lands_in_outbox() {
    let app = app();
    app.store.add_user("alice", "pw");
    app.bus.fail_topic(TOPIC_LOGIN);

    // Fire-and-queue: the caller still succeeds.
    api::authenticate_and_login(&app.deps, "alice", "pw", None)
        .await
        .unwrap();

    eventually(|| app.store.outbox_entries().len() == 1).await;
    let entry = &app.store.outbox_entries()[0];
    assert_eq!(entry.topic, TOPIC_LOGIN);
    assert_eq!(entry.event_type, "LOGIN");
}

#[tokio::test]
async fn game_catalog_lists_in_id_order() {
    let app = app();
    let first = app.store.add_game("Star Forge");
    let second = app.store.add_game("Mech Arena");

    let games = api::list_games(&app.deps).await.unwrap();
    assert_eq!(
        games.iter().map(|g| g.id).collect::<Vec<_>>(),
        vec![first, second]
    );
}
