//! The synchronous surface the HTTP layer calls.
//!
//! Writes are fire-and-queue: the caller gets an answer as soon as the
//! action is validated, and the event travels to the pipeline through the
//! bus. A publish failure lands the payload in the outbox — the async
//! pipeline never surfaces errors to users.

use chrono::{NaiveDate, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use questline_common::{
    cycle_window_start, Game, GameLaunchEvent, GamePlayEvent, LoginEvent, Mission, MissionReward,
    QuestlineError, User, TOPIC_GAME_LAUNCH, TOPIC_GAME_PLAY, TOPIC_LOGIN,
};
use questline_pipeline::outbox::enqueue_failed_publish;

use crate::deps::AppDeps;

/// Password-equality authentication, then a fire-and-queue login event.
/// The date defaults to today; tests and backfills may pass one explicitly.
pub async fn authenticate_and_login(
    deps: &AppDeps,
    username: &str,
    password: &str,
    login_date: Option<NaiveDate>,
) -> Result<User, QuestlineError> {
    let user = deps
        .catalog
        .find_user_by_username(username)
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))?
        .ok_or_else(|| {
            warn!(username, "Login failed: unknown username");
            QuestlineError::Authentication
        })?;

    if user.password != password {
        warn!(username, "Login failed: incorrect password");
        return Err(QuestlineError::Authentication);
    }

    let effective_date = login_date.unwrap_or_else(|| Utc::now().date_naive());
    let event = LoginEvent::new(user.id, effective_date);
    publish_ingress(
        deps,
        TOPIC_LOGIN,
        event.event_id,
        user.id,
        event.to_payload(),
        event.event_type(),
    );

    info!(user_id = user.id, %effective_date, "Login accepted");
    Ok(user)
}

/// Validate user and game, then fire-and-queue a launch event.
pub async fn launch_game(deps: &AppDeps, user_id: i64, game_id: i64) -> Result<(), QuestlineError> {
    ensure_user_and_game(deps, user_id, game_id).await?;

    let event = GameLaunchEvent::new(user_id, game_id, Utc::now());
    publish_ingress(
        deps,
        TOPIC_GAME_LAUNCH,
        event.event_id,
        user_id,
        event.to_payload(),
        event.event_type(),
    );

    info!(user_id, game_id, "Game launch accepted");
    Ok(())
}

/// Validate user and game, draw the server-side score, fire-and-queue a
/// play event, and echo the score back to the caller.
pub async fn play_game(deps: &AppDeps, user_id: i64, game_id: i64) -> Result<i64, QuestlineError> {
    ensure_user_and_game(deps, user_id, game_id).await?;

    let score = rand::thread_rng().gen_range(0..=1000);
    let event = GamePlayEvent::new(user_id, game_id, score, Utc::now());
    publish_ingress(
        deps,
        TOPIC_GAME_PLAY,
        event.event_id,
        user_id,
        event.to_payload(),
        event.event_type(),
    );

    info!(user_id, game_id, score, "Game play accepted");
    Ok(score)
}

/// The user's missions in the active cycle, read through the progress cache.
pub async fn mission_progress(
    deps: &AppDeps,
    user_id: i64,
) -> Result<Vec<Mission>, QuestlineError> {
    if let Some(missions) = deps.cache.get(user_id).await {
        return Ok(missions);
    }

    let missions = deps
        .missions
        .missions_since(user_id, cycle_window_start(Utc::now()))
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))?;
    deps.cache.put(user_id, &missions).await;
    Ok(missions)
}

/// Reward history, most recent first.
pub async fn reward_history(
    deps: &AppDeps,
    user_id: i64,
) -> Result<Vec<MissionReward>, QuestlineError> {
    deps.rewards
        .rewards_for(user_id)
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))
}

/// The static game catalog.
pub async fn list_games(deps: &AppDeps) -> Result<Vec<Game>, QuestlineError> {
    deps.catalog
        .list_games()
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))
}

async fn ensure_user_and_game(
    deps: &AppDeps,
    user_id: i64,
    game_id: i64,
) -> Result<(), QuestlineError> {
    let user_exists = deps
        .catalog
        .user_exists(user_id)
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))?;
    if !user_exists {
        return Err(QuestlineError::NotFound {
            resource: "User",
            id: user_id,
        });
    }

    let game_exists = deps
        .catalog
        .game_exists(game_id)
        .await
        .map_err(|e| QuestlineError::Database(e.to_string()))?;
    if !game_exists {
        return Err(QuestlineError::NotFound {
            resource: "Game",
            id: game_id,
        });
    }
    Ok(())
}

/// Publish without blocking the caller. Failures go to the outbox so the
/// sweeper closes the gap.
fn publish_ingress(
    deps: &AppDeps,
    topic: &'static str,
    event_id: Uuid,
    user_id: i64,
    payload: serde_json::Value,
    event_type: &'static str,
) {
    let publisher = deps.publisher.clone();
    let outbox = deps.outbox.clone();

    tokio::spawn(async move {
        if let Err(e) = publisher
            .publish(topic, &user_id.to_string(), &payload)
            .await
        {
            tracing::error!(%event_id, topic, error = %e, "Ingress publish failed, saving to outbox");
            enqueue_failed_publish(
                outbox.as_ref(),
                event_id,
                topic,
                &payload,
                event_type,
                &e.to_string(),
            )
            .await;
        }
    });
}
