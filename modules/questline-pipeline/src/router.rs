//! Event router: the per-message state machine for the three ingress
//! consumers and the mission-completed consumer.
//!
//! Every ingress topic runs the same shape — dedup, ensure missions, record
//! the action, check completion — so the shape lives here once, over an
//! `IngressAction` trait the three payloads implement.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use questline_bus::{BusMessage, BusPublisher, BusSubscriber, MessageBus};
use questline_common::{
    GameLaunchEvent, GamePlayEvent, LoginEvent, MissionCompletedEvent, MissionType,
    DEDUP_PREFIX_GAME_LAUNCH, DEDUP_PREFIX_GAME_PLAY, DEDUP_PREFIX_LOGIN,
    DEDUP_PREFIX_MISSION_COMPLETED, GROUP_GAME_LAUNCH, GROUP_GAME_PLAY, GROUP_LOGIN, GROUP_REWARD,
    TOPIC_GAME_LAUNCH, TOPIC_GAME_PLAY, TOPIC_LOGIN, TOPIC_MISSION_COMPLETED,
};
use uuid::Uuid;

use crate::cache::ProgressCache;
use crate::completion::CompletionEngine;
use crate::evaluator::MissionEvaluator;
use crate::init::MissionInitializer;
use crate::keeper::{IdempotencyKeeper, KeyValue};
use crate::outbox::enqueue_failed_publish;
use crate::reward::RewardDistributor;
use crate::traits::{ActivityStore, MissionStore, OutboxStore, RewardStore};

// ---------------------------------------------------------------------------
// Consumer outcome — the tagged result at the consumer boundary
// ---------------------------------------------------------------------------

/// What a consumer invocation decided. The loop maps `Retry` to a
/// negative-ack; everything else acks.
#[derive(Debug)]
pub enum ConsumerOutcome {
    /// Processed to a terminal state (including logical no-ops).
    Processed,
    /// The dedup key already existed. Ack silently.
    Duplicate,
    /// Transient failure; the dedup key has been released. Redeliver.
    Retry(anyhow::Error),
    /// Undecodable or otherwise unprocessable. Ack so it never redelivers.
    Fatal(anyhow::Error),
}

// ---------------------------------------------------------------------------
// IngressAction — what varies between the three ingress topics
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IngressAction: Send + Sync {
    fn event_id(&self) -> Uuid;
    fn user_id(&self) -> i64;
    fn dedup_prefix(&self) -> &'static str;
    fn mission_type(&self) -> MissionType;

    /// Persist the action record. Must be idempotent under redelivery.
    async fn record(&self, activity: &dyn ActivityStore) -> Result<()>;
}

#[async_trait]
impl IngressAction for LoginEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    fn dedup_prefix(&self) -> &'static str {
        DEDUP_PREFIX_LOGIN
    }

    fn mission_type(&self) -> MissionType {
        MissionType::Login3Consecutive
    }

    async fn record(&self, activity: &dyn ActivityStore) -> Result<()> {
        activity.record_login(self.user_id, self.login_date).await?;
        Ok(())
    }
}

#[async_trait]
impl IngressAction for GameLaunchEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    fn dedup_prefix(&self) -> &'static str {
        DEDUP_PREFIX_GAME_LAUNCH
    }

    fn mission_type(&self) -> MissionType {
        MissionType::Launch3Distinct
    }

    async fn record(&self, activity: &dyn ActivityStore) -> Result<()> {
        activity
            .record_launch(self.user_id, self.game_id, self.launch_time.date_naive())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl IngressAction for GamePlayEvent {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn user_id(&self) -> i64 {
        self.user_id
    }

    fn dedup_prefix(&self) -> &'static str {
        DEDUP_PREFIX_GAME_PLAY
    }

    fn mission_type(&self) -> MissionType {
        MissionType::Play3SessionsScoreOver1000
    }

    async fn record(&self, activity: &dyn ActivityStore) -> Result<()> {
        activity
            .record_play(
                self.event_id,
                self.user_id,
                self.game_id,
                self.score,
                self.play_time,
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EventRouter
// ---------------------------------------------------------------------------

pub struct EventRouter {
    keeper: IdempotencyKeeper,
    init: MissionInitializer,
    evaluator: MissionEvaluator,
    completion: CompletionEngine,
    reward: RewardDistributor,
    activity: Arc<dyn ActivityStore>,
    outbox: Arc<dyn OutboxStore>,
    publisher: Arc<dyn BusPublisher>,
}

impl EventRouter {
    pub fn new(
        kv: Arc<dyn KeyValue>,
        activity: Arc<dyn ActivityStore>,
        missions: Arc<dyn MissionStore>,
        rewards: Arc<dyn RewardStore>,
        outbox: Arc<dyn OutboxStore>,
        publisher: Arc<dyn BusPublisher>,
    ) -> Self {
        let keeper = IdempotencyKeeper::new(kv.clone());
        let cache = ProgressCache::new(kv);
        Self {
            keeper: keeper.clone(),
            init: MissionInitializer::new(missions.clone(), keeper, cache.clone()),
            evaluator: MissionEvaluator::new(activity.clone()),
            completion: CompletionEngine::new(missions.clone(), cache),
            reward: RewardDistributor::new(missions, rewards),
            activity,
            outbox,
            publisher,
        }
    }

    pub fn reward(&self) -> &RewardDistributor {
        &self.reward
    }

    pub fn evaluator(&self) -> &MissionEvaluator {
        &self.evaluator
    }

    /// The ingress state machine: dedup → ensure missions → record →
    /// check-and-complete → publish on a won transition.
    pub async fn process_ingress(&self, action: &dyn IngressAction) -> ConsumerOutcome {
        let event_id = action.event_id();
        let user_id = action.user_id();
        let prefix = action.dedup_prefix();

        match self.keeper.mark_processed(prefix, event_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(%event_id, user_id, "Duplicate event, skipping");
                return ConsumerOutcome::Duplicate;
            }
            Err(e) => return ConsumerOutcome::Retry(e),
        }

        if let Err(e) = self.init.ensure_missions(user_id).await {
            return self.retry_released(prefix, event_id, e).await;
        }

        if let Err(e) = action.record(self.activity.as_ref()).await {
            return self.retry_released(prefix, event_id, e).await;
        }

        let mission_type = action.mission_type();
        let evaluator = &self.evaluator;
        let completed = self
            .completion
            .check_and_complete(user_id, mission_type, || async move {
                evaluator.is_completed(user_id, mission_type).await
            })
            .await;

        match completed {
            Ok(true) => {
                self.publish_completion(user_id, mission_type).await;
                ConsumerOutcome::Processed
            }
            Ok(false) => ConsumerOutcome::Processed,
            Err(e) => self.retry_released(prefix, event_id, e).await,
        }
    }

    /// The egress consumer: dedup, then attempt the idempotent reward.
    /// Always terminal — errors are logged and the message acks; the next
    /// action-triggered evaluation and the reward guard close the gap.
    pub async fn process_mission_completed(
        &self,
        event: &MissionCompletedEvent,
    ) -> ConsumerOutcome {
        let user_id = event.user_id;
        info!(
            event_id = %event.event_id,
            user_id,
            mission_type = %event.mission_type,
            "Received mission completed event"
        );

        match self
            .keeper
            .mark_processed(DEDUP_PREFIX_MISSION_COMPLETED, event.event_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(event_id = %event.event_id, "Duplicate mission completed event, skipping");
                return ConsumerOutcome::Duplicate;
            }
            // The reward guard is idempotent on its own; process anyway.
            Err(e) => warn!(error = %e, "Dedup check failed, continuing"),
        }

        match self.reward.distribute(user_id).await {
            Ok(true) => debug!(user_id, "Reward distributed"),
            Ok(false) => debug!(user_id, "No reward due"),
            Err(e) => error!(user_id, error = %e, "Reward distribution failed"),
        }
        ConsumerOutcome::Processed
    }

    /// Synchronous publish of a won completion. A failure leaves the
    /// mission completed and buffers the event in the outbox.
    async fn publish_completion(&self, user_id: i64, mission_type: MissionType) {
        let event = MissionCompletedEvent::new(user_id, mission_type, Utc::now());
        let payload = event.to_payload();

        match self
            .publisher
            .publish(TOPIC_MISSION_COMPLETED, &user_id.to_string(), &payload)
            .await
        {
            Ok(()) => {
                info!(user_id, %mission_type, "Published mission completed event");
            }
            Err(e) => {
                error!(
                    user_id,
                    %mission_type,
                    error = %e,
                    "Failed to send mission completed event, saving to outbox"
                );
                enqueue_failed_publish(
                    self.outbox.as_ref(),
                    event.event_id,
                    TOPIC_MISSION_COMPLETED,
                    &payload,
                    event.event_type(),
                    &e.to_string(),
                )
                .await;
            }
        }
    }

    async fn retry_released(
        &self,
        prefix: &'static str,
        event_id: Uuid,
        error: anyhow::Error,
    ) -> ConsumerOutcome {
        if let Err(e) = self.keeper.release(prefix, event_id).await {
            warn!(%event_id, error = %e, "Failed to release dedup key");
        }
        ConsumerOutcome::Retry(error)
    }
}

// ---------------------------------------------------------------------------
// Consumer loops
// ---------------------------------------------------------------------------

async fn finish(
    subscriber: &mut dyn BusSubscriber,
    message: &BusMessage,
    outcome: ConsumerOutcome,
) -> Result<()> {
    match outcome {
        ConsumerOutcome::Processed | ConsumerOutcome::Duplicate => subscriber.ack(message).await,
        ConsumerOutcome::Retry(e) => {
            warn!(topic = message.topic.as_str(), error = %e, "Transient failure, message nacked for redelivery");
            subscriber.nack(message).await
        }
        ConsumerOutcome::Fatal(e) => {
            error!(topic = message.topic.as_str(), error = %e, "Unprocessable message, acked");
            subscriber.ack(message).await
        }
    }
}

async fn run_ingress_loop<E>(
    bus: &dyn MessageBus,
    topic: &str,
    group: &str,
    router: &EventRouter,
) -> Result<()>
where
    E: IngressAction + serde::de::DeserializeOwned,
{
    let mut subscriber = bus.subscribe(topic, group).await?;
    loop {
        let message = subscriber.next().await?;
        let outcome = match serde_json::from_value::<E>(message.payload.clone()) {
            Ok(event) => router.process_ingress(&event).await,
            Err(e) => ConsumerOutcome::Fatal(e.into()),
        };
        finish(subscriber.as_mut(), &message, outcome).await?;
    }
}

pub async fn run_login_consumer(bus: Arc<dyn MessageBus>, router: Arc<EventRouter>) -> Result<()> {
    run_ingress_loop::<LoginEvent>(bus.as_ref(), TOPIC_LOGIN, GROUP_LOGIN, router.as_ref()).await
}

pub async fn run_launch_consumer(bus: Arc<dyn MessageBus>, router: Arc<EventRouter>) -> Result<()> {
    run_ingress_loop::<GameLaunchEvent>(
        bus.as_ref(),
        TOPIC_GAME_LAUNCH,
        GROUP_GAME_LAUNCH,
        router.as_ref(),
    )
    .await
}

pub async fn run_play_consumer(bus: Arc<dyn MessageBus>, router: Arc<EventRouter>) -> Result<()> {
    run_ingress_loop::<GamePlayEvent>(
        bus.as_ref(),
        TOPIC_GAME_PLAY,
        GROUP_GAME_PLAY,
        router.as_ref(),
    )
    .await
}

pub async fn run_reward_consumer(bus: Arc<dyn MessageBus>, router: Arc<EventRouter>) -> Result<()> {
    let mut subscriber = bus.subscribe(TOPIC_MISSION_COMPLETED, GROUP_REWARD).await?;
    loop {
        let message = subscriber.next().await?;
        let outcome = match MissionCompletedEvent::from_payload(&message.payload) {
            Ok(event) => router.process_mission_completed(&event).await,
            Err(e) => ConsumerOutcome::Fatal(e.into()),
        };
        finish(subscriber.as_mut(), &message, outcome).await?;
    }
}
