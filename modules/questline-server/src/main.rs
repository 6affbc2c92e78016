use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use questline_bus::kafka::KafkaBus;
use questline_bus::MessageBus;
use questline_common::Config;
use questline_pipeline::router::{
    run_launch_consumer, run_login_consumer, run_play_consumer, run_reward_consumer,
};
use questline_pipeline::{EventRouter, OutboxSweeper};
use questline_server::AppDeps;
use questline_store::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("questline=info".parse()?))
        .init();

    info!("Questline mission workers starting...");

    let config = Config::from_env();
    config.log_summary();

    let store = PgStore::connect(&config.database_url).await?;
    store.migrate().await?;

    let bus: Arc<dyn MessageBus> = Arc::new(KafkaBus::connect(&config.kafka_brokers)?);
    let deps = AppDeps::new(config, store, bus);

    // One subscriber per worker; workers in the same consumer group share
    // their topic's messages.
    for _ in 0..deps.config.consumers_per_topic {
        spawn_worker("login", &deps, run_login_consumer);
        spawn_worker("game-launch", &deps, run_launch_consumer);
        spawn_worker("game-play", &deps, run_play_consumer);
        spawn_worker("mission-completed", &deps, run_reward_consumer);
    }

    let sweeper = OutboxSweeper::new(
        deps.outbox.clone(),
        deps.publisher.clone(),
        deps.config.outbox_batch_size as i64,
    );
    tokio::spawn(sweeper.run());

    info!("Workers running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}

fn spawn_worker<F, Fut>(name: &'static str, deps: &AppDeps, run: F)
where
    F: FnOnce(Arc<dyn MessageBus>, Arc<EventRouter>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let bus = deps.bus.clone();
    let router = deps.router.clone();
    tokio::spawn(async move {
        if let Err(e) = run(bus, router).await {
            error!(consumer = name, error = %e, "Consumer terminated");
        }
    });
}
