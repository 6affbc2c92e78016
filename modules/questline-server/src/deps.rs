//! Central dependency container passed to the API surface and the workers.

use std::sync::Arc;

use questline_bus::{BusPublisher, MessageBus};
use questline_common::Config;
use questline_pipeline::cache::ProgressCache;
use questline_pipeline::{
    ActivityStore, CatalogStore, EventRouter, KeyValue, MemoryKeyValue, MissionStore, OutboxStore,
    RewardStore,
};
use questline_store::PgStore;

#[derive(Clone)]
pub struct AppDeps {
    pub catalog: Arc<dyn CatalogStore>,
    pub missions: Arc<dyn MissionStore>,
    pub rewards: Arc<dyn RewardStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub bus: Arc<dyn MessageBus>,
    pub publisher: Arc<dyn BusPublisher>,
    pub router: Arc<EventRouter>,
    pub cache: ProgressCache,
    pub config: Config,
}

impl AppDeps {
    /// Production wiring: Postgres store, Kafka bus, in-memory key/value.
    pub fn new(config: Config, store: PgStore, bus: Arc<dyn MessageBus>) -> Self {
        Self::assemble(config, Arc::new(store), bus)
    }

    /// Wire the pipeline over any store that provides every capability.
    /// Tests pass the in-memory store here.
    pub fn assemble<S>(config: Config, store: Arc<S>, bus: Arc<dyn MessageBus>) -> Self
    where
        S: CatalogStore + ActivityStore + MissionStore + RewardStore + OutboxStore + 'static,
    {
        let kv: Arc<dyn KeyValue> = Arc::new(MemoryKeyValue::new());
        let publisher = bus.publisher();
        let router = Arc::new(EventRouter::new(
            kv.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            publisher.clone(),
        ));

        Self {
            catalog: store.clone(),
            missions: store.clone(),
            rewards: store.clone(),
            outbox: store,
            bus,
            publisher,
            router,
            cache: ProgressCache::new(kv),
            config,
        }
    }
}
