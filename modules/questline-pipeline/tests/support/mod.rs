// Shared wiring for pipeline tests: the full router over the in-memory
// store, bus, and key/value backends. Not every test binary uses every
// helper.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use questline_bus::memory::MemoryBus;
use questline_bus::MessageBus;
use questline_common::{MissionCompletedEvent, TOPIC_MISSION_COMPLETED};
use questline_pipeline::testing::MemoryStore;
use questline_pipeline::{EventRouter, MemoryKeyValue, OutboxSweeper};

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: MemoryBus,
    pub kv: Arc<MemoryKeyValue>,
    pub router: Arc<EventRouter>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let bus = MemoryBus::new();
    let kv = Arc::new(MemoryKeyValue::new());
    let router = Arc::new(EventRouter::new(
        kv.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        bus.publisher(),
    ));
    Harness {
        store,
        bus,
        kv,
        router,
    }
}

pub fn sweeper(h: &Harness) -> OutboxSweeper {
    OutboxSweeper::new(h.store.clone(), h.bus.publisher(), 100)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_ago(n: i64) -> NaiveDate {
    today() - Duration::days(n)
}

/// Mission-completed events the router has published so far, in order.
pub fn published_completions(h: &Harness) -> Vec<MissionCompletedEvent> {
    h.bus
        .published_payloads(TOPIC_MISSION_COMPLETED)
        .iter()
        .map(|p| MissionCompletedEvent::from_payload(p).expect("valid completion payload"))
        .collect()
}
