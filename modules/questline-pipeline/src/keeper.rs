//! Idempotency keeper: short-TTL dedup marks and the per-user init lock,
//! built over a key/value capability trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use questline_common::INIT_LOCK_PREFIX;

/// Dedup marks outlive any plausible redelivery window.
pub const DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// The init lock TTL must strictly exceed the seeding transaction's duration.
pub const INIT_LOCK_TTL: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// KeyValue — the minimal service surface the keeper needs
// ---------------------------------------------------------------------------

#[async_trait]
pub trait KeyValue: Send + Sync {
    /// Returns `true` iff this call created the entry.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// IdempotencyKeeper
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IdempotencyKeeper {
    kv: Arc<dyn KeyValue>,
}

impl IdempotencyKeeper {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    /// Claim an event id for processing. `true` means this caller is first;
    /// `false` means a duplicate delivery.
    pub async fn mark_processed(&self, prefix: &str, event_id: Uuid) -> Result<bool> {
        self.kv
            .set_if_absent(&format!("{prefix}{event_id}"), "1", DEDUP_TTL)
            .await
    }

    /// Undo a dedup claim so a redelivery re-attempts processing. Called on
    /// downstream failure within the same consumer invocation.
    pub async fn release(&self, prefix: &str, event_id: Uuid) -> Result<()> {
        self.kv.remove(&format!("{prefix}{event_id}")).await
    }

    /// Non-reentrant advisory lock for mission initialization. Not
    /// owner-verified on release; each hold is shorter than the TTL and the
    /// guarded insert is also protected by the table's unique key.
    pub async fn try_init_lock(&self, user_id: i64) -> Result<bool> {
        self.kv
            .set_if_absent(&format!("{INIT_LOCK_PREFIX}{user_id}"), "1", INIT_LOCK_TTL)
            .await
    }

    pub async fn unlock_init(&self, user_id: i64) -> Result<()> {
        self.kv.remove(&format!("{INIT_LOCK_PREFIX}{user_id}")).await
    }
}

// ---------------------------------------------------------------------------
// MemoryKeyValue — deadline-based expiry behind a mutex
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryKeyValue {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::default()
    }

    fn live<'a>(
        entries: &'a mut HashMap<String, (String, Instant)>,
        key: &str,
    ) -> Option<&'a (String, Instant)> {
        let expired = entries
            .get(key)
            .map(|(_, deadline)| *deadline <= Instant::now())
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key)
    }
}

#[async_trait]
impl KeyValue for MemoryKeyValue {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        Ok(Self::live(&mut entries, key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
