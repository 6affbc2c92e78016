//! Read-through cache for per-user mission progress.
//!
//! Backed by the same key/value service as the dedup marks. Stale entries
//! are harmless — the Completion Engine and the Initializer invalidate after
//! every write that changes a user's cycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use questline_common::{Mission, PROGRESS_CACHE_PREFIX};

use crate::keeper::KeyValue;

const PROGRESS_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ProgressCache {
    kv: Arc<dyn KeyValue>,
}

impl ProgressCache {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv }
    }

    pub async fn get(&self, user_id: i64) -> Option<Vec<Mission>> {
        let raw = match self.kv.get(&key(user_id)).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(user_id, error = %e, "Progress cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(missions) => Some(missions),
            Err(e) => {
                warn!(user_id, error = %e, "Discarding undecodable progress cache entry");
                None
            }
        }
    }

    pub async fn put(&self, user_id: i64, missions: &[Mission]) {
        let raw = match serde_json::to_string(missions) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user_id, error = %e, "Progress cache serialization failed");
                return;
            }
        };
        if let Err(e) = self.kv.set(&key(user_id), &raw, PROGRESS_TTL).await {
            warn!(user_id, error = %e, "Progress cache write failed");
        }
    }

    pub async fn invalidate(&self, user_id: i64) -> Result<()> {
        self.kv.remove(&key(user_id)).await
    }
}

fn key(user_id: i64) -> String {
    format!("{PROGRESS_CACHE_PREFIX}{user_id}")
}
