//! Postgres persistence for the mission pipeline.
//!
//! One `PgStore` over a `PgPool`; method groups live in one module per
//! concern. All conditional inserts use insert-if-absent on the table's
//! unique key and report created-vs-existed to the caller.

pub mod error;
pub mod types;

mod activity;
mod catalog;
mod missions;
mod outbox;
mod rewards;

pub use error::{Result, StoreError};
pub use types::PlayStats;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to Postgres and return a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations (idempotent).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
