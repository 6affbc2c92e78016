use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kafka_brokers: String,

    /// Parallel consumers spawned per ingress topic. Defaults to 2.
    pub consumers_per_topic: usize,

    /// Upper bound on outbox rows re-published per sweep. Defaults to 100.
    pub outbox_batch_size: usize,
}

impl Config {
    /// Load configuration for the worker process.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            kafka_brokers: required_env("KAFKA_BROKERS"),
            consumers_per_topic: env::var("CONSUMERS_PER_TOPIC")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            outbox_batch_size: env::var("OUTBOX_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }

    /// Log connection targets without leaking credentials.
    pub fn log_summary(&self) {
        let db_host = self
            .database_url
            .rsplit('@')
            .next()
            .unwrap_or("(unparsed)");
        tracing::info!(
            database = db_host,
            brokers = self.kafka_brokers.as_str(),
            consumers_per_topic = self.consumers_per_topic,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
