use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuestlineError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Bus publish error: {0}")]
    Bus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid username or password")]
    Authentication,

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: i64 },

    #[error("Timed out waiting for mission initialization for user {user_id}")]
    InitTimeout { user_id: i64 },

    #[error("Data integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
