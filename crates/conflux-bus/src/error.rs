use thiserror::Error;

/// Errors that can occur while publishing onto, or consuming from, the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The underlying transport (Redis) could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A publish call failed after the envelope was already durably queued
    /// in the outbox — the caller does not need to retry, the sweep will.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The bus configuration is invalid or missing.
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for BusError {
    fn from(e: rusqlite::Error) -> Self {
        BusError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::ConnectionFailed(e.to_string())
    }
}
