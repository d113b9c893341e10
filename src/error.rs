use thiserror::Error;

/// A broker message whose body could not be turned into a task event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed event with key '{key}': {reason}")]
pub struct MalformedEventError {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Connecting, publishing or subscribing failed or timed out.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker answered but refused the write.
    #[error("broker rejected message: {0}")]
    Rejected(String),
}

impl BrokerError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Publishing a task event did not complete. The mutation that triggered
/// it has already taken effect and is not undone.
#[derive(Debug, Clone, Error)]
#[error("failed to publish {event_type} for task {task_id}: {source}")]
pub struct EventPublishFailedError {
    pub event_type: String,
    pub task_id: i64,
    #[source]
    pub source: BrokerError,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to notification store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to prepare notification schema: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("failed to write notification: {0}")]
    Write(String),

    #[error("failed to read notifications: {0}")]
    Read(String),
}
