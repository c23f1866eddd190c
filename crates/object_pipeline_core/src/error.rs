use thiserror::Error;

/// Failure of one stage invocation.
///
/// None of these are retried by the stage itself; redelivery belongs to the
/// transport that triggered the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Malformed trigger payload or object body.
    #[error("decode error: {0}")]
    Decode(String),
    /// Object-storage read, write or delete failure, including injected faults.
    #[error("storage error: {0}")]
    Storage(String),
    /// Queue send failure.
    #[error("queue error: {0}")]
    Queue(String),
    /// Missing or invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StageError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Short machine-readable name, used as the `exception.type` attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DecodeError",
            Self::Storage(_) => "StorageError",
            Self::Queue(_) => "QueueError",
            Self::Config(_) => "ConfigError",
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
