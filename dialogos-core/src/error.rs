//! Error types for engine operations

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for the session engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Conversation or message id did not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// A streaming turn is already active on the conversation
    #[error("turn already in progress for conversation {0}")]
    TurnInProgress(String),

    /// Model backend unreachable or returned a server error
    #[error("model backend unavailable: {0}")]
    ModelUnavailable(String),

    /// Model backend or the engine itself asked the caller to back off
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Malformed input, rejected before any state mutation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client side of the transport has gone away (or a write timed out)
    #[error("transport closed")]
    TransportClosed,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Whether the failed operation may be retried by the caller.
    ///
    /// Only backend unavailability and rate limiting are transient;
    /// everything else is a caller or engine defect.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ModelUnavailable(_) | EngineError::RateLimited(_)
        )
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}
