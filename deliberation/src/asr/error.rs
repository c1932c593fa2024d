//! Errors raised by recognizer connections.

/// Error type for recognizer connections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AsrError {
    #[error("Failed to connect to recognizer: {0}")]
    Connect(String),

    #[error("Failed to send audio: {0}")]
    Send(String),

    #[error("Connection closed")]
    Closed,

    #[error("Timed out after {0}ms")]
    Timeout(u64),
}

/// Result type for recognizer operations
pub type AsrResult<T> = Result<T, AsrError>;
