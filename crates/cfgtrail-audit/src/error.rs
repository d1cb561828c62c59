//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur while turning change events into audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A change notification is missing a required field or carries a value
    /// of the wrong type.
    #[error("malformed change event: {0}")]
    MalformedEvent(String),

    /// The operation kind is neither a creation nor an update.
    ///
    /// Informational only: the router logs it and skips the event.
    #[error("unhandled operation: {0}")]
    UnhandledOperation(String),

    /// The audit store cannot be reached or rejected the write.
    #[error("audit store unavailable: {0}")]
    SinkUnavailable(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuditError {
    /// Create a malformed event error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEvent(message.into())
    }

    /// Create a sink unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::SinkUnavailable(message.into())
    }

    /// Whether redelivering the same batch can succeed.
    ///
    /// Malformed events fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SinkUnavailable(_) | Self::Io(_))
    }
}
