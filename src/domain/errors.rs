//! Domain errors for the Dave chat gateway.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the generation API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Invalid request parameters (HTTP 400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected credentials (HTTP 401/403)
    #[error("Authentication failed ({status})")]
    Authentication { status: u16 },

    /// Quota exceeded at the provider (HTTP 429)
    #[error("Upstream rate limit exceeded")]
    RateLimited,

    /// Provider-side failure (HTTP 5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success status
    #[error("Unexpected status ({status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed server-sent event stream
    #[error("Stream error: {0}")]
    Stream(String),

    /// No candidate text, usually because the provider's safety filter fired
    #[error("Empty response from upstream")]
    EmptyResponse,

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl UpstreamError {
    /// Returns true if this error is transient and a later retry may succeed
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server { .. } | Self::Network(_) | Self::Timeout
        )
    }

    /// Map an HTTP status and body into an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::InvalidRequest(message),
            401 | 403 => Self::Authentication { status },
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, message },
            _ => Self::Unexpected { status, message },
        }
    }
}

/// The circuit is open and the upstream was not called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Service temporarily unavailable, retry in {}s", .retry_after.as_secs())]
pub struct CircuitOpenError {
    pub retry_after: Duration,
}

/// Errors from the resilient generation client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ClientError {
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen(_))
    }
}

/// Failures of external collaborators (conversation, prompt and knowledge stores).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Failures of the shared rate-limit store.
#[derive(Debug, Error)]
pub enum UsageStoreError {
    #[error("Usage store connection failed: {0}")]
    Connection(String),

    #[error("Usage store command failed: {0}")]
    Command(String),
}

/// Request-level failures surfaced to the HTTP layer.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("Generation failed: {0}")]
    Upstream(UpstreamError),

    #[error("Conversation persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Caller may not access conversation {0}")]
    Forbidden(String),

    #[error("Conversation {0} not found")]
    NotFound(String),
}

pub const CIRCUIT_OPEN_MESSAGE: &str =
    "I'm taking a short break right now. Please try again in a minute.";

pub const GENERIC_FAILURE_MESSAGE: &str = "I encountered an issue. Please try again.";

pub const FORBIDDEN_MESSAGE: &str = "Not authorized to access this conversation";

pub const NOT_FOUND_MESSAGE: &str = "Conversation not found";

impl ChatError {
    /// Text that is safe to show to the user.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::CircuitOpen(_) => CIRCUIT_OPEN_MESSAGE,
            Self::Upstream(_) | Self::Persistence(_) => GENERIC_FAILURE_MESSAGE,
            Self::Forbidden(_) => FORBIDDEN_MESSAGE,
            Self::NotFound(_) => NOT_FOUND_MESSAGE,
        }
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen(err) => Some(err.retry_after),
            _ => None,
        }
    }
}

impl From<ClientError> for ChatError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::CircuitOpen(open) => Self::CircuitOpen(open),
            ClientError::Upstream(upstream) => Self::Upstream(upstream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            UpstreamError::from_status(503, "down"),
            UpstreamError::Server { status: 503, .. }
        ));
        assert!(matches!(
            UpstreamError::from_status(403, "no"),
            UpstreamError::Authentication { status: 403 }
        ));
        assert!(UpstreamError::from_status(429, "").is_transient());
        assert!(!UpstreamError::from_status(400, "bad").is_transient());
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = ChatError::Upstream(UpstreamError::Server {
            status: 500,
            message: "key AIza-secret leaked".into(),
        });
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(!err.user_message().contains("AIza"));

        let open = ChatError::from(ClientError::CircuitOpen(CircuitOpenError {
            retry_after: Duration::from_secs(12),
        }));
        assert_eq!(open.user_message(), CIRCUIT_OPEN_MESSAGE);
        assert_eq!(open.retry_after(), Some(Duration::from_secs(12)));
    }
}
