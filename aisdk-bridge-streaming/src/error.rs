//! Streaming errors.

use thiserror::Error;

/// Boxed error raised by an upstream event source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during a transcoding session.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The upstream event source failed.
    #[error("Upstream error: {0}")]
    Upstream(#[source] BoxError),

    /// The manual emitter was closed.
    #[error("Emitter closed")]
    Closed,

    /// The session was cancelled before it finished.
    #[error("Session cancelled")]
    Cancelled,

    /// No session is active in the current task.
    #[error("No active stream session")]
    NoSession,

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Wrap an error raised by the upstream source.
    pub fn upstream<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Upstream(err.into())
    }

    /// Whether the error came from the upstream source.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }

    /// Create from any error.
    pub fn from_err<E: std::fmt::Display>(err: E) -> Self {
        Self::Other(err.to_string())
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        assert_eq!(StreamError::Closed.to_string(), "Emitter closed");
        assert_eq!(
            StreamError::InvalidState("x".into()).to_string(),
            "Invalid state: x"
        );
    }

    #[test]
    fn test_upstream_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = StreamError::upstream(io);
        assert!(err.is_upstream());
        assert_eq!(err.to_string(), "Upstream error: boom");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("boom"));
    }

    #[test]
    fn test_upstream_from_string() {
        let err = StreamError::upstream("x");
        assert_eq!(err.to_string(), "Upstream error: x");
    }
}
