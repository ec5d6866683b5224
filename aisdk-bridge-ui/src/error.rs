//! Encoding errors.

use aisdk_bridge_streaming::StreamError;
use thiserror::Error;

/// Errors raised while encoding or serving a stream.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The underlying session failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown protocol name.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// A response header name or value is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The response status code is invalid.
    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),
}

impl EncodeError {
    /// Whether the error came from the upstream event source.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Stream(err) if err.is_upstream())
    }
}

/// Result type for encoding operations.
pub type Result<T> = std::result::Result<T, EncodeError>;
