//! Error types for the core event model.

use thiserror::Error;

/// Errors raised while converting normalized events to or from JSON.
#[derive(Error, Debug)]
pub enum CoreError {
    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload decoded but does not describe a known event.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl CoreError {
    /// Create an invalid event error.
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
