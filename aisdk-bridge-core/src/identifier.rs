//! ID generation utilities.
//!
//! Every text run, reasoning run, tool call and message in a session gets
//! its own identifier. Ids are never reused, so a client can safely key its
//! reconciliation state on them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a unique message ID.
///
/// # Example
///
/// ```rust
/// use aisdk_bridge_core::identifier::generate_message_id;
///
/// let id = generate_message_id();
/// assert!(id.starts_with("msg_"));
/// assert_eq!(id.len(), 36); // "msg_" + 32 hex chars
/// ```
#[must_use]
pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Generate a unique text run ID.
#[must_use]
pub fn generate_text_id() -> String {
    format!("txt_{}", Uuid::new_v4().simple())
}

/// Generate a unique reasoning run ID.
#[must_use]
pub fn generate_reasoning_id() -> String {
    format!("rsn_{}", Uuid::new_v4().simple())
}

/// Generate a unique tool call ID.
///
/// Used when the upstream framework does not provide a run id for a call.
///
/// ```rust
/// use aisdk_bridge_core::identifier::generate_tool_call_id;
///
/// let id = generate_tool_call_id();
/// assert!(id.starts_with("call_"));
/// ```
#[must_use]
pub fn generate_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Generate a unique source ID.
#[must_use]
pub fn generate_source_id() -> String {
    format!("src_{}", Uuid::new_v4().simple())
}

/// Get the current UTC timestamp.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
