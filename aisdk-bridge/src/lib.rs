//! # aisdk-bridge
//!
//! Transcode agent-framework event streams into the
//! [Vercel AI SDK](https://sdk.vercel.ai/) stream protocols.
//!
//! An agent framework such as LangChain reports its work as a stream of
//! loosely shaped events: model starts and tokens, tool starts and ends,
//! chain steps. A chat frontend built on the AI SDK expects either the v4
//! data stream or the v5 UI message stream. This crate sits in between: it
//! normalizes the upstream items, runs them through a lifecycle state
//! machine that opens and closes steps, text runs and tool calls, lets you
//! inject events by hand, accumulates the final assistant message, and
//! encodes everything for the wire.
//!
//! ## Quick Start
//!
//! ```rust
//! use aisdk_bridge::prelude::*;
//! use futures::{stream, StreamExt};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let upstream = stream::iter(vec![
//!     Ok::<_, std::io::Error>(json!({"event": "on_chat_model_start", "data": {}})),
//!     Ok(json!({"event": "on_chat_model_stream", "data": {"chunk": {"content": "Hello"}}})),
//!     Ok(json!({"event": "on_chat_model_end", "data": {}})),
//! ]);
//!
//! let frames: Vec<String> = to_frame_stream(upstream, AdapterOptions::new(Protocol::EventStream))
//!     .map(Result::unwrap)
//!     .collect()
//!     .await;
//! assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description | Default |
//! |---------|-------------|--------|
//! | `server` | axum streaming responses | ❌ |
//! | `full` | All features | ❌ |
//!
//! ## Architecture
//!
//! aisdk-bridge is organized as a workspace of focused crates:
//!
//! - [`aisdk_bridge_core`] - Normalized events, messages and accumulation
//! - [`aisdk_bridge_streaming`] - Ingestion, transcoder, sessions and callbacks
//! - [`aisdk_bridge_ui`] - Wire protocols and the transport adapter

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// Crate Re-exports
// ============================================================================

/// Normalized events, messages and accumulation.
pub use aisdk_bridge_core as core;

/// Ingestion, transcoding and session lifecycle.
pub use aisdk_bridge_streaming as streaming;

/// Wire protocols and the transport adapter.
pub use aisdk_bridge_ui as ui;

// ============================================================================
// Top-level Re-exports
// ============================================================================

pub use aisdk_bridge_core::{
    FinishReason, Message, MessageAccumulator, MessagePart, StepSummary, ToolInvocation,
    ToolInvocationState, UiEvent, Usage,
};
pub use aisdk_bridge_streaming::{
    EventEmitter, FinishOptions, Session, SessionConfig, SessionHandle, SessionStatus,
    SmoothConfig, StreamCallbacks, StreamError, StreamResult, Transcoder, TranscoderConfig,
    UiEventStream, UpstreamEvent, UpstreamItem,
};
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub use aisdk_bridge_ui::to_response;
pub use aisdk_bridge_ui::{
    to_event_stream, to_frame_stream, AdapterOptions, EncodeError, FrameEncoder, Protocol,
    StreamAdapter,
};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude for common imports.
pub mod prelude {
    // Events and messages
    pub use crate::core::{FinishReason, Message, MessagePart, UiEvent, Usage};

    // Sessions
    pub use crate::streaming::{
        EventEmitter, FinishOptions, Session, SessionConfig, SmoothConfig, SmoothTextExt,
        StreamCallbacks, StreamError, UpstreamEvent, UpstreamItem,
    };

    // Transport
    pub use crate::ui::{
        to_event_stream, to_frame_stream, AdapterOptions, EncodeError, Protocol, StreamAdapter,
    };

    #[cfg(feature = "server")]
    pub use crate::ui::to_response;
}
