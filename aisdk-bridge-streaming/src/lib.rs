//! # aisdk-bridge-streaming
//!
//! Stream transcoding for aisdk-bridge.
//!
//! This crate turns an agent-framework event stream into normalized
//! [`UiEvent`](aisdk_bridge_core::UiEvent)s and runs the session around it.
//!
//! ## Core Concepts
//!
//! - **[`UpstreamItem`]**: One item of the upstream sequence, either a plain
//!   text chunk, a model chunk or a framework event
//! - **[`ingest`]**: Normalization of raw JSON framework envelopes
//! - **[`Transcoder`]**: The state machine that opens and closes steps, text
//!   runs and tool calls
//! - **[`Session`]**: Runs a transcoder over an upstream stream, merges manual
//!   events from an [`EventEmitter`] and fires [`StreamCallbacks`]
//! - **[`SmoothText`]**: Paces text deltas for display
//!
//! ## Example
//!
//! ```rust
//! use aisdk_bridge_streaming::{Session, UpstreamEvent, UpstreamItem};
//! use futures::{stream, StreamExt};
//!
//! # tokio_test::block_on(async {
//! let upstream = stream::iter(vec![
//!     Ok::<_, std::io::Error>(UpstreamItem::from(UpstreamEvent::GenerationStart)),
//!     Ok(UpstreamItem::from("Hello")),
//!     Ok(UpstreamItem::from(UpstreamEvent::GenerationEnd { usage: None })),
//! ]);
//!
//! let events: Vec<_> = Session::default().stream(upstream).collect().await;
//! let types: Vec<_> = events.iter().flatten().map(|e| e.event_type()).collect();
//! assert_eq!(
//!     types,
//!     ["start", "start-step", "text-start", "text-delta", "text-end", "finish-step", "finish"]
//! );
//! # });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod callbacks;
pub mod context;
pub mod emitter;
pub mod error;
pub mod ingest;
pub mod session;
pub mod smooth;
pub mod transcoder;
pub mod upstream;

// Re-exports
pub use callbacks::{FinishOptions, NoopCallbacks, StreamCallbacks};
pub use emitter::EventEmitter;
pub use error::{BoxError, StreamError, StreamResult};
pub use session::{Session, SessionConfig, SessionHandle, SessionStatus, UiEventStream};
pub use smooth::{Chunking, SmoothConfig, SmoothText, SmoothTextExt};
pub use transcoder::{ToolCallState, Transcoder, TranscoderConfig};
pub use upstream::{AgentAction, IntermediateStep, ModelChunk, UpstreamEvent, UpstreamItem};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        EventEmitter, FinishOptions, Session, SessionConfig, SmoothConfig, SmoothTextExt,
        StreamCallbacks, StreamError, StreamResult, Transcoder, TranscoderConfig, UiEventStream,
        UpstreamEvent, UpstreamItem,
    };
}
