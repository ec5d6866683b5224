//! AI SDK wire protocols for aisdk-bridge.
//!
//! This crate encodes the normalized event stream for frontends built on the
//! [Vercel AI SDK](https://sdk.vercel.ai/):
//!
//! - **[`protocol`]**: the v4 data stream ([`Protocol::Compact`]) and the v5
//!   UI message stream ([`Protocol::EventStream`]), with their headers
//! - **[`adapter`]**: [`StreamAdapter`], which runs a session and yields
//!   events, frames, bytes or an HTTP response
//!
//! # Feature Flags
//!
//! - `server`: axum response support ([`StreamAdapter::into_response`])
//!
//! # Example
//!
//! ```rust
//! use aisdk_bridge_streaming::{UpstreamEvent, UpstreamItem};
//! use aisdk_bridge_ui::{to_frame_stream, AdapterOptions, Protocol};
//! use futures::{stream, StreamExt};
//!
//! # tokio_test::block_on(async {
//! let upstream = stream::iter(vec![
//!     Ok::<_, std::io::Error>(UpstreamItem::from(UpstreamEvent::GenerationStart)),
//!     Ok(UpstreamItem::from("Hi")),
//! ]);
//!
//! let frames: Vec<_> = to_frame_stream(upstream, AdapterOptions::new(Protocol::Compact))
//!     .map(Result::unwrap)
//!     .collect()
//!     .await;
//! assert_eq!(frames[1], "0:\"Hi\"\n");
//! assert_eq!(frames.last().unwrap(), "d:{\"finishReason\":\"stop\",\"usage\":{}}\n");
//! # });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod adapter;
pub mod error;
pub mod protocol;

pub use adapter::{
    to_event_stream, to_frame_stream, AdapterOptions, EventStream, FrameStream, StreamAdapter,
};
#[cfg(feature = "server")]
pub use adapter::to_response;
pub use error::{EncodeError, Result};
pub use protocol::{
    CompactEncoder, EventStreamEncoder, FrameEncoder, Protocol, DATA_STREAM_HEADERS,
    UI_MESSAGE_STREAM_HEADERS,
};
