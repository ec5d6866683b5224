//! Wire protocols.
//!
//! Two encodings of the same normalized event stream:
//!
//! - [`Protocol::Compact`]: the AI SDK v4 data stream. One `<tag>:<json>\n`
//!   line per event, no explicit text run boundaries, terminated by a `d:`
//!   finish line.
//! - [`Protocol::EventStream`]: the AI SDK v5 UI message stream. One
//!   `data: <json>\n\n` server-sent event per event, explicit text runs,
//!   terminated by `data: [DONE]\n\n`.
//!
//! The choice of protocol never changes what the transcoder produces; it only
//! selects a [`FrameEncoder`] and the response headers.

mod compact;
mod event_stream;

use std::fmt;
use std::str::FromStr;

use aisdk_bridge_core::UiEvent;
use serde::{Deserialize, Serialize};

pub use compact::CompactEncoder;
pub use event_stream::EventStreamEncoder;

use crate::error::EncodeError;

/// Response headers of the AI SDK v4 data stream.
pub const DATA_STREAM_HEADERS: &[(&str, &str)] = &[
    ("content-type", "text/plain; charset=utf-8"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-vercel-ai-data-stream", "v1"),
];

/// Response headers of the AI SDK v5 UI message stream.
pub const UI_MESSAGE_STREAM_HEADERS: &[(&str, &str)] = &[
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
    ("x-vercel-ai-ui-message-stream", "v1"),
];

/// Wire protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// AI SDK v4 data stream.
    #[serde(alias = "v4", alias = "data-stream")]
    Compact,
    /// AI SDK v5 UI message stream.
    #[default]
    #[serde(alias = "v5", alias = "sse")]
    EventStream,
}

impl Protocol {
    /// Response headers, content type included.
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Compact => DATA_STREAM_HEADERS,
            Self::EventStream => UI_MESSAGE_STREAM_HEADERS,
        }
    }

    /// Response content type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Compact => "text/plain; charset=utf-8",
            Self::EventStream => "text/event-stream",
        }
    }

    /// AI SDK major version this protocol belongs to.
    pub fn version(&self) -> &'static str {
        match self {
            Self::Compact => "v4",
            Self::EventStream => "v5",
        }
    }

    /// A fresh encoder for one stream.
    pub fn encoder(&self) -> Box<dyn FrameEncoder> {
        match self {
            Self::Compact => Box::new(CompactEncoder::new()),
            Self::EventStream => Box::new(EventStreamEncoder::new()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version())
    }
}

impl FromStr for Protocol {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4" | "compact" | "data-stream" => Ok(Self::Compact),
            "v5" | "event-stream" | "sse" => Ok(Self::EventStream),
            other => Err(EncodeError::UnknownProtocol(other.to_owned())),
        }
    }
}

/// Stateful encoder for one stream.
///
/// Encoders may buffer state between events (the event-stream encoder tracks
/// the open text run), so a new encoder is needed per stream.
pub trait FrameEncoder: Send {
    /// Encode one event into zero or more frames.
    fn encode(&mut self, event: &UiEvent) -> Vec<String>;

    /// Frames that terminate the stream.
    fn finish(&mut self) -> Vec<String>;

    /// Encode a whole event sequence, termination included.
    fn encode_all<'a, I>(&mut self, events: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a UiEvent>,
        Self: Sized,
    {
        let mut frames: Vec<String> = events
            .into_iter()
            .flat_map(|event| self.encode(event))
            .collect();
        frames.extend(self.finish());
        frames
    }
}
