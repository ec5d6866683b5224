//! AI SDK v5 UI message stream encoding.

use aisdk_bridge_core::UiEvent;
use tracing::{debug, warn};

use super::FrameEncoder;

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Encoder for the AI SDK v5 UI message stream.
///
/// The client requires every text delta to sit inside a `text-start` /
/// `text-end` pair. The encoder opens a run before an orphan delta, closes
/// the open run before any other event, and drops `text-end`s that match no
/// open run.
#[derive(Debug, Default)]
pub struct EventStreamEncoder {
    open_text: Option<String>,
}

impl EventStreamEncoder {
    /// Create an encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the text run currently open on the wire.
    pub fn open_text(&self) -> Option<&str> {
        self.open_text.as_deref()
    }

    fn frame(event: &UiEvent) -> String {
        Self::render(event, serde_json::to_string(event))
    }

    /// A failed encode becomes an `error` frame in place of the original.
    fn render(event: &UiEvent, encoded: serde_json::Result<String>) -> String {
        match encoded {
            Ok(json) => format!("data: {json}\n\n"),
            Err(err) => {
                warn!(
                    event_type = event.event_type(),
                    error = %err,
                    "failed to encode event frame"
                );
                let fallback = serde_json::json!({"type": "error", "errorText": err.to_string()});
                format!("data: {fallback}\n\n")
            }
        }
    }

    fn close_open_text(&mut self, frames: &mut Vec<String>) {
        if let Some(id) = self.open_text.take() {
            frames.push(Self::frame(&UiEvent::text_end(id)));
        }
    }
}

impl FrameEncoder for EventStreamEncoder {
    fn encode(&mut self, event: &UiEvent) -> Vec<String> {
        let mut frames = Vec::new();
        match event {
            UiEvent::TextStart { id } => {
                if self.open_text.as_deref() == Some(id.as_str()) {
                    debug!(text_id = %id, "text run already open");
                    return frames;
                }
                self.close_open_text(&mut frames);
                self.open_text = Some(id.clone());
                frames.push(Self::frame(event));
            }
            UiEvent::TextDelta { id, .. } => {
                if self.open_text.as_deref() != Some(id.as_str()) {
                    self.close_open_text(&mut frames);
                    frames.push(Self::frame(&UiEvent::text_start(id.clone())));
                    self.open_text = Some(id.clone());
                }
                frames.push(Self::frame(event));
            }
            UiEvent::TextEnd { id, .. } => {
                if self.open_text.as_deref() == Some(id.as_str()) {
                    self.open_text = None;
                    frames.push(Self::frame(event));
                } else {
                    debug!(text_id = %id, "dropping text end without an open run");
                }
            }
            _ => {
                self.close_open_text(&mut frames);
                frames.push(Self::frame(event));
            }
        }
        frames
    }

    fn finish(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        self.close_open_text(&mut frames);
        frames.push(DONE_FRAME.to_owned());
        frames
    }
}
