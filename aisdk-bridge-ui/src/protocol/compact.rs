//! AI SDK v4 data stream encoding.
//!
//! | Tag | Event |
//! |-----|-------|
//! | `0` | text delta |
//! | `g` | reasoning delta |
//! | `f` | step start |
//! | `e` | step finish |
//! | `b` | tool input start |
//! | `c` | tool input delta |
//! | `9` | tool call |
//! | `a` | tool result (and tool error) |
//! | `2` | data |
//! | `3` | error |
//! | `8` | message metadata |
//! | `h` | source |
//! | `k` | file |
//! | `d` | finish |

use aisdk_bridge_core::UiEvent;
use serde_json::{json, Value};
use tracing::{trace, warn};

use super::FrameEncoder;

const DEFAULT_FINISH: &str = "d:{\"finishReason\":\"stop\",\"usage\":{}}\n";

/// Encoder for the AI SDK v4 data stream.
#[derive(Debug, Default)]
pub struct CompactEncoder {
    message_id: String,
    finished: bool,
}

impl CompactEncoder {
    /// Create an encoder.
    pub fn new() -> Self {
        Self::default()
    }

    fn line(tag: char, value: &Value) -> Vec<String> {
        vec![Self::render(tag, serde_json::to_string(value))]
    }

    /// A failed encode becomes an error line in place of the original.
    fn render(tag: char, encoded: serde_json::Result<String>) -> String {
        match encoded {
            Ok(json) => format!("{tag}:{json}\n"),
            Err(err) => {
                warn!(tag = %tag, error = %err, "failed to encode data stream line");
                format!("3:{}\n", Value::String(err.to_string()))
            }
        }
    }
}

impl FrameEncoder for CompactEncoder {
    fn encode(&mut self, event: &UiEvent) -> Vec<String> {
        match event {
            UiEvent::StreamStart { message_id } => {
                self.message_id.clone_from(message_id);
                Vec::new()
            }
            UiEvent::StreamFinish {
                finish_reason,
                usage,
            } => {
                if self.finished {
                    trace!("skipping repeated finish line");
                    return Vec::new();
                }
                self.finished = true;
                let usage = usage.map_or_else(|| json!({}), |u| json!(u));
                Self::line('d', &json!({"finishReason": finish_reason, "usage": usage}))
            }
            UiEvent::StepStart => Self::line('f', &json!({"messageId": self.message_id})),
            UiEvent::StepFinish {
                finish_reason,
                usage,
                is_continued,
            } => Self::line(
                'e',
                &json!({
                    "finishReason": finish_reason,
                    "usage": usage,
                    "isContinued": is_continued,
                }),
            ),
            UiEvent::TextDelta { delta, .. } => Self::line('0', &json!(delta)),
            UiEvent::ReasoningDelta { delta, .. } => Self::line('g', &json!(delta)),
            UiEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => Self::line('b', &json!({"toolCallId": tool_call_id, "toolName": tool_name})),
            UiEvent::ToolInputDelta {
                tool_call_id,
                delta,
            } => Self::line(
                'c',
                &json!({"toolCallId": tool_call_id, "argsTextDelta": delta}),
            ),
            UiEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => Self::line(
                '9',
                &json!({"toolCallId": tool_call_id, "toolName": tool_name, "args": input}),
            ),
            UiEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => Self::line('a', &json!({"toolCallId": tool_call_id, "result": output})),
            UiEvent::ToolOutputError {
                tool_call_id,
                error_text,
            } => Self::line(
                'a',
                &json!({"toolCallId": tool_call_id, "result": {"error": error_text}}),
            ),
            UiEvent::CustomData { payload } => {
                let data = match payload {
                    Value::Array(_) => payload.clone(),
                    other => Value::Array(vec![other.clone()]),
                };
                Self::line('2', &data)
            }
            UiEvent::Error { error_text } => Self::line('3', &json!(error_text)),
            UiEvent::MessageMetadata { message_metadata } => {
                Self::line('8', &json!([message_metadata]))
            }
            UiEvent::SourceUrl {
                source_id,
                url,
                title,
            } => Self::line(
                'h',
                &json!({
                    "sourceType": "url",
                    "id": source_id,
                    "url": url,
                    "title": title.as_deref().unwrap_or_default(),
                }),
            ),
            UiEvent::File { url, media_type } => {
                Self::line('k', &json!({"data": url, "mimeType": media_type}))
            }
            UiEvent::TextStart { .. }
            | UiEvent::TextEnd { .. }
            | UiEvent::ReasoningStart { .. }
            | UiEvent::ReasoningEnd { .. }
            | UiEvent::SourceDocument { .. }
            | UiEvent::Abort { .. } => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<String> {
        if self.finished {
            Vec::new()
        } else {
            self.finished = true;
            vec![DEFAULT_FINISH.to_owned()]
        }
    }
}
