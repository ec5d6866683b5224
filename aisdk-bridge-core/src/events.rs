//! Normalized UI stream events.
//!
//! [`UiEvent`] is the single currency between the transcoder, the message
//! accumulator, the manual emitter and the wire encoders. Its serde form is
//! the AI SDK UI message stream chunk: an object with a `type` tag and
//! camelCase fields.
//!
//! ```rust
//! use aisdk_bridge_core::UiEvent;
//!
//! let event = UiEvent::text_delta("txt_1", "Hello");
//! assert_eq!(event.event_type(), "text-delta");
//! assert_eq!(
//!     event.to_json().unwrap(),
//!     r#"{"type":"text-delta","id":"txt_1","delta":"Hello"}"#
//! );
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Result;
use crate::usage::Usage;

/// Reason a step or stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Normal stop (end of response).
    Stop,
    /// Maximum token length reached.
    Length,
    /// Content filter triggered.
    ContentFilter,
    /// The step ended because tools were called.
    ToolCalls,
    /// Error occurred.
    Error,
    /// Other/custom reason.
    Other,
    /// Unknown reason.
    #[default]
    Unknown,
}

impl FinishReason {
    /// Wire name of the reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ContentFilter => "content-filter",
            Self::ToolCalls => "tool-calls",
            Self::Error => "error",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized output event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UiEvent {
    /// Start of the message stream.
    #[serde(rename = "start", rename_all = "camelCase")]
    StreamStart {
        /// Id of the message being streamed.
        message_id: String,
    },

    /// End of the message stream.
    #[serde(rename = "finish", rename_all = "camelCase")]
    StreamFinish {
        /// Why the stream ended.
        finish_reason: FinishReason,
        /// Usage accumulated over the whole stream.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// Start of a step.
    #[serde(rename = "start-step")]
    StepStart,

    /// End of a step.
    #[serde(rename = "finish-step", rename_all = "camelCase")]
    StepFinish {
        /// Why the step ended.
        finish_reason: FinishReason,
        /// Usage of the generations in this step.
        #[serde(default)]
        usage: Usage,
        /// Whether the next step continues this one.
        #[serde(default)]
        is_continued: bool,
    },

    /// Opens a text run.
    TextStart {
        /// Run id.
        id: String,
    },

    /// Incremental text for an open run.
    TextDelta {
        /// Run id.
        id: String,
        /// Text fragment.
        delta: String,
    },

    /// Closes a text run.
    TextEnd {
        /// Run id.
        id: String,
        /// Full run text, when the producer already knows it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    /// Opens a reasoning run.
    ReasoningStart {
        /// Run id.
        id: String,
    },

    /// Incremental reasoning text.
    ReasoningDelta {
        /// Run id.
        id: String,
        /// Reasoning fragment.
        delta: String,
    },

    /// Closes a reasoning run.
    ReasoningEnd {
        /// Run id.
        id: String,
    },

    /// A tool call started streaming its input.
    #[serde(rename_all = "camelCase")]
    ToolInputStart {
        /// Tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
    },

    /// Serialized input fragment for a tool call.
    #[serde(rename_all = "camelCase")]
    ToolInputDelta {
        /// Tool call id.
        tool_call_id: String,
        /// Input text fragment.
        #[serde(rename = "inputTextDelta")]
        delta: String,
    },

    /// The complete input of a tool call is known.
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        /// Tool call id.
        tool_call_id: String,
        /// Tool name.
        tool_name: String,
        /// Parsed tool input.
        input: Value,
    },

    /// A tool call produced output.
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        /// Tool call id.
        tool_call_id: String,
        /// Tool output.
        output: Value,
    },

    /// A tool call failed.
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        /// Tool call id.
        tool_call_id: String,
        /// Error description.
        error_text: String,
    },

    /// A URL source reference.
    #[serde(rename_all = "camelCase")]
    SourceUrl {
        /// Source id.
        source_id: String,
        /// Source URL.
        url: String,
        /// Optional title.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// A document source reference.
    #[serde(rename_all = "camelCase")]
    SourceDocument {
        /// Source id.
        source_id: String,
        /// Document media type.
        media_type: String,
        /// Document title.
        title: String,
        /// Optional file name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// A file attachment.
    #[serde(rename_all = "camelCase")]
    File {
        /// File URL (or data URL).
        url: String,
        /// IANA media type.
        media_type: String,
    },

    /// In-band error.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error description.
        error_text: String,
    },

    /// Application defined data.
    #[serde(rename = "data-custom")]
    CustomData {
        /// Arbitrary JSON payload.
        #[serde(rename = "data")]
        payload: Value,
    },

    /// The stream was aborted.
    Abort {
        /// Optional reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Metadata attached to the message.
    #[serde(rename_all = "camelCase")]
    MessageMetadata {
        /// Metadata object.
        message_metadata: Value,
    },
}

impl UiEvent {
    /// Create a stream start event.
    pub fn stream_start(message_id: impl Into<String>) -> Self {
        Self::StreamStart {
            message_id: message_id.into(),
        }
    }

    /// Create a stream finish event.
    pub fn stream_finish(finish_reason: FinishReason, usage: Option<Usage>) -> Self {
        Self::StreamFinish {
            finish_reason,
            usage,
        }
    }

    /// Create a step finish event.
    pub fn step_finish(finish_reason: FinishReason, usage: Usage) -> Self {
        Self::StepFinish {
            finish_reason,
            usage,
            is_continued: false,
        }
    }

    /// Create a text start event.
    pub fn text_start(id: impl Into<String>) -> Self {
        Self::TextStart { id: id.into() }
    }

    /// Create a text delta event.
    pub fn text_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    /// Create a text end event.
    pub fn text_end(id: impl Into<String>) -> Self {
        Self::TextEnd {
            id: id.into(),
            text: None,
        }
    }

    /// Create a reasoning start event.
    pub fn reasoning_start(id: impl Into<String>) -> Self {
        Self::ReasoningStart { id: id.into() }
    }

    /// Create a reasoning delta event.
    pub fn reasoning_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::ReasoningDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    /// Create a reasoning end event.
    pub fn reasoning_end(id: impl Into<String>) -> Self {
        Self::ReasoningEnd { id: id.into() }
    }

    /// Create a tool input start event.
    pub fn tool_input_start(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::ToolInputStart {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        }
    }

    /// Create a tool input delta event.
    pub fn tool_input_delta(tool_call_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::ToolInputDelta {
            tool_call_id: tool_call_id.into(),
            delta: delta.into(),
        }
    }

    /// Create a tool input available event.
    pub fn tool_input_available(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolInputAvailable {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    /// Create a tool output available event.
    pub fn tool_output_available(tool_call_id: impl Into<String>, output: Value) -> Self {
        Self::ToolOutputAvailable {
            tool_call_id: tool_call_id.into(),
            output,
        }
    }

    /// Create a tool output error event.
    pub fn tool_output_error(
        tool_call_id: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self::ToolOutputError {
            tool_call_id: tool_call_id.into(),
            error_text: error_text.into(),
        }
    }

    /// Create a URL source event with a fresh source id.
    pub fn source_url(url: impl Into<String>, title: Option<String>) -> Self {
        Self::SourceUrl {
            source_id: crate::identifier::generate_source_id(),
            url: url.into(),
            title,
        }
    }

    /// Create a file event.
    pub fn file(url: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self::File {
            url: url.into(),
            media_type: media_type.into(),
        }
    }

    /// Create an error event.
    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }

    /// Create a custom data event.
    pub fn custom_data(payload: Value) -> Self {
        Self::CustomData { payload }
    }

    /// The `type` tag of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "start",
            Self::StreamFinish { .. } => "finish",
            Self::StepStart => "start-step",
            Self::StepFinish { .. } => "finish-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputDelta { .. } => "tool-input-delta",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::SourceUrl { .. } => "source-url",
            Self::SourceDocument { .. } => "source-document",
            Self::File { .. } => "file",
            Self::Error { .. } => "error",
            Self::CustomData { .. } => "data-custom",
            Self::Abort { .. } => "abort",
            Self::MessageMetadata { .. } => "message-metadata",
        }
    }

    /// Whether this event belongs to a text run.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Self::TextStart { .. } | Self::TextDelta { .. } | Self::TextEnd { .. }
        )
    }

    /// Tool call id, for tool lifecycle events.
    #[must_use]
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolInputStart { tool_call_id, .. }
            | Self::ToolInputDelta { tool_call_id, .. }
            | Self::ToolInputAvailable { tool_call_id, .. }
            | Self::ToolOutputAvailable { tool_call_id, .. }
            | Self::ToolOutputError { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamFinish { .. } | Self::Abort { .. })
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(UiEvent::stream_start("msg_1"), json!({"type": "start", "messageId": "msg_1"}))]
    #[case(UiEvent::StepStart, json!({"type": "start-step"}))]
    #[case(
        UiEvent::step_finish(FinishReason::ToolCalls, Usage::new(3, 4)),
        json!({
            "type": "finish-step",
            "finishReason": "tool-calls",
            "usage": {"promptTokens": 3, "completionTokens": 4},
            "isContinued": false
        })
    )]
    #[case(
        UiEvent::stream_finish(FinishReason::Stop, None),
        json!({"type": "finish", "finishReason": "stop"})
    )]
    #[case(
        UiEvent::tool_input_delta("call_1", "{\"a\":1}"),
        json!({"type": "tool-input-delta", "toolCallId": "call_1", "inputTextDelta": "{\"a\":1}"})
    )]
    #[case(
        UiEvent::tool_output_error("call_1", "boom"),
        json!({"type": "tool-output-error", "toolCallId": "call_1", "errorText": "boom"})
    )]
    #[case(
        UiEvent::custom_data(json!({"k": 1})),
        json!({"type": "data-custom", "data": {"k": 1}})
    )]
    #[case(UiEvent::Abort { reason: None }, json!({"type": "abort"}))]
    fn test_wire_shape(#[case] event: UiEvent, #[case] expected: Value) {
        assert_eq!(serde_json::to_value(&event).unwrap(), expected);
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let events = vec![
            UiEvent::text_start("t"),
            UiEvent::reasoning_delta("r", "x"),
            UiEvent::tool_input_available("c", "n", json!({})),
            UiEvent::file("data:,", "text/plain"),
            UiEvent::MessageMetadata {
                message_metadata: json!({}),
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn test_from_json() {
        let event =
            UiEvent::from_json(r#"{"type":"text-end","id":"txt_1","text":"hi"}"#).unwrap();
        assert_eq!(
            event,
            UiEvent::TextEnd {
                id: "txt_1".into(),
                text: Some("hi".into())
            }
        );
        assert!(UiEvent::from_json(r#"{"type":"nope"}"#).is_err());
    }

    #[test]
    fn test_tool_call_id() {
        assert_eq!(
            UiEvent::tool_output_available("call_9", json!(1)).tool_call_id(),
            Some("call_9")
        );
        assert_eq!(UiEvent::StepStart.tool_call_id(), None);
    }

    #[test]
    fn test_finish_reason_display() {
        assert_eq!(FinishReason::ToolCalls.to_string(), "tool-calls");
        assert_eq!(FinishReason::default(), FinishReason::Unknown);
    }
}
