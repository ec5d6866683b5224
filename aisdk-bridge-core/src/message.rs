//! The structured assistant message built from a stream.
//!
//! Parts follow the AI SDK `UIMessage` layout so a finalized [`Message`] can
//! be handed straight to a client or persisted next to the conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The assistant.
    #[default]
    Assistant,
}

/// Lifecycle state of a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolInvocationState {
    /// Input is known, output is pending.
    Call,
    /// Output is available.
    Result,
    /// The tool failed.
    Error,
}

/// A tool call and, once known, its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Current state.
    pub state: ToolInvocationState,
    /// Index of the step the call began in.
    pub step: u32,
    /// Tool call id.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool input.
    pub args: Value,
    /// Tool output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text, when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// Kind of a source reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A web URL.
    Url,
    /// A document.
    Document,
}

/// A source reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Kind of source.
    pub source_type: SourceType,
    /// Source id.
    pub id: String,
    /// URL for URL sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Title, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Media type for document sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// One content block of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    /// A closed text run.
    Text {
        /// Run text.
        text: String,
    },
    /// A closed reasoning run.
    Reasoning {
        /// Reasoning text.
        reasoning: String,
    },
    /// A tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolInvocation {
        /// Invocation details.
        tool_invocation: ToolInvocation,
    },
    /// Step boundary marker.
    StepStart,
    /// Source reference.
    Source {
        /// Source details.
        source: Source,
    },
    /// File attachment.
    #[serde(rename_all = "camelCase")]
    File {
        /// File URL.
        url: String,
        /// Media type.
        media_type: String,
    },
    /// In-band error.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error description.
        error_text: String,
    },
}

impl MessagePart {
    /// Text of a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Invocation of a tool part.
    #[must_use]
    pub fn as_tool_invocation(&self) -> Option<&ToolInvocation> {
        match self {
            Self::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        }
    }

    /// Whether this is a text part with no visible content.
    #[must_use]
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text { text } if text.trim().is_empty())
    }
}

/// An assistant message accumulated from a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// All text deltas, concatenated in arrival order.
    pub content: String,
    /// Ordered content blocks.
    pub parts: Vec<MessagePart>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create an empty assistant message.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: String::new(),
            parts: Vec::new(),
            created_at: crate::identifier::now_utc(),
        }
    }

    /// Iterate over tool invocations in order.
    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(MessagePart::as_tool_invocation)
    }

    /// Iterate over text parts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(MessagePart::as_text)
    }

    /// Number of step markers.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, MessagePart::StepStart))
            .count()
    }

    /// Whether the message carries no content at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.parts.is_empty()
    }
}
