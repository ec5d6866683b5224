//! Upstream items consumed by the transcoder.
//!
//! The agent framework feeding a session produces loosely typed items. They
//! are normalized into [`UpstreamItem`] at the ingestion boundary (see
//! [`crate::ingest`]) so the state machine only ever matches on this closed
//! set of shapes.

use aisdk_bridge_core::Usage;
use serde_json::Value;

/// Text and reasoning carried by one model token or raw model chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChunk {
    /// Visible text.
    pub text: String,
    /// Reasoning text.
    pub reasoning: String,
}

impl ModelChunk {
    /// A chunk holding only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: String::new(),
        }
    }

    /// A chunk holding only reasoning.
    pub fn reasoning(reasoning: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            reasoning: reasoning.into(),
        }
    }

    /// Whether the chunk carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.is_empty()
    }
}

/// The action half of an intermediate step record.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    /// Tool name.
    pub tool: String,
    /// Tool input.
    pub tool_input: Value,
    /// Call id, when the framework recorded one.
    pub tool_call_id: Option<String>,
}

/// A retrospective `(action, observation)` pair attached to a chain event.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateStep {
    /// What was called.
    pub action: AgentAction,
    /// What the tool returned.
    pub observation: Value,
}

impl IntermediateStep {
    /// Create a step record.
    pub fn new(tool: impl Into<String>, tool_input: Value, observation: Value) -> Self {
        Self {
            action: AgentAction {
                tool: tool.into(),
                tool_input,
                tool_call_id: None,
            },
            observation,
        }
    }

    /// Attach an explicit call id.
    #[must_use]
    pub fn with_call_id(mut self, id: impl Into<String>) -> Self {
        self.action.tool_call_id = Some(id.into());
        self
    }
}

/// A typed upstream event envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// A model generation began.
    GenerationStart,
    /// A streamed model token.
    GenerationToken(ModelChunk),
    /// A model generation ended.
    GenerationEnd {
        /// Usage reported for the generation.
        usage: Option<Usage>,
    },
    /// A tool began executing.
    ToolStart {
        /// Framework run id for the call.
        run_id: Option<String>,
        /// Resolved tool name; `None` when no candidate field held one.
        name: Option<String>,
        /// Tool input.
        input: Value,
    },
    /// A tool finished executing.
    ToolEnd {
        /// Framework run id for the call.
        run_id: Option<String>,
        /// Tool output.
        output: Value,
        /// Error text when the tool failed.
        error: Option<String>,
    },
    /// Intermediate steps streamed mid-chain.
    ChainStep {
        /// Step records.
        steps: Vec<IntermediateStep>,
    },
    /// Intermediate steps attached to the end of a chain.
    ChainEnd {
        /// Step records.
        steps: Vec<IntermediateStep>,
    },
}

impl UpstreamEvent {
    /// Tool start with a resolved name.
    pub fn tool_start(run_id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::ToolStart {
            run_id: Some(run_id.into()),
            name: Some(name.into()),
            input,
        }
    }

    /// Successful tool end.
    pub fn tool_end(run_id: impl Into<String>, output: Value) -> Self {
        Self::ToolEnd {
            run_id: Some(run_id.into()),
            output,
            error: None,
        }
    }

    /// Token carrying text.
    pub fn token(text: impl Into<String>) -> Self {
        Self::GenerationToken(ModelChunk::text(text))
    }
}

/// One item of the upstream sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamItem {
    /// A plain text token.
    Text(String),
    /// A typed event envelope.
    Event(UpstreamEvent),
    /// A raw model chunk that arrived without an envelope.
    ModelChunk(ModelChunk),
    /// Anything the ingestion layer could not classify.
    Unrecognized,
}

impl UpstreamItem {
    /// Classify a raw JSON item from an agent framework.
    pub fn from_value(value: &Value) -> Self {
        crate::ingest::normalize(value)
    }

    /// Whether the item was recognized.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl From<String> for UpstreamItem {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for UpstreamItem {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<UpstreamEvent> for UpstreamItem {
    fn from(event: UpstreamEvent) -> Self {
        Self::Event(event)
    }
}

impl From<ModelChunk> for UpstreamItem {
    fn from(chunk: ModelChunk) -> Self {
        Self::ModelChunk(chunk)
    }
}

impl From<Value> for UpstreamItem {
    fn from(value: Value) -> Self {
        Self::from_value(&value)
    }
}
