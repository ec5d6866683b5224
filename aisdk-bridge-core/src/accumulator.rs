//! Message accumulation by history replay.
//!
//! The accumulator records every normalized event it sees and derives the
//! [`Message`] in a single linear pass when asked. Nothing is mutated in
//! place, so a message can be requested at any point mid-stream and the
//! same history always yields the same message.
//!
//! ```rust
//! use aisdk_bridge_core::{MessageAccumulator, UiEvent};
//!
//! let mut acc = MessageAccumulator::new("msg_1");
//! acc.push(UiEvent::StepStart);
//! acc.push(UiEvent::text_start("t1"));
//! acc.push(UiEvent::text_delta("t1", "Hello "));
//! acc.push(UiEvent::text_delta("t1", "world"));
//! acc.push(UiEvent::text_end("t1"));
//!
//! let msg = acc.build();
//! assert_eq!(msg.content, "Hello world");
//! assert_eq!(msg.texts().collect::<Vec<_>>(), vec!["Hello world"]);
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::events::{FinishReason, UiEvent};
use crate::identifier::now_utc;
use crate::message::{
    Message, MessagePart, Source, SourceType, ToolInvocation, ToolInvocationState,
};
use crate::usage::Usage;

/// Summary of one finished step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary {
    /// Zero-based step index.
    pub index: u32,
    /// Why the step finished.
    pub finish_reason: FinishReason,
    /// Usage reported for the step.
    pub usage: Usage,
}

/// Records normalized events and replays them into a [`Message`].
#[derive(Debug, Clone)]
pub struct MessageAccumulator {
    message_id: String,
    created_at: DateTime<Utc>,
    history: Vec<UiEvent>,
}

impl MessageAccumulator {
    /// Create an empty accumulator for a message id.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            created_at: now_utc(),
            history: Vec::new(),
        }
    }

    /// Build an accumulator from an existing history.
    pub fn from_history(
        message_id: impl Into<String>,
        history: impl IntoIterator<Item = UiEvent>,
    ) -> Self {
        let mut acc = Self::new(message_id);
        acc.extend(history);
        acc
    }

    /// Record one event.
    pub fn push(&mut self, event: UiEvent) {
        self.history.push(event);
    }

    /// Record several events.
    pub fn extend(&mut self, events: impl IntoIterator<Item = UiEvent>) {
        self.history.extend(events);
    }

    /// The recorded history.
    pub fn history(&self) -> &[UiEvent] {
        &self.history
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether nothing was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Message id used when the history carries no stream start.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Steps finished so far.
    pub fn steps(&self) -> Vec<StepSummary> {
        self.history
            .iter()
            .filter_map(|event| match event {
                UiEvent::StepFinish {
                    finish_reason,
                    usage,
                    ..
                } => Some((*finish_reason, *usage)),
                _ => None,
            })
            .enumerate()
            .map(|(index, (finish_reason, usage))| StepSummary {
                index: index as u32,
                finish_reason,
                usage,
            })
            .collect()
    }

    /// Finish reason and usage of the last stream finish, if recorded.
    pub fn finish(&self) -> Option<(FinishReason, Option<Usage>)> {
        self.history.iter().rev().find_map(|event| match event {
            UiEvent::StreamFinish {
                finish_reason,
                usage,
            } => Some((*finish_reason, *usage)),
            _ => None,
        })
    }

    /// Replay the history into a message.
    ///
    /// Blank text parts are removed; everything else is kept in the order
    /// its closing event was recorded.
    #[must_use]
    pub fn build(&self) -> Message {
        let mut message = self.replay();
        message.parts.retain(|part| !part.is_blank_text());
        message
    }

    fn replay(&self) -> Message {
        let mut message = Message::new(self.message_id.clone());
        message.created_at = self.created_at;

        let mut text_runs: HashMap<&str, String> = HashMap::new();
        let mut reasoning_runs: HashMap<&str, String> = HashMap::new();
        let mut tool_steps: HashMap<&str, u32> = HashMap::new();
        let mut tool_parts: HashMap<&str, usize> = HashMap::new();
        let mut steps_finished: u32 = 0;

        for event in &self.history {
            match event {
                UiEvent::StreamStart { message_id } => {
                    message.id.clone_from(message_id);
                }
                UiEvent::StepStart => {
                    if !matches!(message.parts.last(), Some(MessagePart::StepStart)) {
                        message.parts.push(MessagePart::StepStart);
                    }
                }
                UiEvent::StepFinish { .. } => steps_finished += 1,
                UiEvent::TextDelta { id, delta } => {
                    message.content.push_str(delta);
                    text_runs.entry(id.as_str()).or_default().push_str(delta);
                }
                UiEvent::TextEnd { id, text } => {
                    let run = text_runs
                        .remove(id.as_str())
                        .filter(|t| !t.is_empty())
                        .or_else(|| text.clone())
                        .unwrap_or_default();
                    message.parts.push(MessagePart::Text { text: run });
                }
                UiEvent::ReasoningDelta { id, delta } => {
                    reasoning_runs.entry(id.as_str()).or_default().push_str(delta);
                }
                UiEvent::ReasoningEnd { id } => {
                    if let Some(reasoning) = reasoning_runs.remove(id.as_str()) {
                        if !reasoning.is_empty() {
                            message.parts.push(MessagePart::Reasoning { reasoning });
                        }
                    }
                }
                UiEvent::ToolInputStart { tool_call_id, .. } => {
                    tool_steps.entry(tool_call_id.as_str()).or_insert(steps_finished);
                }
                UiEvent::ToolInputAvailable {
                    tool_call_id,
                    tool_name,
                    input,
                } => {
                    if tool_parts.contains_key(tool_call_id.as_str()) {
                        continue;
                    }
                    let step = tool_steps
                        .get(tool_call_id.as_str())
                        .copied()
                        .unwrap_or(steps_finished);
                    tool_parts.insert(tool_call_id.as_str(), message.parts.len());
                    message.parts.push(MessagePart::ToolInvocation {
                        tool_invocation: ToolInvocation {
                            state: ToolInvocationState::Call,
                            step,
                            tool_call_id: tool_call_id.clone(),
                            tool_name: tool_name.clone(),
                            args: input.clone(),
                            result: None,
                            error_text: None,
                        },
                    });
                }
                UiEvent::ToolOutputAvailable {
                    tool_call_id,
                    output,
                } => {
                    if let Some(invocation) = tool_part_mut(&mut message, &tool_parts, tool_call_id)
                    {
                        invocation.state = ToolInvocationState::Result;
                        invocation.result = Some(output.clone());
                    }
                }
                UiEvent::ToolOutputError {
                    tool_call_id,
                    error_text,
                } => {
                    if let Some(invocation) = tool_part_mut(&mut message, &tool_parts, tool_call_id)
                    {
                        invocation.state = ToolInvocationState::Error;
                        invocation.error_text = Some(error_text.clone());
                    }
                }
                UiEvent::SourceUrl {
                    source_id,
                    url,
                    title,
                } => message.parts.push(MessagePart::Source {
                    source: Source {
                        source_type: SourceType::Url,
                        id: source_id.clone(),
                        url: Some(url.clone()),
                        title: title.clone(),
                        media_type: None,
                    },
                }),
                UiEvent::SourceDocument {
                    source_id,
                    media_type,
                    title,
                    ..
                } => message.parts.push(MessagePart::Source {
                    source: Source {
                        source_type: SourceType::Document,
                        id: source_id.clone(),
                        url: None,
                        title: Some(title.clone()),
                        media_type: Some(media_type.clone()),
                    },
                }),
                UiEvent::File { url, media_type } => message.parts.push(MessagePart::File {
                    url: url.clone(),
                    media_type: media_type.clone(),
                }),
                UiEvent::Error { error_text } => message.parts.push(MessagePart::Error {
                    error_text: error_text.clone(),
                }),
                UiEvent::StreamFinish { .. }
                | UiEvent::TextStart { .. }
                | UiEvent::ReasoningStart { .. }
                | UiEvent::ToolInputDelta { .. }
                | UiEvent::CustomData { .. }
                | UiEvent::Abort { .. }
                | UiEvent::MessageMetadata { .. } => {}
            }
        }

        message
    }
}

fn tool_part_mut<'m>(
    message: &'m mut Message,
    index: &HashMap<&str, usize>,
    tool_call_id: &str,
) -> Option<&'m mut ToolInvocation> {
    let position = *index.get(tool_call_id)?;
    match message.parts.get_mut(position)? {
        MessagePart::ToolInvocation { tool_invocation } => Some(tool_invocation),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn weather_history() -> Vec<UiEvent> {
        vec![
            UiEvent::stream_start("msg_w"),
            UiEvent::StepStart,
            UiEvent::text_start("t1"),
            UiEvent::text_delta("t1", "Checking weather..."),
            UiEvent::text_end("t1"),
            UiEvent::tool_input_start("call_1", "get_weather"),
            UiEvent::tool_input_delta("call_1", r#"{"city":"Tokyo"}"#),
            UiEvent::tool_input_available("call_1", "get_weather", json!({"city": "Tokyo"})),
            UiEvent::tool_output_available("call_1", json!("Sunny, 22°C")),
            UiEvent::step_finish(FinishReason::ToolCalls, Usage::new(10, 5)),
            UiEvent::StepStart,
            UiEvent::text_start("t2"),
            UiEvent::text_delta("t2", "It is sunny."),
            UiEvent::text_end("t2"),
            UiEvent::step_finish(FinishReason::Stop, Usage::new(20, 4)),
            UiEvent::stream_finish(FinishReason::Stop, Some(Usage::new(30, 9))),
        ]
    }

    #[test]
    fn test_replay_weather_session() {
        let acc = MessageAccumulator::from_history("ignored", weather_history());
        let msg = acc.build();

        assert_eq!(msg.id, "msg_w");
        assert_eq!(msg.content, "Checking weather...It is sunny.");
        assert_eq!(msg.parts.len(), 5);
        assert_eq!(msg.parts[0], MessagePart::StepStart);
        assert_eq!(msg.parts[1].as_text(), Some("Checking weather..."));

        let tool = msg.parts[2].as_tool_invocation().unwrap();
        assert_eq!(tool.state, ToolInvocationState::Result);
        assert_eq!(tool.step, 0);
        assert_eq!(tool.args, json!({"city": "Tokyo"}));
        assert_eq!(tool.result, Some(json!("Sunny, 22°C")));

        assert_eq!(msg.parts[3], MessagePart::StepStart);
        assert_eq!(msg.parts[4].as_text(), Some("It is sunny."));
    }

    #[test]
    fn test_tool_step_counts_prior_boundaries() {
        let mut history = weather_history();
        history.pop();
        history.extend([
            UiEvent::StepStart,
            UiEvent::tool_input_start("call_2", "lookup"),
            UiEvent::tool_input_available("call_2", "lookup", json!({})),
        ]);
        let msg = MessageAccumulator::from_history("m", history).build();
        let tools: Vec<_> = msg.tool_invocations().collect();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1].step, 2);
        assert_eq!(tools[1].state, ToolInvocationState::Call);
    }

    #[test]
    fn test_output_without_input_is_dropped() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::StepStart,
                UiEvent::tool_output_available("call_x", json!(1)),
            ],
        );
        let msg = acc.build();
        assert_eq!(msg.tool_invocations().count(), 0);
        assert_eq!(msg.parts, vec![MessagePart::StepStart]);
    }

    #[test]
    fn test_tool_error_state() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::tool_input_start("c", "search"),
                UiEvent::tool_input_available("c", "search", json!({"q": "x"})),
                UiEvent::tool_output_error("c", "timeout"),
            ],
        );
        let msg = acc.build();
        let tool = msg.tool_invocations().next().unwrap();
        assert_eq!(tool.state, ToolInvocationState::Error);
        assert_eq!(tool.error_text.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_interleaved_runs_do_not_mix() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::text_start("a"),
                UiEvent::text_start("b"),
                UiEvent::text_delta("a", "A1"),
                UiEvent::text_delta("b", "B1"),
                UiEvent::text_delta("a", "A2"),
                UiEvent::text_end("b"),
                UiEvent::text_end("a"),
            ],
        );
        let msg = acc.build();
        assert_eq!(msg.texts().collect::<Vec<_>>(), vec!["B1", "A1A2"]);
        assert_eq!(msg.content, "A1B1A2");
    }

    #[test]
    fn test_blank_text_parts_are_filtered() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::text_start("a"),
                UiEvent::text_delta("a", "  \n"),
                UiEvent::text_end("a"),
                UiEvent::text_start("b"),
                UiEvent::text_end("b"),
                UiEvent::text_start("c"),
                UiEvent::text_delta("c", "ok"),
                UiEvent::text_end("c"),
            ],
        );
        let msg = acc.build();
        assert!(msg.parts.iter().all(|p| !p.is_blank_text()));
        assert_eq!(msg.texts().collect::<Vec<_>>(), vec!["ok"]);
        assert_eq!(msg.content, "  \nok");
    }

    #[test]
    fn test_text_end_fallback() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::text_start("a"),
                UiEvent::TextEnd {
                    id: "a".into(),
                    text: Some("whole".into()),
                },
            ],
        );
        assert_eq!(acc.build().texts().collect::<Vec<_>>(), vec!["whole"]);
    }

    #[test]
    fn test_adjacent_step_markers_collapse() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![UiEvent::StepStart, UiEvent::StepStart],
        );
        assert_eq!(acc.build().parts, vec![MessagePart::StepStart]);
    }

    #[test]
    fn test_reasoning_and_sources() {
        let acc = MessageAccumulator::from_history(
            "m",
            vec![
                UiEvent::reasoning_start("r"),
                UiEvent::reasoning_delta("r", "think"),
                UiEvent::reasoning_end("r"),
                UiEvent::SourceUrl {
                    source_id: "s1".into(),
                    url: "https://example.com".into(),
                    title: None,
                },
                UiEvent::file("https://example.com/a.png", "image/png"),
                UiEvent::error("oops"),
            ],
        );
        let msg = acc.build();
        assert_eq!(
            msg.parts[0],
            MessagePart::Reasoning {
                reasoning: "think".into()
            }
        );
        assert!(matches!(&msg.parts[1], MessagePart::Source { source } if source.source_type == SourceType::Url));
        assert!(matches!(&msg.parts[2], MessagePart::File { .. }));
        assert!(matches!(&msg.parts[3], MessagePart::Error { .. }));
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let acc = MessageAccumulator::from_history("m", weather_history());
        assert_eq!(acc.build(), acc.build());

        let other = MessageAccumulator::from_history("m", weather_history());
        assert_eq!(acc.build().parts, other.build().parts);
        assert_eq!(acc.build().content, other.build().content);
    }

    #[test]
    fn test_steps_and_finish() {
        let acc = MessageAccumulator::from_history("m", weather_history());
        let steps = acc.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].finish_reason, FinishReason::ToolCalls);
        assert_eq!(steps[1].index, 1);
        assert_eq!(
            acc.finish(),
            Some((FinishReason::Stop, Some(Usage::new(30, 9))))
        );
    }
}
