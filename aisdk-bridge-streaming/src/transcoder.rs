//! The transcoding state machine.
//!
//! [`Transcoder`] turns upstream items into normalized [`UiEvent`]s one item
//! at a time. It reconciles three lifecycles that interleave freely in the
//! input:
//!
//! - **Steps**: opened by a generation start (or by content arriving outside
//!   a step), closed once the generation is complete and every tool call
//!   started in the step has produced output.
//! - **Text and reasoning runs**: at most one of each open at a time, each
//!   with a fresh id.
//! - **Tool calls**: accepted either as direct start/end events or as
//!   retrospective intermediate-step records, deduplicated by call identity.
//!
//! The transcoder is synchronous and owns all of its state; a session drives
//! it from a single task.
//!
//! ```rust
//! use aisdk_bridge_streaming::{Transcoder, TranscoderConfig, UpstreamEvent};
//!
//! let mut transcoder = Transcoder::new("msg_1", TranscoderConfig::default().emit_lifecycle(false));
//! let mut events = transcoder.process(UpstreamEvent::GenerationStart);
//! events.extend(transcoder.process("Hello "));
//! events.extend(transcoder.process("world"));
//! events.extend(transcoder.process(UpstreamEvent::GenerationEnd { usage: None }));
//! events.extend(transcoder.finish());
//!
//! let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
//! assert_eq!(
//!     types,
//!     ["start-step", "text-start", "text-delta", "text-delta", "text-end", "finish-step"]
//! );
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use aisdk_bridge_core::identifier::{
    generate_reasoning_id, generate_text_id, generate_tool_call_id,
};
use aisdk_bridge_core::{FinishReason, UiEvent, Usage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::upstream::{IntermediateStep, ModelChunk, UpstreamEvent, UpstreamItem};

/// Transcoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Emit `start` and `finish` events around the stream.
    pub emit_lifecycle: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            emit_lifecycle: true,
        }
    }
}

impl TranscoderConfig {
    /// Set whether stream lifecycle events are emitted.
    #[must_use]
    pub fn emit_lifecycle(mut self, emit: bool) -> Self {
        self.emit_lifecycle = emit;
        self
    }
}

/// State of a tracked tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallState {
    /// Input emitted, waiting for output.
    Call,
    /// Output emitted.
    Result,
    /// Error emitted.
    Error,
}

#[derive(Debug, Clone)]
struct PendingToolCall {
    name: String,
    input: Value,
    state: ToolCallState,
}

/// Which ingestion path delivers model text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextSource {
    /// Token envelopes.
    Envelope,
    /// Raw model chunks without an envelope.
    Chunk,
}

/// Stateful upstream-to-[`UiEvent`] transcoder for one session.
#[derive(Debug)]
pub struct Transcoder {
    config: TranscoderConfig,
    message_id: String,
    started: bool,
    finished: bool,

    step_open: bool,
    step_count: u32,
    needs_new_step_for_text: bool,
    step_usage: Usage,
    last_finish_reason: Option<FinishReason>,

    text_id: Option<String>,
    reasoning_id: Option<String>,
    text_source: Option<TextSource>,

    generation_active: bool,
    generation_complete: bool,
    tools_in_cycle: usize,

    pending_tools: HashMap<String, PendingToolCall>,
    seen_calls: HashSet<String>,
    unmatched_direct: Vec<(String, Value)>,

    total_usage: Option<Usage>,
}

impl Transcoder {
    /// Create a transcoder for a message.
    pub fn new(message_id: impl Into<String>, config: TranscoderConfig) -> Self {
        Self {
            config,
            message_id: message_id.into(),
            started: false,
            finished: false,
            step_open: false,
            step_count: 0,
            needs_new_step_for_text: false,
            step_usage: Usage::default(),
            last_finish_reason: None,
            text_id: None,
            reasoning_id: None,
            text_source: None,
            generation_active: false,
            generation_complete: false,
            tools_in_cycle: 0,
            pending_tools: HashMap::new(),
            seen_calls: HashSet::new(),
            unmatched_direct: Vec::new(),
            total_usage: None,
        }
    }

    /// The message id announced in `start`.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Number of steps opened so far.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Whether a step is currently open.
    pub fn is_step_open(&self) -> bool {
        self.step_open
    }

    /// Whether [`finish`](Self::finish) has run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Tool calls whose output has not been seen.
    pub fn tools_in_flight(&self) -> usize {
        self.pending_tools
            .values()
            .filter(|t| t.state == ToolCallState::Call)
            .count()
    }

    /// State of a tracked tool call.
    pub fn tool_state(&self, tool_call_id: &str) -> Option<ToolCallState> {
        self.pending_tools.get(tool_call_id).map(|t| t.state)
    }

    /// Normalized input of a tracked tool call.
    pub fn tool_input(&self, tool_call_id: &str) -> Option<&Value> {
        self.pending_tools.get(tool_call_id).map(|t| &t.input)
    }

    /// Usage accumulated over all generations.
    pub fn usage(&self) -> Option<Usage> {
        self.total_usage
    }

    /// Emit the stream start event. Called implicitly by the first
    /// [`process`](Self::process).
    pub fn start(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        self.ensure_started(&mut out);
        out
    }

    /// Process one upstream item.
    pub fn process(&mut self, item: impl Into<UpstreamItem>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        if self.finished {
            warn!(message_id = %self.message_id, "item received after transcoder finished");
            return out;
        }
        self.ensure_started(&mut out);

        match item.into() {
            UpstreamItem::Text(text) => {
                if !text.is_empty() {
                    self.on_text(&text, &mut out);
                }
            }
            UpstreamItem::ModelChunk(chunk) => self.on_content(chunk, TextSource::Chunk, &mut out),
            UpstreamItem::Event(event) => self.on_event(event, &mut out),
            UpstreamItem::Unrecognized => trace!("skipping unrecognized upstream item"),
        }

        out
    }

    /// Close everything still open and emit the stream finish.
    pub fn finish(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);

        self.close_reasoning(&mut out);
        self.close_text(&mut out);
        if self.step_open {
            if self.tools_in_flight() > 0 {
                debug!(
                    in_flight = self.tools_in_flight(),
                    "closing step with tool calls still in flight"
                );
            }
            let reason = self.step_reason();
            self.close_step(reason, &mut out);
        }

        if self.config.emit_lifecycle {
            out.push(UiEvent::stream_finish(
                self.last_finish_reason.unwrap_or(FinishReason::Stop),
                self.total_usage,
            ));
        }
        self.finished = true;
        out
    }

    fn ensure_started(&mut self, out: &mut Vec<UiEvent>) {
        if self.started {
            return;
        }
        self.started = true;
        if self.config.emit_lifecycle {
            out.push(UiEvent::stream_start(self.message_id.clone()));
        }
    }

    fn on_event(&mut self, event: UpstreamEvent, out: &mut Vec<UiEvent>) {
        match event {
            UpstreamEvent::GenerationStart => self.on_generation_start(out),
            UpstreamEvent::GenerationToken(chunk) => {
                self.on_content(chunk, TextSource::Envelope, out)
            }
            UpstreamEvent::GenerationEnd { usage } => self.on_generation_end(usage, out),
            UpstreamEvent::ToolStart {
                run_id,
                name,
                input,
            } => self.on_tool_start(run_id, name, input, out),
            UpstreamEvent::ToolEnd {
                run_id,
                output,
                error,
            } => self.on_tool_end(run_id, output, error, out),
            UpstreamEvent::ChainStep { steps } | UpstreamEvent::ChainEnd { steps } => {
                self.on_intermediate_steps(steps, out)
            }
        }
    }

    fn on_generation_start(&mut self, out: &mut Vec<UiEvent>) {
        if self.step_open {
            if self.generation_complete && self.tools_in_flight() == 0 {
                let reason = self.step_reason();
                self.close_step(reason, out);
                self.open_step(out);
            } else if self.generation_active {
                trace!("nested generation start inside open step");
            }
        } else {
            self.open_step(out);
        }
        self.generation_active = true;
        self.generation_complete = false;
    }

    fn on_generation_end(&mut self, usage: Option<Usage>, out: &mut Vec<UiEvent>) {
        self.close_reasoning(out);
        self.close_text(out);

        if let Some(usage) = usage {
            self.step_usage += usage;
            *self.total_usage.get_or_insert_with(Usage::default) += usage;
        }

        self.generation_active = false;
        self.generation_complete = true;
    }

    fn on_content(&mut self, chunk: ModelChunk, source: TextSource, out: &mut Vec<UiEvent>) {
        if chunk.is_empty() {
            return;
        }
        match self.text_source {
            Some(locked) if locked != source => {
                trace!(?source, "ignoring content from secondary ingestion path");
                return;
            }
            Some(_) => {}
            None => self.text_source = Some(source),
        }

        if !chunk.reasoning.is_empty() {
            self.on_reasoning(&chunk.reasoning, out);
        }
        if !chunk.text.is_empty() {
            self.on_text(&chunk.text, out);
        }
    }

    fn on_text(&mut self, text: &str, out: &mut Vec<UiEvent>) {
        self.close_reasoning(out);
        self.ensure_step_for_content(out);

        let id = match &self.text_id {
            Some(id) => id.clone(),
            None => {
                let id = generate_text_id();
                out.push(UiEvent::text_start(id.clone()));
                self.text_id = Some(id.clone());
                id
            }
        };
        out.push(UiEvent::text_delta(id, text));
    }

    fn on_reasoning(&mut self, text: &str, out: &mut Vec<UiEvent>) {
        self.close_text(out);
        self.ensure_step_for_content(out);

        let id = match &self.reasoning_id {
            Some(id) => id.clone(),
            None => {
                let id = generate_reasoning_id();
                out.push(UiEvent::reasoning_start(id.clone()));
                self.reasoning_id = Some(id.clone());
                id
            }
        };
        out.push(UiEvent::reasoning_delta(id, text));
    }

    fn on_tool_start(
        &mut self,
        run_id: Option<String>,
        name: Option<String>,
        input: Value,
        out: &mut Vec<UiEvent>,
    ) {
        let Some(name) = name.filter(|n| !n.trim().is_empty()) else {
            debug!(run_id = ?run_id, "dropping tool start without a resolvable tool name");
            return;
        };
        let tool_call_id = run_id.unwrap_or_else(generate_tool_call_id);
        if !self.seen_calls.insert(tool_call_id.clone()) {
            debug!(%tool_call_id, "ignoring duplicate tool start");
            return;
        }

        let input = normalize_input(input);
        self.begin_tool_call(&tool_call_id, &name, &input, out);
        self.unmatched_direct.push((name.clone(), input.clone()));
        self.pending_tools.insert(
            tool_call_id,
            PendingToolCall {
                name,
                input,
                state: ToolCallState::Call,
            },
        );
    }

    fn on_tool_end(
        &mut self,
        run_id: Option<String>,
        output: Value,
        error: Option<String>,
        out: &mut Vec<UiEvent>,
    ) {
        let tool_call_id = match run_id {
            Some(id) => id,
            None => {
                let mut in_flight = self
                    .pending_tools
                    .iter()
                    .filter(|(_, t)| t.state == ToolCallState::Call);
                match (in_flight.next(), in_flight.next()) {
                    (Some((id, _)), None) => id.clone(),
                    _ => {
                        debug!("dropping tool end without a call id");
                        return;
                    }
                }
            }
        };

        let Some(tool) = self
            .pending_tools
            .get_mut(&tool_call_id)
            .filter(|t| t.state == ToolCallState::Call)
        else {
            debug!(%tool_call_id, "dropping tool end for unknown or completed call");
            return;
        };

        match error {
            Some(error_text) => {
                tool.state = ToolCallState::Error;
                out.push(UiEvent::tool_output_error(tool_call_id.clone(), error_text));
            }
            None => {
                tool.state = ToolCallState::Result;
                out.push(UiEvent::tool_output_available(tool_call_id.clone(), output));
            }
        }
        trace!(%tool_call_id, tool_name = %tool.name, "tool call completed");

        if self.step_open && self.generation_complete && self.tools_in_flight() == 0 {
            self.close_step_after_tools(out);
        }
    }

    fn on_intermediate_steps(&mut self, steps: Vec<IntermediateStep>, out: &mut Vec<UiEvent>) {
        let mut emitted = 0usize;

        for step in steps {
            let key = step
                .action
                .tool_call_id
                .clone()
                .unwrap_or_else(|| action_key(&step));
            if self.seen_calls.contains(&key) {
                continue;
            }

            let input = normalize_input(step.action.tool_input);
            if let Some(pos) = self
                .unmatched_direct
                .iter()
                .position(|(name, direct)| *name == step.action.tool && *direct == input)
            {
                // Same call already reported through direct tool events.
                self.unmatched_direct.remove(pos);
                self.seen_calls.insert(key);
                continue;
            }
            self.seen_calls.insert(key.clone());

            self.begin_tool_call(&key, &step.action.tool, &input, out);
            out.push(UiEvent::tool_output_available(key.clone(), step.observation));
            self.pending_tools.insert(
                key,
                PendingToolCall {
                    name: step.action.tool,
                    input,
                    state: ToolCallState::Result,
                },
            );
            emitted += 1;
        }

        if emitted > 0
            && self.step_open
            && self.generation_complete
            && self.tools_in_flight() == 0
        {
            self.close_step_after_tools(out);
        }
    }

    fn begin_tool_call(&mut self, id: &str, name: &str, input: &Value, out: &mut Vec<UiEvent>) {
        self.close_reasoning(out);
        self.close_text(out);
        if !self.step_open || self.needs_new_step_for_text {
            self.open_step(out);
        }

        out.push(UiEvent::tool_input_start(id, name));
        out.push(UiEvent::tool_input_delta(id, input.to_string()));
        out.push(UiEvent::tool_input_available(id, name, input.clone()));
        self.tools_in_cycle += 1;
    }

    fn ensure_step_for_content(&mut self, out: &mut Vec<UiEvent>) {
        if !self.step_open || self.needs_new_step_for_text {
            if self.step_open {
                let reason = self.step_reason();
                self.close_step(reason, out);
            }
            self.open_step(out);
        }
    }

    fn open_step(&mut self, out: &mut Vec<UiEvent>) {
        out.push(UiEvent::StepStart);
        self.step_open = true;
        self.step_count += 1;
        self.needs_new_step_for_text = false;
        self.tools_in_cycle = 0;
        self.step_usage = Usage::default();
    }

    fn close_step(&mut self, reason: FinishReason, out: &mut Vec<UiEvent>) {
        self.close_reasoning(out);
        self.close_text(out);
        out.push(UiEvent::step_finish(reason, self.step_usage));
        self.step_open = false;
        self.last_finish_reason = Some(reason);
        self.step_usage = Usage::default();
    }

    fn close_step_after_tools(&mut self, out: &mut Vec<UiEvent>) {
        self.close_step(FinishReason::ToolCalls, out);
        self.generation_complete = false;
        self.needs_new_step_for_text = true;
    }

    fn step_reason(&self) -> FinishReason {
        if self.tools_in_cycle > 0 {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        }
    }

    fn close_text(&mut self, out: &mut Vec<UiEvent>) {
        if let Some(id) = self.text_id.take() {
            out.push(UiEvent::text_end(id));
        }
    }

    fn close_reasoning(&mut self, out: &mut Vec<UiEvent>) {
        if let Some(id) = self.reasoning_id.take() {
            out.push(UiEvent::reasoning_end(id));
        }
    }
}

/// Tool inputs are always objects on the wire.
fn normalize_input(input: Value) -> Value {
    match input {
        Value::Object(_) => input,
        Value::Null => json!({}),
        Value::String(ref s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({ "input": input }),
        },
        other => json!({ "input": other }),
    }
}

/// Stable identity for an intermediate step without an explicit call id.
fn action_key(step: &IntermediateStep) -> String {
    let mut hasher = DefaultHasher::new();
    step.action.tool.hash(&mut hasher);
    step.action.tool_input.to_string().hash(&mut hasher);
    format!("tool_{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::collections::{HashMap, HashSet};

    fn transcoder() -> Transcoder {
        Transcoder::new("msg_test", TranscoderConfig::default().emit_lifecycle(false))
    }

    fn run(items: Vec<UpstreamItem>) -> Vec<UiEvent> {
        let mut t = transcoder();
        let mut out = Vec::new();
        for item in items {
            out.extend(t.process(item));
        }
        out.extend(t.finish());
        out
    }

    fn types(events: &[UiEvent]) -> Vec<&'static str> {
        events.iter().map(UiEvent::event_type).collect()
    }

    fn count(events: &[UiEvent], ty: &str) -> usize {
        events.iter().filter(|e| e.event_type() == ty).count()
    }

    fn start() -> UpstreamItem {
        UpstreamEvent::GenerationStart.into()
    }

    fn end() -> UpstreamItem {
        UpstreamEvent::GenerationEnd { usage: None }.into()
    }

    fn weather_session() -> Vec<UpstreamItem> {
        vec![
            start(),
            "Checking weather...".into(),
            end(),
            UpstreamEvent::tool_start("run-1", "get_weather", json!({"city": "Tokyo"})).into(),
            UpstreamEvent::tool_end("run-1", json!("Sunny, 22°C")).into(),
            start(),
            "It is sunny in Tokyo.".into(),
            UpstreamEvent::GenerationEnd {
                usage: Some(Usage::new(20, 6)),
            }
            .into(),
        ]
    }

    fn assert_well_formed(events: &[UiEvent]) {
        // Pairing.
        assert_eq!(count(events, "text-start"), count(events, "text-end"));
        assert_eq!(count(events, "reasoning-start"), count(events, "reasoning-end"));
        assert_eq!(count(events, "start-step"), count(events, "finish-step"));

        // Steps never nest; text runs live inside steps.
        let mut step_open = false;
        let mut text_open: Option<&str> = None;
        let mut text_ids = HashSet::new();
        let mut outputs: HashMap<&str, usize> = HashMap::new();
        for event in events {
            match event {
                UiEvent::StepStart => {
                    assert!(!step_open, "step opened twice");
                    step_open = true;
                }
                UiEvent::StepFinish { .. } => {
                    assert!(step_open, "step finished while closed");
                    assert!(text_open.is_none(), "step finished with open text");
                    step_open = false;
                }
                UiEvent::TextStart { id } => {
                    assert!(step_open);
                    assert!(text_open.is_none());
                    assert!(text_ids.insert(id.as_str()), "text id reused");
                    text_open = Some(id);
                }
                UiEvent::TextDelta { id, .. } => assert_eq!(text_open, Some(id.as_str())),
                UiEvent::TextEnd { id, .. } => {
                    assert_eq!(text_open, Some(id.as_str()));
                    text_open = None;
                }
                UiEvent::ToolOutputAvailable { tool_call_id, .. }
                | UiEvent::ToolOutputError { tool_call_id, .. } => {
                    assert!(step_open, "tool output outside a step");
                    *outputs.entry(tool_call_id.as_str()).or_default() += 1;
                }
                _ => {}
            }
        }
        assert!(!step_open);
        assert!(outputs.values().all(|n| *n == 1));
    }

    #[test]
    fn test_basic_text_session() {
        let events = run(vec![start(), "Hello ".into(), "world".into(), end()]);
        assert_eq!(
            types(&events),
            vec!["start-step", "text-start", "text-delta", "text-delta", "text-end", "finish-step"]
        );

        let UiEvent::TextStart { id } = &events[1] else {
            panic!("expected text start");
        };
        assert_eq!(events[2], UiEvent::text_delta(id.clone(), "Hello "));
        assert_eq!(events[3], UiEvent::text_delta(id.clone(), "world"));
        assert_eq!(events[4], UiEvent::text_end(id.clone()));
        assert!(matches!(
            events[5],
            UiEvent::StepFinish {
                finish_reason: FinishReason::Stop,
                ..
            }
        ));
    }

    #[test]
    fn test_lifecycle_events() {
        let mut t = Transcoder::new("msg_1", TranscoderConfig::default());
        let mut events = t.start();
        events.extend(t.process(start()));
        events.extend(t.process("x"));
        events.extend(t.process(UpstreamEvent::GenerationEnd {
            usage: Some(Usage::new(5, 1)),
        }));
        events.extend(t.finish());

        assert_eq!(events.first(), Some(&UiEvent::stream_start("msg_1")));
        assert_eq!(
            events.last(),
            Some(&UiEvent::stream_finish(
                FinishReason::Stop,
                Some(Usage::new(5, 1))
            ))
        );
        assert_eq!(count(&events, "start"), 1);
        assert!(t.finish().is_empty());
        assert!(t.process("late").is_empty());
    }

    #[test]
    fn test_step_finish_waits_for_tool_output() {
        let events = run(weather_session());
        assert_well_formed(&events);

        let output_at = events
            .iter()
            .position(|e| matches!(e, UiEvent::ToolOutputAvailable { .. }))
            .unwrap();
        let first_finish_at = events
            .iter()
            .position(|e| matches!(e, UiEvent::StepFinish { .. }))
            .unwrap();
        assert!(first_finish_at > output_at);
        assert_eq!(
            events[first_finish_at],
            UiEvent::step_finish(FinishReason::ToolCalls, Usage::default())
        );
        assert_eq!(
            types(&events),
            vec![
                "start-step",
                "text-start",
                "text-delta",
                "text-end",
                "tool-input-start",
                "tool-input-delta",
                "tool-input-available",
                "tool-output-available",
                "finish-step",
                "start-step",
                "text-start",
                "text-delta",
                "text-end",
                "finish-step",
            ]
        );
        assert_eq!(
            events.last(),
            Some(&UiEvent::step_finish(FinishReason::Stop, Usage::new(20, 6)))
        );
    }

    #[test]
    fn test_tool_input_is_serialized_in_delta() {
        let events = run(weather_session());
        let delta = events
            .iter()
            .find_map(|e| match e {
                UiEvent::ToolInputDelta { delta, .. } => Some(delta.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&delta).unwrap(),
            json!({"city": "Tokyo"})
        );
    }

    #[test]
    fn test_two_tools_close_after_last_output() {
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::tool_start("a", "search", json!({"q": 1})).into(),
            UpstreamEvent::tool_start("b", "search", json!({"q": 2})).into(),
            UpstreamEvent::tool_end("a", json!("r1")).into(),
            UpstreamEvent::tool_end("b", json!("r2")).into(),
        ]);
        assert_well_formed(&events);
        let finish_at = events
            .iter()
            .position(|e| matches!(e, UiEvent::StepFinish { .. }))
            .unwrap();
        let last_output = events
            .iter()
            .rposition(|e| matches!(e, UiEvent::ToolOutputAvailable { .. }))
            .unwrap();
        assert_eq!(finish_at, last_output + 1);
        assert_eq!(count(&events, "finish-step"), 1);
    }

    #[test]
    fn test_intermediate_step_duplicates_emit_once() {
        let batch = || {
            vec![
                IntermediateStep::new("search", json!({"q": "a"}), json!("ra")).with_call_id("call_1"),
                IntermediateStep::new("calc", json!({"x": 1}), json!(1)).with_call_id("call_2"),
                IntermediateStep::new("search", json!({"q": "a"}), json!("ra")).with_call_id("call_1"),
            ]
        };
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::ChainStep { steps: batch() }.into(),
            UpstreamEvent::ChainEnd { steps: batch() }.into(),
        ]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "tool-input-start"), 2);
        assert_eq!(count(&events, "tool-output-available"), 2);

        let finish_at = events
            .iter()
            .position(|e| matches!(e, UiEvent::StepFinish { .. }))
            .unwrap();
        assert!(matches!(
            events[finish_at],
            UiEvent::StepFinish {
                finish_reason: FinishReason::ToolCalls,
                ..
            }
        ));
        assert_eq!(count(&events, "finish-step"), 1);
    }

    #[test]
    fn test_hashed_identity_dedupes_without_call_id() {
        let step = IntermediateStep::new("lookup", json!({"k": "v"}), json!("done"));
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::ChainStep {
                steps: vec![step.clone()],
            }
            .into(),
            UpstreamEvent::ChainEnd { steps: vec![step] }.into(),
        ]);
        assert_eq!(count(&events, "tool-input-start"), 1);
        let id = events.iter().find_map(UiEvent::tool_call_id).unwrap();
        assert!(id.starts_with("tool_"));
    }

    #[test]
    fn test_direct_and_batch_representations_dedupe() {
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::tool_start("run-uuid", "search", json!({"q": "x"})).into(),
            UpstreamEvent::tool_end("run-uuid", json!("found")).into(),
            UpstreamEvent::ChainEnd {
                steps: vec![IntermediateStep::new("search", json!({"q": "x"}), json!("found"))
                    .with_call_id("call_provider")],
            }
            .into(),
        ]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "tool-input-start"), 1);
        assert_eq!(count(&events, "tool-output-available"), 1);
    }

    #[test]
    fn test_duplicate_direct_start_is_ignored() {
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::tool_start("r", "t", json!({})).into(),
            UpstreamEvent::tool_start("r", "t", json!({})).into(),
            UpstreamEvent::tool_end("r", json!(1)).into(),
            UpstreamEvent::tool_end("r", json!(1)).into(),
        ]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "tool-input-start"), 1);
        assert_eq!(count(&events, "tool-output-available"), 1);
    }

    #[test]
    fn test_tool_start_without_name_is_dropped() {
        let events = run(vec![
            start(),
            "Let me check".into(),
            end(),
            UpstreamEvent::ToolStart {
                run_id: Some("r".into()),
                name: None,
                input: json!({"city": "Paris"}),
            }
            .into(),
            UpstreamEvent::tool_end("r", json!("ignored")).into(),
        ]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "tool-input-start"), 0);
        assert_eq!(count(&events, "tool-output-available"), 0);
        assert!(matches!(
            events.last(),
            Some(UiEvent::StepFinish {
                finish_reason: FinishReason::Stop,
                ..
            })
        ));
    }

    #[test]
    fn test_text_after_tool_step_gets_new_step_and_id() {
        let events = run(vec![
            start(),
            "before".into(),
            end(),
            UpstreamEvent::tool_start("r", "t", json!({})).into(),
            UpstreamEvent::tool_end("r", json!("ok")).into(),
            "after".into(),
        ]);
        assert_well_formed(&events);

        let ids: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::TextStart { id } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(count(&events, "start-step"), 2);
    }

    #[test]
    fn test_new_generation_closes_previous_step() {
        let events = run(vec![start(), "a".into(), end(), start(), "b".into(), end()]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "start-step"), 2);
    }

    #[test]
    fn test_generation_start_never_double_opens() {
        let events = run(vec![start(), start(), "a".into(), end()]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "start-step"), 1);
    }

    #[test]
    fn test_text_without_generation_opens_step() {
        let events = run(vec!["orphan".into()]);
        assert_eq!(
            types(&events),
            vec!["start-step", "text-start", "text-delta", "text-end", "finish-step"]
        );
    }

    #[test]
    fn test_single_ingestion_path() {
        let events = run(vec![
            start(),
            UpstreamEvent::token("Hi").into(),
            UpstreamItem::ModelChunk(ModelChunk::text("Hi")),
            UpstreamEvent::token(" there").into(),
            end(),
        ]);
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi there");
    }

    #[test]
    fn test_plain_strings_mix_with_envelope_tokens() {
        let events = run(vec![
            start(),
            UpstreamEvent::token("Hello ").into(),
            "world".into(),
            UpstreamItem::ModelChunk(ModelChunk::text("dup")),
            "!".into(),
            end(),
        ]);
        assert_well_formed(&events);
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello world!");
        assert_eq!(count(&events, "text-start"), 1);
    }

    #[test]
    fn test_chain_step_during_generation_keeps_step_open() {
        let events = run(vec![
            start(),
            UpstreamEvent::token("a").into(),
            UpstreamEvent::ChainStep {
                steps: vec![IntermediateStep::new("search", json!({"q": 1}), json!("r"))
                    .with_call_id("c1")],
            }
            .into(),
            UpstreamEvent::token("b").into(),
            UpstreamEvent::GenerationEnd {
                usage: Some(Usage::new(5, 5)),
            }
            .into(),
        ]);
        assert_well_formed(&events);
        assert_eq!(count(&events, "start-step"), 1);
        assert_eq!(count(&events, "finish-step"), 1);
        assert_eq!(
            events.last(),
            Some(&UiEvent::step_finish(FinishReason::ToolCalls, Usage::new(5, 5)))
        );
    }

    #[test]
    fn test_reasoning_run_closes_before_text() {
        let events = run(vec![
            start(),
            UpstreamEvent::GenerationToken(ModelChunk::reasoning("thinking")).into(),
            UpstreamEvent::token("answer").into(),
            end(),
        ]);
        assert_well_formed(&events);
        assert_eq!(
            types(&events),
            vec![
                "start-step",
                "reasoning-start",
                "reasoning-delta",
                "reasoning-end",
                "text-start",
                "text-delta",
                "text-end",
                "finish-step"
            ]
        );
    }

    #[test]
    fn test_tool_error_output() {
        let events = run(vec![
            start(),
            end(),
            UpstreamEvent::tool_start("r", "t", json!({})).into(),
            UpstreamEvent::ToolEnd {
                run_id: Some("r".into()),
                output: Value::Null,
                error: Some("boom".into()),
            }
            .into(),
        ]);
        assert_well_formed(&events);
        assert!(events.contains(&UiEvent::tool_output_error("r", "boom")));
        assert_eq!(count(&events, "finish-step"), 1);
    }

    #[test]
    fn test_tool_end_without_id_matches_single_in_flight_call() {
        let mut t = transcoder();
        t.process(start());
        t.process(end());
        t.process(UpstreamEvent::tool_start("only", "t", json!({})));
        let out = t.process(UpstreamEvent::ToolEnd {
            run_id: None,
            output: json!(1),
            error: None,
        });
        assert_eq!(out[0], UiEvent::tool_output_available("only", json!(1)));
        assert_eq!(t.tool_state("only"), Some(ToolCallState::Result));
        assert_eq!(t.tool_input("only"), Some(&json!({})));
        assert!(!t.is_step_open());
    }

    #[test]
    fn test_tool_in_flight_while_generation_active_defers_close() {
        let mut t = transcoder();
        t.process(start());
        t.process(UpstreamEvent::tool_start("r", "t", json!({})));
        let out = t.process(UpstreamEvent::tool_end("r", json!(1)));
        assert_eq!(types(&out), vec!["tool-output-available"]);
        assert!(t.is_step_open());

        t.process(end());
        let out = t.finish();
        assert_eq!(
            out,
            vec![UiEvent::step_finish(FinishReason::ToolCalls, Usage::default())]
        );
    }

    #[test]
    fn test_usage_per_step_and_total() {
        let mut t = Transcoder::new("m", TranscoderConfig::default());
        let mut events = Vec::new();
        for usage in [Usage::new(10, 2), Usage::new(7, 3)] {
            events.extend(t.process(start()));
            events.extend(t.process("x"));
            events.extend(t.process(UpstreamEvent::GenerationEnd { usage: Some(usage) }));
        }
        events.extend(t.finish());

        let step_usages: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::StepFinish { usage, .. } => Some(*usage),
                _ => None,
            })
            .collect();
        assert_eq!(step_usages, vec![Usage::new(10, 2), Usage::new(7, 3)]);
        assert_eq!(t.usage(), Some(Usage::new(17, 5)));
    }

    #[rstest]
    #[case(json!({"a": 1}), json!({"a": 1}))]
    #[case(Value::Null, json!({}))]
    #[case(json!("{\"a\":1}"), json!({"a": 1}))]
    #[case(json!("plain"), json!({"input": "plain"}))]
    #[case(json!([1, 2]), json!({"input": [1, 2]}))]
    fn test_normalize_input(#[case] raw: Value, #[case] expected: Value) {
        assert_eq!(normalize_input(raw), expected);
    }

    #[test]
    fn test_content_concatenation_matches_deltas() {
        let events = run(weather_session());
        let content: String = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(content, "Checking weather...It is sunny in Tokyo.");
    }
}
