//! Normalization of raw upstream JSON into [`UpstreamItem`]s.
//!
//! Agent frameworks are not stable about where they place fields, so this
//! layer checks several candidate locations for each value. It accepts the
//! LangChain `astream_events` vocabulary (`on_chat_model_stream`,
//! `on_tool_start`, ...) as well as the canonical names
//! (`generation-start`, `tool-end`, `chain-step`, ...).
//!
//! Nothing here fails: an item that cannot be classified becomes
//! [`UpstreamItem::Unrecognized`] and is skipped by the transcoder.

use aisdk_bridge_core::Usage;
use serde_json::{Map, Value};

use crate::upstream::{AgentAction, IntermediateStep, ModelChunk, UpstreamEvent, UpstreamItem};

/// Normalize one raw upstream value.
///
/// ```rust
/// use aisdk_bridge_streaming::ingest::normalize;
/// use aisdk_bridge_streaming::{UpstreamEvent, UpstreamItem};
/// use serde_json::json;
///
/// let item = normalize(&json!({
///     "event": "on_tool_start",
///     "name": "get_weather",
///     "run_id": "run-1",
///     "data": {"input": {"city": "Tokyo"}}
/// }));
/// assert_eq!(
///     item,
///     UpstreamItem::Event(UpstreamEvent::tool_start("run-1", "get_weather", json!({"city": "Tokyo"})))
/// );
/// ```
pub fn normalize(value: &Value) -> UpstreamItem {
    match value {
        Value::String(text) => UpstreamItem::Text(text.clone()),
        Value::Object(map) => match map.get("event").and_then(Value::as_str) {
            Some(name) => normalize_envelope(name, map),
            None if map.contains_key("content") || map.contains_key("additional_kwargs") => {
                UpstreamItem::ModelChunk(extract_chunk(value))
            }
            None => UpstreamItem::Unrecognized,
        },
        _ => UpstreamItem::Unrecognized,
    }
}

fn normalize_envelope(name: &str, envelope: &Map<String, Value>) -> UpstreamItem {
    let empty = Value::Object(Map::new());
    let data = envelope.get("data").unwrap_or(&empty);

    let event = match name {
        "on_chat_model_start" | "on_llm_start" | "generation-start" => {
            UpstreamEvent::GenerationStart
        }
        "on_chat_model_stream" | "on_llm_stream" | "generation-token" => {
            UpstreamEvent::GenerationToken(token_chunk(data))
        }
        "on_chat_model_end" | "on_llm_end" | "generation-end" => UpstreamEvent::GenerationEnd {
            usage: extract_usage(data),
        },
        "on_tool_start" | "tool-start" => UpstreamEvent::ToolStart {
            run_id: run_id(envelope, data),
            name: tool_name(envelope, data),
            input: first_of(data, &["input", "inputs", "arguments", "args"])
                .cloned()
                .unwrap_or(Value::Null),
        },
        "on_tool_end" | "tool-end" => UpstreamEvent::ToolEnd {
            run_id: run_id(envelope, data),
            output: tool_output(data),
            error: data.get("error").map(error_text),
        },
        "on_tool_error" | "tool-error" => UpstreamEvent::ToolEnd {
            run_id: run_id(envelope, data),
            output: Value::Null,
            error: Some(
                data.get("error")
                    .map(error_text)
                    .unwrap_or_else(|| "Tool execution failed".to_owned()),
            ),
        },
        "on_chain_stream" | "chain-step" => UpstreamEvent::ChainStep {
            steps: first_steps(data, &[&["chunk"], &[], &["output"]]),
        },
        "on_chain_end" | "chain-end" => UpstreamEvent::ChainEnd {
            steps: first_steps(data, &[&["input"], &["output"], &[]]),
        },
        _ => return UpstreamItem::Unrecognized,
    };

    UpstreamItem::Event(event)
}

fn first_of<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find(|v| !v.is_null())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn run_id(envelope: &Map<String, Value>, data: &Value) -> Option<String> {
    let candidates = [
        envelope.get("run_id"),
        data.get("run_id"),
        data.get("tool_call_id"),
        data.get("id"),
    ];
    candidates.into_iter().find_map(|v| match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn tool_name(envelope: &Map<String, Value>, data: &Value) -> Option<String> {
    let serialized = data.get("serialized");
    let serialized_id_tail = serialized
        .and_then(|s| s.get("id"))
        .and_then(Value::as_array)
        .and_then(|ids| ids.last());

    [
        envelope.get("name"),
        data.get("name"),
        data.get("tool_name"),
        data.get("tool"),
        serialized.and_then(|s| s.get("name")),
        serialized_id_tail,
        data.get("metadata").and_then(|m| m.get("name")),
        serialized
            .and_then(|s| s.get("kwargs"))
            .and_then(|k| k.get("name")),
    ]
    .into_iter()
    .find_map(non_empty_str)
}

fn tool_output(data: &Value) -> Value {
    let Some(output) = first_of(data, &["output", "outputs", "result"]) else {
        return Value::Null;
    };
    // Tool messages wrap the payload in `content`.
    match output {
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("tool") => {
            map.get("content").cloned().unwrap_or(Value::Null)
        }
        other => other.clone(),
    }
}

fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => non_empty_str(map.get("message"))
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

fn token_chunk(data: &Value) -> ModelChunk {
    match data.get("chunk") {
        Some(Value::String(text)) => ModelChunk::text(text.clone()),
        Some(chunk @ Value::Object(map)) if map.contains_key("content") => extract_chunk(chunk),
        Some(Value::Object(map)) => ModelChunk::text(
            map.get("text").and_then(Value::as_str).unwrap_or_default(),
        ),
        _ => ModelChunk::text(
            first_of(data, &["text", "token", "delta"])
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
    }
}

/// Extract text and reasoning from a model message chunk.
///
/// Handles string content, lists of content blocks (`text`, `reasoning`,
/// `thinking`) and `additional_kwargs.reasoning_content`.
pub fn extract_chunk(chunk: &Value) -> ModelChunk {
    let mut out = ModelChunk::default();

    match chunk.get("content") {
        Some(Value::String(text)) => out.text.push_str(text),
        Some(Value::Array(blocks)) => {
            for block in blocks {
                match block {
                    Value::String(text) => out.text.push_str(text),
                    Value::Object(map) => match map.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            out.text.push_str(map.get("text").and_then(Value::as_str).unwrap_or_default())
                        }
                        Some("reasoning" | "thinking") => {
                            let reasoning = ["reasoning", "thinking", "text"]
                                .iter()
                                .find_map(|k| map.get(*k).and_then(Value::as_str))
                                .unwrap_or_default();
                            out.reasoning.push_str(reasoning);
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }
        _ => {}
    }

    if let Some(reasoning) = chunk
        .get("additional_kwargs")
        .and_then(|k| k.get("reasoning_content"))
        .and_then(Value::as_str)
    {
        out.reasoning.push_str(reasoning);
    }

    out
}

/// Extract token usage from a generation end payload.
pub fn extract_usage(data: &Value) -> Option<Usage> {
    let metadata = data
        .get("usage_metadata")
        .or_else(|| data.get("output").and_then(|o| o.get("usage_metadata")));
    if let Some(meta) = metadata {
        let get = |key: &str| meta.get(key).and_then(Value::as_u64);
        let mut usage = Usage::new(
            get("input_tokens").unwrap_or(0),
            get("output_tokens").unwrap_or(0),
        );
        usage.total_tokens = get("total_tokens");
        return Some(usage);
    }

    let token_usage = data
        .get("usage")
        .or_else(|| {
            data.get("output")
                .and_then(|o| o.get("llm_output"))
                .and_then(|l| l.get("token_usage"))
        })?;
    let get = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| token_usage.get(*key).and_then(Value::as_u64))
    };
    let mut usage = Usage::new(
        get(&["promptTokens", "prompt_tokens"]).unwrap_or(0),
        get(&["completionTokens", "completion_tokens"]).unwrap_or(0),
    );
    usage.total_tokens = get(&["totalTokens", "total_tokens"]);
    Some(usage)
}

fn first_steps(data: &Value, paths: &[&[&str]]) -> Vec<IntermediateStep> {
    for path in paths {
        let container = path.iter().try_fold(data, |v, key| v.get(*key));
        let steps = container.and_then(|c| {
            c.get("intermediate_steps")
                .or_else(|| c.get("steps"))
                .and_then(Value::as_array)
        });
        if let Some(steps) = steps {
            return steps.iter().filter_map(parse_step).collect();
        }
    }
    Vec::new()
}

fn parse_step(step: &Value) -> Option<IntermediateStep> {
    let (action, observation) = match step {
        Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
        Value::Object(map) => (map.get("action")?, map.get("observation").unwrap_or(&Value::Null)),
        _ => return None,
    };

    let tool = non_empty_str(action.get("tool").or_else(|| action.get("name")))?;
    let tool_input = first_of(action, &["tool_input", "input", "args"])
        .cloned()
        .unwrap_or(Value::Null);
    let tool_call_id = non_empty_str(action.get("tool_call_id").or_else(|| action.get("id")));

    Some(IntermediateStep {
        action: AgentAction {
            tool,
            tool_input,
            tool_call_id,
        },
        observation: observation.clone(),
    })
}
