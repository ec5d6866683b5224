//! Manual event injection.
//!
//! An [`EventEmitter`] pushes normalized events into a session alongside the
//! events the transcoder produces. Emitters are cheap to clone; every clone
//! feeds the same channel and shares one close flag.

use aisdk_bridge_core::identifier::{
    generate_reasoning_id, generate_source_id, generate_text_id, generate_tool_call_id,
};
use aisdk_bridge_core::{FinishReason, UiEvent, Usage};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};

/// Handle for emitting events into a session by hand.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<UiEvent>,
    closed: CancellationToken,
}

impl EventEmitter {
    /// Create an emitter and the receiving end of its channel.
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                closed: CancellationToken::new(),
            },
            rx,
        )
    }

    pub(crate) fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Emit one event, waiting for channel capacity.
    pub async fn emit(&self, event: UiEvent) -> StreamResult<()> {
        if self.closed.is_cancelled() {
            return Err(StreamError::Closed);
        }
        self.tx.send(event).await.map_err(|_| StreamError::Closed)
    }

    /// Emit one event without waiting.
    pub fn try_emit(&self, event: UiEvent) -> StreamResult<()> {
        if self.closed.is_cancelled() {
            return Err(StreamError::Closed);
        }
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(_) => StreamError::InvalidState("manual channel is full".into()),
            TrySendError::Closed(_) => StreamError::Closed,
        })
    }

    /// Close the manual side. Events already emitted are still delivered.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether further emits will fail.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Emit a complete text run and return its id.
    pub async fn emit_text(&self, text: impl Into<String>) -> StreamResult<String> {
        let id = generate_text_id();
        self.emit(UiEvent::text_start(id.clone())).await?;
        self.emit(UiEvent::text_delta(id.clone(), text)).await?;
        self.emit(UiEvent::text_end(id.clone())).await?;
        Ok(id)
    }

    /// Open a text run.
    pub async fn emit_text_start(&self, id: impl Into<String>) -> StreamResult<()> {
        self.emit(UiEvent::text_start(id)).await
    }

    /// Emit text into an open run.
    pub async fn emit_text_delta(
        &self,
        id: impl Into<String>,
        delta: impl Into<String>,
    ) -> StreamResult<()> {
        self.emit(UiEvent::text_delta(id, delta)).await
    }

    /// Close a text run.
    pub async fn emit_text_end(&self, id: impl Into<String>) -> StreamResult<()> {
        self.emit(UiEvent::text_end(id)).await
    }

    /// Emit a complete reasoning run and return its id.
    pub async fn emit_reasoning(&self, text: impl Into<String>) -> StreamResult<String> {
        let id = generate_reasoning_id();
        self.emit(UiEvent::reasoning_start(id.clone())).await?;
        self.emit(UiEvent::reasoning_delta(id.clone(), text)).await?;
        self.emit(UiEvent::reasoning_end(id.clone())).await?;
        Ok(id)
    }

    /// Open a reasoning run.
    pub async fn emit_reasoning_start(&self, id: impl Into<String>) -> StreamResult<()> {
        self.emit(UiEvent::reasoning_start(id)).await
    }

    /// Emit reasoning into an open run.
    pub async fn emit_reasoning_delta(
        &self,
        id: impl Into<String>,
        delta: impl Into<String>,
    ) -> StreamResult<()> {
        self.emit(UiEvent::reasoning_delta(id, delta)).await
    }

    /// Close a reasoning run.
    pub async fn emit_reasoning_end(&self, id: impl Into<String>) -> StreamResult<()> {
        self.emit(UiEvent::reasoning_end(id)).await
    }

    /// Emit the input side of a tool call and return its id.
    pub async fn emit_tool_call(
        &self,
        tool_call_id: Option<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> StreamResult<String> {
        let id = tool_call_id.unwrap_or_else(generate_tool_call_id);
        let name = tool_name.into();
        self.emit(UiEvent::tool_input_start(id.clone(), name.clone()))
            .await?;
        self.emit(UiEvent::tool_input_delta(id.clone(), input.to_string()))
            .await?;
        self.emit(UiEvent::tool_input_available(id.clone(), name, input))
            .await?;
        Ok(id)
    }

    /// Emit a tool output.
    pub async fn emit_tool_output(
        &self,
        tool_call_id: impl Into<String>,
        output: Value,
    ) -> StreamResult<()> {
        self.emit(UiEvent::tool_output_available(tool_call_id, output))
            .await
    }

    /// Emit a tool failure.
    pub async fn emit_tool_error(
        &self,
        tool_call_id: impl Into<String>,
        error_text: impl Into<String>,
    ) -> StreamResult<()> {
        self.emit(UiEvent::tool_output_error(tool_call_id, error_text))
            .await
    }

    /// Emit a URL source.
    pub async fn emit_source_url(
        &self,
        url: impl Into<String>,
        title: Option<String>,
    ) -> StreamResult<()> {
        self.emit(UiEvent::source_url(url, title)).await
    }

    /// Emit a document source and return its id.
    pub async fn emit_source_document(
        &self,
        media_type: impl Into<String>,
        title: impl Into<String>,
        filename: Option<String>,
    ) -> StreamResult<String> {
        let source_id = generate_source_id();
        self.emit(UiEvent::SourceDocument {
            source_id: source_id.clone(),
            media_type: media_type.into(),
            title: title.into(),
            filename,
        })
        .await?;
        Ok(source_id)
    }

    /// Emit a file.
    pub async fn emit_file(
        &self,
        url: impl Into<String>,
        media_type: impl Into<String>,
    ) -> StreamResult<()> {
        self.emit(UiEvent::file(url, media_type)).await
    }

    /// Emit application data.
    pub async fn emit_data(&self, payload: Value) -> StreamResult<()> {
        self.emit(UiEvent::custom_data(payload)).await
    }

    /// Emit an in-band error.
    pub async fn emit_error(&self, error_text: impl Into<String>) -> StreamResult<()> {
        self.emit(UiEvent::error(error_text)).await
    }

    /// Emit an abort marker.
    pub async fn emit_abort(&self, reason: Option<String>) -> StreamResult<()> {
        self.emit(UiEvent::Abort { reason }).await
    }

    /// Emit message metadata.
    pub async fn emit_message_metadata(&self, metadata: Value) -> StreamResult<()> {
        self.emit(UiEvent::MessageMetadata {
            message_metadata: metadata,
        })
        .await
    }

    /// Open a step.
    pub async fn emit_step_start(&self) -> StreamResult<()> {
        self.emit(UiEvent::StepStart).await
    }

    /// Close a step.
    pub async fn emit_step_finish(
        &self,
        finish_reason: FinishReason,
        usage: Usage,
    ) -> StreamResult<()> {
        self.emit(UiEvent::step_finish(finish_reason, usage)).await
    }
}
