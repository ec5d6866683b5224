//! Session lifecycle callbacks.
//!
//! [`on_start`] fires once, before the first event is delivered. A session
//! invokes exactly one terminal callback: [`on_finish`] after a
//! normal end, [`on_error`] when the upstream fails, or [`on_abort`] when the
//! consumer drops the stream early. Errors returned by callbacks are logged
//! and discarded; they never affect the stream.
//!
//! [`on_start`]: StreamCallbacks::on_start
//! [`on_finish`]: StreamCallbacks::on_finish
//! [`on_error`]: StreamCallbacks::on_error
//! [`on_abort`]: StreamCallbacks::on_abort

use aisdk_bridge_core::{FinishReason, Message, StepSummary, UiEvent, Usage};
use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

use crate::error::StreamError;

/// Details passed to [`StreamCallbacks::on_finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinishOptions {
    /// Finish reason of the stream.
    pub finish_reason: FinishReason,
    /// Total usage, when any was reported.
    pub usage: Option<Usage>,
    /// Finished steps.
    pub steps: Vec<StepSummary>,
}

impl FinishOptions {
    /// Number of finished steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

/// Hooks observing a transcoding session.
///
/// Every method has a no-op default.
///
/// ```rust
/// use aisdk_bridge_core::Message;
/// use aisdk_bridge_streaming::{FinishOptions, StreamCallbacks};
/// use async_trait::async_trait;
///
/// struct Persist;
///
/// #[async_trait]
/// impl StreamCallbacks for Persist {
///     async fn on_finish(&self, message: &Message, _options: &FinishOptions) -> anyhow::Result<()> {
///         println!("stored {} parts", message.parts.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait StreamCallbacks: Send + Sync {
    /// The stream started.
    async fn on_start(&self, _message_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every emitted event.
    async fn on_event(&self, _event: &UiEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// Every text delta.
    async fn on_text(&self, _delta: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// A step finished.
    async fn on_step_finish(&self, _step: &StepSummary) -> anyhow::Result<()> {
        Ok(())
    }

    /// The stream finished normally.
    async fn on_finish(&self, _message: &Message, _options: &FinishOptions) -> anyhow::Result<()> {
        Ok(())
    }

    /// The upstream failed.
    async fn on_error(&self, _error: &StreamError) -> anyhow::Result<()> {
        Ok(())
    }

    /// The consumer dropped the stream before it finished.
    async fn on_abort(&self, _steps: &[StepSummary]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Callbacks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

#[async_trait]
impl StreamCallbacks for NoopCallbacks {}

/// Await a callback, logging and discarding its error.
pub(crate) async fn guarded<F>(name: &'static str, fut: F)
where
    F: Future<Output = anyhow::Result<()>>,
{
    if let Err(err) = fut.await {
        warn!(callback = name, error = %err, "stream callback failed");
    }
}
