//! Per-session ambient emitter.
//!
//! Prefer passing an [`EventEmitter`] explicitly. When a deeply nested tool
//! cannot take one as a parameter, run the work inside [`scope`] and call
//! [`current`] or [`emit`] from within. The emitter is task-local: it is
//! visible only to the scoped future and disappears when that future
//! completes. Work spawned onto other tasks must be scoped again.

use std::future::Future;

use aisdk_bridge_core::UiEvent;

use crate::emitter::EventEmitter;
use crate::error::{StreamError, StreamResult};

tokio::task_local! {
    static CURRENT_EMITTER: EventEmitter;
}

/// Run `fut` with `emitter` as the current emitter.
pub async fn scope<F>(emitter: EventEmitter, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_EMITTER.scope(emitter, fut).await
}

/// The emitter of the enclosing scope, if any.
pub fn current() -> Option<EventEmitter> {
    CURRENT_EMITTER.try_with(EventEmitter::clone).ok()
}

/// Emit through the enclosing scope's emitter.
pub async fn emit(event: UiEvent) -> StreamResult<()> {
    let emitter = current().ok_or(StreamError::NoSession)?;
    emitter.emit(event).await
}
