//! Transcoding sessions.
//!
//! A [`Session`] owns one transcoder, one manual emitter channel and one
//! message accumulator. Calling [`Session::stream`] spawns two producer
//! tasks:
//!
//! - the **automatic** producer pulls the upstream sequence, runs each item
//!   through the [`Transcoder`] and forwards the resulting events;
//! - the **manual** forwarder relays events pushed through
//!   [`EventEmitter`]s.
//!
//! Both feed one bounded queue drained by the returned [`UiEventStream`].
//! Each source keeps its own order; between sources the order is arrival
//! order at the queue. The stream ends once the upstream is exhausted and
//! the manual side is closed, after the transcoder's closing events.
//!
//! Exactly one terminal callback fires per session: `on_finish` after a
//! normal end, `on_error` if the upstream fails, `on_abort` if the stream is
//! dropped early.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use aisdk_bridge_core::identifier::generate_message_id;
use aisdk_bridge_core::{FinishReason, Message, MessageAccumulator, StepSummary, UiEvent};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::callbacks::{guarded, FinishOptions, StreamCallbacks};
use crate::context;
use crate::emitter::EventEmitter;
use crate::error::{BoxError, StreamError, StreamResult};
use crate::transcoder::{Transcoder, TranscoderConfig};
use crate::upstream::UpstreamItem;

/// Session configuration.
///
/// Deserializable so it can live in an application config file; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Message id; generated when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Transcoder settings.
    #[serde(flatten)]
    pub transcoder: TranscoderConfig,
    /// Close the manual side when the upstream is exhausted.
    pub auto_close: bool,
    /// Capacity of the manual and merged channels.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            message_id: None,
            transcoder: TranscoderConfig::default(),
            auto_close: true,
            channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Use a fixed message id.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Set whether `start`/`finish` are emitted.
    #[must_use]
    pub fn emit_lifecycle(mut self, emit: bool) -> Self {
        self.transcoder.emit_lifecycle = emit;
        self
    }

    /// Set whether the manual side closes with the upstream.
    #[must_use]
    pub fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }

    /// Set the channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not streaming yet.
    Pending,
    /// Producing events.
    Streaming,
    /// Finished normally.
    Finished,
    /// The upstream failed.
    Failed,
    /// The consumer dropped the stream early.
    Aborted,
}

#[derive(Debug)]
struct SessionShared {
    message_id: String,
    accumulator: Mutex<MessageAccumulator>,
    final_message: OnceLock<Arc<Message>>,
    status: Mutex<SessionStatus>,
}

impl SessionShared {
    fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }
}

/// Read-only view of a session, usable while and after it streams.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// The session's message id.
    pub fn message_id(&self) -> &str {
        &self.shared.message_id
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        *self.shared.status.lock()
    }

    /// Build the message from everything consumed so far.
    pub fn current_message(&self) -> Message {
        self.shared.accumulator.lock().build()
    }

    /// The finalized message, once the session finished normally.
    pub fn final_message(&self) -> Option<Arc<Message>> {
        self.shared.final_message.get().cloned()
    }

    /// Events consumed so far.
    pub fn history(&self) -> Vec<UiEvent> {
        self.shared.accumulator.lock().history().to_vec()
    }
}

/// One transcoding session.
pub struct Session {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    emitter: EventEmitter,
    manual_rx: mpsc::Receiver<UiEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("message_id", &self.shared.message_id)
            .field("config", &self.config)
            .field("has_callbacks", &self.callbacks.is_some())
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    /// Create a session.
    pub fn new(config: SessionConfig) -> Self {
        let message_id = config
            .message_id
            .clone()
            .unwrap_or_else(generate_message_id);
        let (emitter, manual_rx) = EventEmitter::channel(config.channel_capacity);
        let shared = Arc::new(SessionShared {
            accumulator: Mutex::new(MessageAccumulator::new(message_id.clone())),
            message_id,
            final_message: OnceLock::new(),
            status: Mutex::new(SessionStatus::Pending),
        });

        Self {
            config,
            shared,
            callbacks: None,
            emitter,
            manual_rx,
        }
    }

    /// Attach callbacks.
    #[must_use]
    pub fn with_callbacks(self, callbacks: impl StreamCallbacks + 'static) -> Self {
        self.with_shared_callbacks(Arc::new(callbacks))
    }

    /// Attach shared callbacks.
    #[must_use]
    pub fn with_shared_callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// The session's message id.
    pub fn message_id(&self) -> &str {
        &self.shared.message_id
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// An emitter for manual events.
    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// A handle for inspecting the session.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start streaming `upstream` merged with manual events.
    ///
    /// Must be called within a Tokio runtime: the producers are spawned
    /// immediately.
    pub fn stream<S, I, E>(self, upstream: S) -> UiEventStream
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<UpstreamItem> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let Session {
            config,
            shared,
            callbacks,
            emitter,
            manual_rx,
        } = self;

        shared.set_status(SessionStatus::Streaming);
        debug!(message_id = %shared.message_id, "starting stream session");

        let cancel = CancellationToken::new();
        let manual_finished = CancellationToken::new();
        let manual_close = emitter.close_token();
        let (merged_tx, merged_rx) = mpsc::channel(config.channel_capacity.max(1));

        let manual_task = tokio::spawn(forward_manual(
            manual_rx,
            manual_close.clone(),
            merged_tx.clone(),
            manual_finished.clone(),
            cancel.clone(),
        ));

        let transcoder = Transcoder::new(shared.message_id.clone(), config.transcoder.clone());
        let auto_task = tokio::spawn(run_auto(
            upstream,
            transcoder,
            AutoProducer {
                emitter,
                auto_close: config.auto_close,
                out: merged_tx,
                manual_finished,
                cancel: cancel.clone(),
            },
        ));

        let handle = SessionHandle {
            shared: Arc::clone(&shared),
        };
        let consumer = Consumer {
            rx: merged_rx,
            callbacks: callbacks.clone(),
            started: false,
            auto_done: false,
            manual_done: false,
            done: false,
            steps_seen: 0,
            guard: SessionGuard {
                cancel,
                manual_close,
                tasks: vec![auto_task, manual_task],
                completed: false,
                callbacks,
                shared: Arc::clone(&shared),
            },
            shared,
        };

        UiEventStream {
            inner: stream::unfold(consumer, Consumer::next).boxed(),
            handle,
        }
    }

    /// Stream manual events only.
    ///
    /// The stream ends when the emitter is closed or every emitter clone is
    /// dropped.
    pub fn manual_stream(mut self) -> UiEventStream {
        self.config.auto_close = false;
        self.stream(stream::empty::<Result<UpstreamItem, StreamError>>())
    }
}

/// Merged stream of normalized events produced by a [`Session`].
pub struct UiEventStream {
    inner: BoxStream<'static, StreamResult<UiEvent>>,
    handle: SessionHandle,
}

impl UiEventStream {
    /// A handle to the underlying session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// The session's message id.
    pub fn message_id(&self) -> &str {
        self.handle.message_id()
    }
}

impl std::fmt::Debug for UiEventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiEventStream")
            .field("message_id", &self.handle.message_id())
            .finish()
    }
}

impl Stream for UiEventStream {
    type Item = StreamResult<UiEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

#[derive(Debug)]
enum Merged {
    Event(UiEvent),
    AutoDone,
    ManualDone,
    Failed(StreamError),
}

async fn send_all(out: &mpsc::Sender<Merged>, events: Vec<UiEvent>) -> bool {
    for event in events {
        if out.send(Merged::Event(event)).await.is_err() {
            return false;
        }
    }
    true
}

async fn forward_manual(
    mut rx: mpsc::Receiver<UiEvent>,
    closed: CancellationToken,
    out: mpsc::Sender<Merged>,
    finished: CancellationToken,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = rx.recv() => match event {
                Some(event) => {
                    if out.send(Merged::Event(event)).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = closed.cancelled() => {
                rx.close();
                while let Some(event) = rx.recv().await {
                    if out.send(Merged::Event(event)).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    finished.cancel();
    let _ = out.send(Merged::ManualDone).await;
}

struct AutoProducer {
    emitter: EventEmitter,
    auto_close: bool,
    out: mpsc::Sender<Merged>,
    manual_finished: CancellationToken,
    cancel: CancellationToken,
}

enum PumpOutcome {
    Exhausted,
    Failed(StreamError),
    Stopped,
}

async fn run_auto<S, I, E>(upstream: S, mut transcoder: Transcoder, producer: AutoProducer)
where
    S: Stream<Item = Result<I, E>> + Send + 'static,
    I: Into<UpstreamItem> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let AutoProducer {
        emitter,
        auto_close,
        out,
        manual_finished,
        cancel,
    } = producer;
    let manual_close = emitter.close_token();

    // The emitter is only visible to the upstream while it is being pulled.
    let outcome = context::scope(emitter, pump(upstream, &mut transcoder, &out, &cancel)).await;

    match outcome {
        PumpOutcome::Stopped => return,
        PumpOutcome::Failed(err) => {
            debug!(error = %err, "upstream failed");
            let _ = out.send(Merged::Failed(err)).await;
            return;
        }
        PumpOutcome::Exhausted => {}
    }

    if auto_close {
        manual_close.cancel();
    }
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = manual_finished.cancelled() => {}
    }

    if send_all(&out, transcoder.finish()).await {
        let _ = out.send(Merged::AutoDone).await;
    }
}

async fn pump<S, I, E>(
    upstream: S,
    transcoder: &mut Transcoder,
    out: &mpsc::Sender<Merged>,
    cancel: &CancellationToken,
) -> PumpOutcome
where
    S: Stream<Item = Result<I, E>> + Send,
    I: Into<UpstreamItem>,
    E: Into<BoxError>,
{
    let mut upstream = Box::pin(upstream);
    if !send_all(out, transcoder.start()).await {
        return PumpOutcome::Stopped;
    }

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return PumpOutcome::Stopped,
            next = upstream.next() => next,
        };
        match next {
            Some(Ok(item)) => {
                if !send_all(out, transcoder.process(item)).await {
                    return PumpOutcome::Stopped;
                }
            }
            Some(Err(err)) => return PumpOutcome::Failed(StreamError::upstream(err)),
            None => return PumpOutcome::Exhausted,
        }
    }
}

struct SessionGuard {
    cancel: CancellationToken,
    manual_close: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    completed: bool,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    shared: Arc<SessionShared>,
}

impl SessionGuard {
    fn shutdown(&self) {
        self.cancel.cancel();
        self.manual_close.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shutdown();
        if self.completed {
            return;
        }

        self.shared.set_status(SessionStatus::Aborted);
        debug!(message_id = %self.shared.message_id, "stream session aborted");

        let Some(callbacks) = self.callbacks.take() else {
            return;
        };
        let steps = self.shared.accumulator.lock().steps();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    guarded("on_abort", callbacks.on_abort(&steps)).await;
                });
            }
            Err(_) => warn!("no runtime available for the abort callback"),
        }
    }
}

struct Consumer {
    rx: mpsc::Receiver<Merged>,
    shared: Arc<SessionShared>,
    callbacks: Option<Arc<dyn StreamCallbacks>>,
    guard: SessionGuard,
    started: bool,
    auto_done: bool,
    manual_done: bool,
    done: bool,
    steps_seen: u32,
}

impl Consumer {
    async fn next(mut self) -> Option<(StreamResult<UiEvent>, Self)> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            if let Some(callbacks) = &self.callbacks {
                guarded("on_start", callbacks.on_start(&self.shared.message_id)).await;
            }
        }

        loop {
            match self.rx.recv().await {
                Some(Merged::Event(event)) => {
                    self.observe(&event).await;
                    return Some((Ok(event), self));
                }
                Some(Merged::AutoDone) => self.auto_done = true,
                Some(Merged::ManualDone) => self.manual_done = true,
                Some(Merged::Failed(err)) => {
                    self.fail(&err).await;
                    return Some((Err(err), self));
                }
                None => {
                    let err =
                        StreamError::InvalidState("stream producers ended unexpectedly".into());
                    self.fail(&err).await;
                    return Some((Err(err), self));
                }
            }

            if self.auto_done && self.manual_done {
                self.complete().await;
                return None;
            }
        }
    }

    async fn observe(&mut self, event: &UiEvent) {
        self.shared.accumulator.lock().push(event.clone());

        let Some(callbacks) = &self.callbacks else {
            return;
        };
        guarded("on_event", callbacks.on_event(event)).await;
        match event {
            UiEvent::TextDelta { delta, .. } => {
                guarded("on_text", callbacks.on_text(delta)).await;
            }
            UiEvent::StepFinish {
                finish_reason,
                usage,
                ..
            } => {
                let step = StepSummary {
                    index: self.steps_seen,
                    finish_reason: *finish_reason,
                    usage: *usage,
                };
                self.steps_seen += 1;
                guarded("on_step_finish", callbacks.on_step_finish(&step)).await;
            }
            _ => {}
        }
    }

    async fn complete(&mut self) {
        self.done = true;
        self.guard.completed = true;

        let (message, options) = {
            let acc = self.shared.accumulator.lock();
            let steps = acc.steps();
            let (finish_reason, usage) = acc.finish().unwrap_or_else(|| {
                let reason = steps
                    .last()
                    .map(|s| s.finish_reason)
                    .unwrap_or(FinishReason::Stop);
                (reason, None)
            });
            (
                Arc::new(acc.build()),
                FinishOptions {
                    finish_reason,
                    usage,
                    steps,
                },
            )
        };

        let _ = self.shared.final_message.set(Arc::clone(&message));
        self.shared.set_status(SessionStatus::Finished);
        debug!(
            message_id = %self.shared.message_id,
            parts = message.parts.len(),
            steps = options.step_count(),
            "stream session finished"
        );

        if let Some(callbacks) = &self.callbacks {
            guarded("on_finish", callbacks.on_finish(&message, &options)).await;
        }
    }

    async fn fail(&mut self, err: &StreamError) {
        self.done = true;
        self.guard.completed = true;
        self.guard.shutdown();
        self.shared.set_status(SessionStatus::Failed);

        if let Some(callbacks) = &self.callbacks {
            guarded("on_error", callbacks.on_error(err)).await;
        }
    }
}
