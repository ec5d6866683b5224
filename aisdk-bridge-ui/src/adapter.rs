//! Transport adapter.
//!
//! [`StreamAdapter`] wraps one [`Session`] and exposes the transcoded stream
//! in three shapes: normalized events, encoded text frames, or (with the
//! `server` feature) an axum response. Callbacks and message accumulation
//! run as the stream is consumed, whichever shape is used.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use aisdk_bridge_core::UiEvent;
use aisdk_bridge_streaming::{
    BoxError, EventEmitter, Session, SessionConfig, SessionHandle, SmoothConfig, SmoothTextExt,
    StreamCallbacks, StreamResult, UpstreamItem,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;

use crate::error::EncodeError;
use crate::protocol::{FrameEncoder, Protocol};

/// Options for a [`StreamAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Wire protocol.
    pub protocol: Protocol,
    /// Session settings.
    pub session: SessionConfig,
    /// Extra response headers; these override the protocol headers.
    pub headers: Vec<(String, String)>,
    /// Response status code.
    pub status: u16,
    /// Pace text deltas before encoding.
    pub smooth: Option<SmoothConfig>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            session: SessionConfig::default(),
            headers: Vec::new(),
            status: 200,
            smooth: None,
        }
    }
}

impl AdapterOptions {
    /// Create options for a protocol.
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    /// Set the protocol.
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the session settings.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Add a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the response status code.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Pace text deltas.
    #[must_use]
    pub fn smooth(mut self, smooth: SmoothConfig) -> Self {
        self.smooth = Some(smooth);
        self
    }
}

/// Stream of normalized events returned by the adapter.
pub type EventStream = BoxStream<'static, StreamResult<UiEvent>>;

/// Wraps one transcoding session for transport.
#[derive(Debug)]
pub struct StreamAdapter {
    session: Session,
    protocol: Protocol,
    headers: Vec<(String, String)>,
    status: u16,
    smooth: Option<SmoothConfig>,
}

impl Default for StreamAdapter {
    fn default() -> Self {
        Self::new(AdapterOptions::default())
    }
}

impl StreamAdapter {
    /// Create an adapter.
    pub fn new(options: AdapterOptions) -> Self {
        let AdapterOptions {
            protocol,
            session,
            headers,
            status,
            smooth,
        } = options;
        Self {
            session: Session::new(session),
            protocol,
            headers,
            status,
            smooth,
        }
    }

    /// Attach session callbacks.
    #[must_use]
    pub fn callbacks(mut self, callbacks: impl StreamCallbacks + 'static) -> Self {
        self.session = self.session.with_callbacks(callbacks);
        self
    }

    /// Attach shared session callbacks.
    #[must_use]
    pub fn shared_callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.session = self.session.with_shared_callbacks(callbacks);
        self
    }

    /// The wire protocol.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The message id of the session.
    pub fn message_id(&self) -> &str {
        self.session.message_id()
    }

    /// An emitter for manual events.
    pub fn emitter(&self) -> EventEmitter {
        self.session.emitter()
    }

    /// A handle for inspecting the session.
    pub fn handle(&self) -> SessionHandle {
        self.session.handle()
    }

    /// Normalized events.
    pub fn into_event_stream<S, I, E>(self, upstream: S) -> EventStream
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<UpstreamItem> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let events = self.session.stream(upstream);
        match self.smooth {
            Some(smooth) => events.smooth_text(smooth).boxed(),
            None => events.boxed(),
        }
    }

    /// Encoded text frames.
    pub fn into_frame_stream<S, I, E>(self, upstream: S) -> FrameStream<EventStream>
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<UpstreamItem> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let protocol = self.protocol;
        FrameStream::new(self.into_event_stream(upstream), protocol)
    }

    /// Encoded frames as bytes.
    pub fn into_byte_stream<S, I, E>(
        self,
        upstream: S,
    ) -> impl Stream<Item = Result<Bytes, EncodeError>> + Send + 'static
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<UpstreamItem> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.into_frame_stream(upstream)
            .map(|frame| frame.map(Bytes::from))
    }

    /// A streaming HTTP response with protocol headers.
    ///
    /// Header and status validation happens before the upstream is touched.
    #[cfg(feature = "server")]
    #[cfg_attr(docsrs, doc(cfg(feature = "server")))]
    pub fn into_response<S, I, E>(self, upstream: S) -> crate::Result<axum::response::Response>
    where
        S: Stream<Item = Result<I, E>> + Send + 'static,
        I: Into<UpstreamItem> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        use axum::body::Body;
        use axum::http::{HeaderName, HeaderValue, StatusCode};

        let status =
            StatusCode::from_u16(self.status).map_err(|_| EncodeError::InvalidStatus(self.status))?;

        let mut headers = Vec::with_capacity(self.protocol.headers().len() + self.headers.len());
        for &(name, value) in self.protocol.headers() {
            headers.push((
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            ));
        }
        for (name, value) in &self.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|err| EncodeError::InvalidHeader(format!("{name}: {err}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|err| EncodeError::InvalidHeader(format!("{name}: {err}")))?;
            headers.push((name, value));
        }

        let mut response = axum::response::Response::new(Body::from_stream(
            self.into_byte_stream(upstream),
        ));
        *response.status_mut() = status;
        let response_headers = response.headers_mut();
        for (name, value) in headers {
            response_headers.insert(name, value);
        }
        Ok(response)
    }
}

pin_project! {
    /// Stream of encoded frames.
    ///
    /// An upstream error is yielded once and ends the stream without any
    /// terminating frames.
    pub struct FrameStream<S> {
        #[pin]
        inner: S,
        encoder: Box<dyn FrameEncoder>,
        pending: VecDeque<String>,
        done: bool,
    }
}

impl<S> FrameStream<S>
where
    S: Stream<Item = StreamResult<UiEvent>>,
{
    /// Encode `inner` with `protocol`.
    pub fn new(inner: S, protocol: Protocol) -> Self {
        Self::with_encoder(inner, protocol.encoder())
    }

    /// Encode `inner` with a custom encoder.
    pub fn with_encoder(inner: S, encoder: Box<dyn FrameEncoder>) -> Self {
        Self {
            inner,
            encoder,
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = StreamResult<UiEvent>>,
{
    type Item = Result<String, EncodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(event))) => this.pending.extend(this.encoder.encode(&event)),
                Poll::Ready(Some(Err(err))) => {
                    *this.done = true;
                    this.pending.clear();
                    return Poll::Ready(Some(Err(err.into())));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    this.pending.extend(this.encoder.finish());
                }
            }
        }
    }
}

/// Transcode `upstream` into normalized events.
pub fn to_event_stream<S, I, E>(upstream: S, options: AdapterOptions) -> EventStream
where
    S: Stream<Item = Result<I, E>> + Send + 'static,
    I: Into<UpstreamItem> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    StreamAdapter::new(options).into_event_stream(upstream)
}

/// Transcode `upstream` into encoded frames.
pub fn to_frame_stream<S, I, E>(upstream: S, options: AdapterOptions) -> FrameStream<EventStream>
where
    S: Stream<Item = Result<I, E>> + Send + 'static,
    I: Into<UpstreamItem> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    StreamAdapter::new(options).into_frame_stream(upstream)
}

/// Transcode `upstream` into a streaming HTTP response.
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub fn to_response<S, I, E>(
    upstream: S,
    options: AdapterOptions,
) -> crate::Result<axum::response::Response>
where
    S: Stream<Item = Result<I, E>> + Send + 'static,
    I: Into<UpstreamItem> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    StreamAdapter::new(options).into_response(upstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aisdk_bridge_core::Message;
    use aisdk_bridge_streaming::{FinishOptions, SessionStatus, UpstreamEvent};
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::convert::Infallible;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("aisdk_bridge=debug")
            .with_test_writer()
            .try_init();
    }

    #[derive(Default)]
    struct Finished {
        messages: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl StreamCallbacks for Finished {
        async fn on_finish(&self, message: &Message, _options: &FinishOptions) -> anyhow::Result<()> {
            self.messages.lock().push(message.clone());
            Ok(())
        }
    }

    fn hello() -> impl Stream<Item = Result<UpstreamItem, Infallible>> + Send + 'static {
        stream::iter(
            vec![
                UpstreamItem::from(UpstreamEvent::GenerationStart),
                UpstreamItem::from("Hello "),
                UpstreamItem::from("world"),
                UpstreamItem::from(UpstreamEvent::GenerationEnd { usage: None }),
            ]
            .into_iter()
            .map(Ok),
        )
    }

    fn options(protocol: Protocol) -> AdapterOptions {
        AdapterOptions::new(protocol).session(SessionConfig::default().message_id("msg_1"))
    }

    #[tokio::test]
    async fn test_compact_frames() {
        init_tracing();
        let frames: Vec<String> = to_frame_stream(hello(), options(Protocol::Compact))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                "f:{\"messageId\":\"msg_1\"}\n",
                "0:\"Hello \"\n",
                "0:\"world\"\n",
                "e:{\"finishReason\":\"stop\",\"isContinued\":false,\"usage\":{\"completionTokens\":0,\"promptTokens\":0}}\n",
                "d:{\"finishReason\":\"stop\",\"usage\":{}}\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_event_stream_frames() {
        let frames: Vec<String> = to_frame_stream(hello(), options(Protocol::EventStream))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(frames.first().unwrap(), "data: {\"type\":\"start\",\"messageId\":\"msg_1\"}\n\n");
        assert_eq!(frames.last().unwrap(), "data: [DONE]\n\n");
        assert_eq!(frames.len(), 9);
        assert!(frames.iter().all(|f| f.starts_with("data: ") && f.ends_with("\n\n")));
    }

    #[tokio::test]
    async fn test_on_finish_fires_for_every_shape() {
        for protocol in [Protocol::Compact, Protocol::EventStream] {
            let finished = Arc::new(Finished::default());
            let adapter = StreamAdapter::new(options(protocol)).shared_callbacks(finished.clone());
            let handle = adapter.handle();
            let _: Vec<_> = adapter.into_frame_stream(hello()).collect().await;

            let messages = finished.messages.lock();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].content, "Hello world");
            assert_eq!(handle.status(), SessionStatus::Finished);
        }

        let finished = Arc::new(Finished::default());
        let adapter = StreamAdapter::default().shared_callbacks(finished.clone());
        let _: Vec<_> = adapter.into_event_stream(hello()).collect().await;
        assert_eq!(finished.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_ends_frames() {
        let upstream = stream::iter(vec![
            Ok(UpstreamItem::from("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "x")),
        ]);
        let results: Vec<_> = to_frame_stream(upstream, options(Protocol::EventStream))
            .collect()
            .await;

        let (last, frames) = results.split_last().unwrap();
        let err = last.as_ref().unwrap_err();
        assert!(err.is_upstream());
        assert!(frames
            .iter()
            .map(|f| f.as_ref().unwrap())
            .all(|f| !f.contains("[DONE]") && !f.contains("\"type\":\"finish\"")));
    }

    #[tokio::test]
    async fn test_manual_events_are_encoded() {
        let adapter = StreamAdapter::new(
            options(Protocol::Compact).session(
                SessionConfig::default()
                    .message_id("msg_1")
                    .auto_close(false),
            ),
        );
        let emitter = adapter.emitter();
        let frames = adapter.into_frame_stream(stream::empty::<Result<UpstreamItem, Infallible>>());

        emitter.emit_data(json!({"progress": 50})).await.unwrap();
        emitter.close();

        let frames: Vec<String> = frames.map(Result::unwrap).collect().await;
        assert_eq!(
            frames,
            vec![
                "2:[{\"progress\":50}]\n".to_owned(),
                "d:{\"finishReason\":\"stop\",\"usage\":{}}\n".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn test_smoothing_before_encoding() {
        let options = options(Protocol::Compact).smooth(SmoothConfig::default().delay(Duration::ZERO));
        let frames: Vec<String> = to_frame_stream(hello(), options)
            .map(Result::unwrap)
            .filter(|f| futures::future::ready(f.starts_with("0:")))
            .collect()
            .await;
        assert_eq!(frames, vec!["0:\"Hello \"\n", "0:\"world\"\n"]);
    }

    #[test]
    fn test_options_builder() {
        let options = AdapterOptions::new(Protocol::Compact)
            .header("x-trace", "1")
            .status(201);
        assert_eq!(options.protocol, Protocol::Compact);
        assert_eq!(options.headers, vec![("x-trace".to_owned(), "1".to_owned())]);
        assert_eq!(options.status, 201);
        assert!(options.smooth.is_none());
        assert_eq!(AdapterOptions::default().status, 200);
    }

    #[cfg(feature = "server")]
    mod server {
        use super::*;
        use axum::body::to_bytes;
        use axum::http::StatusCode;

        #[tokio::test]
        async fn test_response_headers_and_body() {
            let response = to_response(
                hello(),
                options(Protocol::Compact)
                    .status(202)
                    .header("x-request-id", "abc"),
            )
            .unwrap();

            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let headers = response.headers();
            assert_eq!(headers["content-type"], "text/plain; charset=utf-8");
            assert_eq!(headers["x-vercel-ai-data-stream"], "v1");
            assert_eq!(headers["cache-control"], "no-cache");
            assert_eq!(headers["x-request-id"], "abc");

            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = String::from_utf8(body.to_vec()).unwrap();
            assert!(body.starts_with("f:{\"messageId\":\"msg_1\"}\n0:\"Hello \"\n"));
            assert!(body.ends_with("d:{\"finishReason\":\"stop\",\"usage\":{}}\n"));
        }

        #[tokio::test]
        async fn test_event_stream_response() {
            let response = StreamAdapter::new(options(Protocol::EventStream))
                .into_response(hello())
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["content-type"], "text/event-stream");
            assert_eq!(response.headers()["x-vercel-ai-ui-message-stream"], "v1");
        }

        #[test]
        fn test_invalid_header_rejected() {
            let err = StreamAdapter::new(options(Protocol::Compact).header("bad header", "x"))
                .into_response(hello())
                .unwrap_err();
            assert!(matches!(err, EncodeError::InvalidHeader(_)));

            let err = StreamAdapter::new(options(Protocol::Compact).status(1000))
                .into_response(hello())
                .unwrap_err();
            assert!(matches!(err, EncodeError::InvalidStatus(1000)));
        }
    }
}
