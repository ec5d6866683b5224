//! Paced text output.
//!
//! [`SmoothText`] re-chunks text deltas into words, lines or custom regex
//! matches and releases them with a fixed delay between chunks. Every other
//! event passes through unchanged, after any buffered text of the current run
//! has been flushed.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use aisdk_bridge_core::UiEvent;
use futures::Stream;
use pin_project_lite::pin_project;
use regex::Regex;
use tokio::time::Sleep;

use crate::error::StreamResult;

/// How buffered text is split into chunks.
#[derive(Debug, Clone, Default)]
pub enum Chunking {
    /// A word and its trailing whitespace.
    #[default]
    Word,
    /// Everything up to and including a run of newlines.
    Line,
    /// Everything up to the end of the first match.
    Pattern(Regex),
}

impl Chunking {
    /// Byte length of the next complete chunk in `buffer`, if any.
    fn next_chunk_len(&self, buffer: &str) -> Option<usize> {
        match self {
            Self::Word => {
                let word = buffer.find(|c: char| !c.is_whitespace())?;
                let gap = word + buffer[word..].find(char::is_whitespace)?;
                let end = buffer[gap..]
                    .find(|c: char| !c.is_whitespace())
                    .map_or(buffer.len(), |rest| gap + rest);
                Some(end)
            }
            Self::Line => {
                let start = buffer.find('\n')?;
                let end = buffer[start..]
                    .find(|c: char| c != '\n')
                    .map_or(buffer.len(), |rest| start + rest);
                Some(end)
            }
            Self::Pattern(pattern) => pattern
                .find(buffer)
                .map(|m| m.end())
                .filter(|end| *end > 0),
        }
    }
}

/// Pacing settings.
#[derive(Debug, Clone)]
pub struct SmoothConfig {
    /// Delay between released chunks.
    pub delay: Duration,
    /// Chunk boundaries.
    pub chunking: Chunking,
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
            chunking: Chunking::Word,
        }
    }
}

impl SmoothConfig {
    /// Set the delay between chunks.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the chunking mode.
    #[must_use]
    pub fn chunking(mut self, chunking: Chunking) -> Self {
        self.chunking = chunking;
        self
    }

    /// Chunk on a custom regex.
    pub fn with_pattern(self, pattern: &str) -> Result<Self, regex::Error> {
        Ok(self.chunking(Chunking::Pattern(Regex::new(pattern)?)))
    }
}

pin_project! {
    /// Stream adapter that paces text deltas.
    pub struct SmoothText<S> {
        #[pin]
        inner: S,
        config: SmoothConfig,
        buffer: String,
        buffer_id: Option<String>,
        ready: VecDeque<(StreamResult<UiEvent>, bool)>,
        delay: Option<Pin<Box<Sleep>>>,
        inner_done: bool,
    }
}

impl<S> SmoothText<S> {
    /// Wrap a stream.
    pub fn new(inner: S, config: SmoothConfig) -> Self {
        Self {
            inner,
            config,
            buffer: String::new(),
            buffer_id: None,
            ready: VecDeque::new(),
            delay: None,
            inner_done: false,
        }
    }

    /// Pacing settings in use.
    pub fn config(&self) -> &SmoothConfig {
        &self.config
    }
}

fn flush(
    buffer: &mut String,
    buffer_id: &mut Option<String>,
    ready: &mut VecDeque<(StreamResult<UiEvent>, bool)>,
) {
    if let Some(id) = buffer_id.take() {
        if !buffer.is_empty() {
            ready.push_back((Ok(UiEvent::text_delta(id, std::mem::take(buffer))), false));
        }
    }
    buffer.clear();
}

impl<S> Stream for SmoothText<S>
where
    S: Stream<Item = StreamResult<UiEvent>>,
{
    type Item = StreamResult<UiEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some((_, paced)) = this.ready.front() {
                if *paced {
                    if let Some(delay) = this.delay.as_mut() {
                        if delay.as_mut().poll(cx).is_pending() {
                            return Poll::Pending;
                        }
                        *this.delay = None;
                    }
                    if !this.config.delay.is_zero() {
                        *this.delay = Some(Box::pin(tokio::time::sleep(this.config.delay)));
                    }
                }
                if let Some((item, _)) = this.ready.pop_front() {
                    return Poll::Ready(Some(item));
                }
            }

            if *this.inner_done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    flush(this.buffer, this.buffer_id, this.ready);
                    *this.inner_done = true;
                }
                Poll::Ready(Some(Ok(UiEvent::TextDelta { id, delta }))) => {
                    if this.buffer_id.as_deref() != Some(id.as_str()) {
                        flush(this.buffer, this.buffer_id, this.ready);
                        *this.buffer_id = Some(id.clone());
                    }
                    this.buffer.push_str(&delta);
                    while let Some(len) = this.config.chunking.next_chunk_len(this.buffer) {
                        let chunk: String = this.buffer.drain(..len).collect();
                        this.ready
                            .push_back((Ok(UiEvent::text_delta(id.clone(), chunk)), true));
                    }
                }
                Poll::Ready(Some(other)) => {
                    flush(this.buffer, this.buffer_id, this.ready);
                    this.ready.push_back((other, false));
                }
            }
        }
    }
}

/// Extension trait adding [`SmoothText`] to event streams.
pub trait SmoothTextExt: Stream<Item = StreamResult<UiEvent>> + Sized {
    /// Pace the text deltas of this stream.
    fn smooth_text(self, config: SmoothConfig) -> SmoothText<Self> {
        SmoothText::new(self, config)
    }
}

impl<S> SmoothTextExt for S where S: Stream<Item = StreamResult<UiEvent>> + Sized {}
