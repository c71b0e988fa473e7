//! Server-sent events parsing for streaming chat completions.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::error::{Error, Result};
use crate::types::{ChatCompletionChunk, ErrorResponse};

/// Streaming response parser for OpenAI's SSE format.
///
/// Network chunks are buffered until a full line is available, so an event
/// split across reads is parsed once complete. `data: [DONE]` ends the
/// stream; lines that are not valid chunks are logged and skipped.
#[derive(Debug)]
pub struct SseStream<S> {
    inner: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S, E> SseStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    /// Create a new SSE parser over a byte stream.
    pub const fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Parse one line. `None` means the line carries no chunk.
    fn parse_line(&mut self, line: &[u8]) -> Option<Result<ChatCompletionChunk>> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();

        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim();

        if data == "[DONE]" {
            self.done = true;
            return None;
        }

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(data) {
            return Some(Err(Error::streaming(err.error.message)));
        }

        match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => Some(Ok(chunk)),
            Err(e) => {
                tracing::warn!("Failed to parse SSE chunk: {e}, data: {data}");
                None
            }
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
        line.pop();
        Some(line)
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<ChatCompletionChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            if let Some(line) = self.next_line() {
                if let Some(result) = self.parse_line(&line) {
                    return Poll::Ready(Some(result));
                }
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(Error::streaming(e.to_string()))));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if self.buffer.is_empty() {
                        return Poll::Ready(None);
                    }
                    let remaining = std::mem::take(&mut self.buffer);
                    return Poll::Ready(self.parse_line(&remaining));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
