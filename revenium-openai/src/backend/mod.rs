//! Chat-completion backends.
//!
//! A [`ChatBackend`] performs the raw provider call. The metering layer wraps
//! whichever backend a client is built with; it never talks HTTP to the
//! provider itself.

mod mock;
mod openai;
mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::types::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest};

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAIBackend;
pub use sse::SseStream;

/// Stream of chunks produced by a streaming chat completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Type alias for a shared backend.
pub type SharedBackend = Arc<dyn ChatBackend>;

/// A provider that can answer chat-completion requests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends a request and waits for the full completion.
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion>;

    /// Sends a request and returns the chunk stream.
    ///
    /// Implementations set `stream` and request usage on the final chunk.
    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream>;

    /// Short backend name used in errors and logs.
    fn name(&self) -> &'static str;
}
