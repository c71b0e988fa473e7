//! Mock backend for testing.
//!
//! Returns scripted replies in sequence, cycling through them, so metering
//! behavior can be exercised without a real provider.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{Error, Result};
use crate::types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, Choice, ChunkChoice, ChunkDelta,
    ResponseMessage,
};
use crate::usage::CompletionUsage;

use super::{ChatBackend, ChunkStream};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A full completion for [`ChatBackend::create`].
    Completion(ChatCompletion),
    /// A chunk sequence for [`ChatBackend::create_stream`].
    Stream(Vec<Result<ChatCompletionChunk>>),
    /// A failure returned by either call.
    Error(Error),
}

impl MockReply {
    /// A completion with one assistant message finished with `stop`.
    #[must_use]
    pub fn text(model: &str, content: &str, usage: CompletionUsage) -> Self {
        Self::Completion(ChatCompletion {
            id: "chatcmpl-mock".to_owned(),
            object: "chat.completion".to_owned(),
            model: model.to_owned(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_owned(),
                    content: Some(content.to_owned()),
                    ..Default::default()
                },
                finish_reason: Some("stop".to_owned()),
            }],
            usage: Some(usage),
            ..Default::default()
        })
    }

    /// A stream that yields the given chunks and ends cleanly.
    #[must_use]
    pub fn stream(chunks: Vec<ChatCompletionChunk>) -> Self {
        Self::Stream(chunks.into_iter().map(Ok).collect())
    }
}

/// A scripted [`ChatBackend`].
#[derive(Debug)]
pub struct MockBackend {
    name: &'static str,
    replies: Vec<MockReply>,
    reply_index: AtomicUsize,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockBackend {
    /// Create a mock backend with predefined replies.
    #[must_use]
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            name: "mock",
            replies,
            reply_index: AtomicUsize::new(0),
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Set the backend name reported in errors and logs.
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sleep before yielding each streamed chunk.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.reply_index.load(Ordering::SeqCst)
    }

    /// Requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// A content chunk, optionally carrying a finish reason.
    #[must_use]
    pub fn chunk(model: &str, content: &str, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "chatcmpl-mock".to_owned(),
            object: "chat.completion.chunk".to_owned(),
            model: model.to_owned(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: Some(content.to_owned()),
                    ..Default::default()
                },
                finish_reason: finish_reason.map(str::to_owned),
            }],
            ..Default::default()
        }
    }

    /// The trailing usage chunk with no choices.
    #[must_use]
    pub fn usage_chunk(model: &str, usage: CompletionUsage) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "chatcmpl-mock".to_owned(),
            object: "chat.completion.chunk".to_owned(),
            model: model.to_owned(),
            usage: Some(usage),
            ..Default::default()
        }
    }

    fn next_reply(&self, request: &ChatCompletionRequest) -> Result<MockReply> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.clone());

        let index = self.reply_index.fetch_add(1, Ordering::SeqCst);
        if self.replies.is_empty() {
            return Err(Error::internal("mock backend has no replies"));
        }
        Ok(self.replies[index % self.replies.len()].clone())
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        match self.next_reply(request)? {
            MockReply::Completion(completion) => Ok(completion),
            MockReply::Error(err) => Err(err),
            MockReply::Stream(_) => Err(Error::internal(
                "mock reply is a stream, expected a completion",
            )),
        }
    }

    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        let chunks = match self.next_reply(&request.to_streaming())? {
            MockReply::Stream(chunks) => chunks,
            MockReply::Error(err) => return Err(err),
            MockReply::Completion(_) => {
                return Err(Error::internal(
                    "mock reply is a completion, expected a stream",
                ));
            }
        };

        let delay = self.chunk_delay;
        let stream = futures::stream::iter(chunks).then(move |chunk| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            chunk
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
