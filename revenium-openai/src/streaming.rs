//! Metered streaming responses.
//!
//! [`MeteredStream`] forwards provider chunks unchanged while recording what
//! the metering event needs: first-token time, the latest reported usage,
//! finish reason, system fingerprint and any terminal error. The event is
//! dispatched once, when the stream is closed or dropped.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::Stream;
use futures::stream::FusedStream;

use crate::backend::ChunkStream;
use crate::error::{Error, Result};
use crate::metadata::UsageMetadata;
use crate::metering::{CallInfo, FirstToken, MeteringDispatcher, MeteringEvent};
use crate::provider::Provider;
use crate::types::{ChatCompletion, ChatCompletionChunk, Choice, ResponseMessage};
use crate::usage::CompletionUsage;

/// Running totals for one stream.
#[derive(Debug, Clone)]
pub struct StreamAccumulator {
    started: Instant,
    started_at: DateTime<Utc>,
    first_token: Option<FirstToken>,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    reasoning_tokens: u64,
    cached_tokens: u64,
    finish_reason: Option<String>,
    system_fingerprint: Option<String>,
    error: Option<Error>,
}

impl StreamAccumulator {
    /// Start accumulating; `started` is the stream start.
    #[must_use]
    pub const fn new(started: Instant, started_at: DateTime<Utc>) -> Self {
        Self {
            started,
            started_at,
            first_token: None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            reasoning_tokens: 0,
            cached_tokens: 0,
            finish_reason: None,
            system_fingerprint: None,
            error: None,
        }
    }

    /// Record one chunk.
    pub fn observe(&mut self, chunk: &ChatCompletionChunk) {
        if self.first_token.is_none() && !chunk.choices.is_empty() {
            let after = self.started.elapsed();
            self.first_token = Some(FirstToken {
                at: self.started_at
                    + chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::zero()),
                after,
            });
        }

        if let Some(usage) = chunk.usage.filter(CompletionUsage::has_tokens) {
            self.input_tokens = usage.prompt_tokens;
            self.output_tokens = usage.completion_tokens;
            self.total_tokens = usage.total_tokens;

            if usage.reasoning_tokens() > 0 {
                self.reasoning_tokens = usage.reasoning_tokens();
            }
            if usage.cached_tokens() > 0 {
                self.cached_tokens = usage.cached_tokens();
            }
        }

        let finish_reason = chunk.finish_reason();
        if !finish_reason.is_empty() {
            self.finish_reason = Some(finish_reason.to_owned());
        }

        if let Some(fp) = chunk.system_fingerprint.as_deref().filter(|fp| !fp.is_empty()) {
            self.system_fingerprint = Some(fp.to_owned());
        }
    }

    /// Record the terminal error.
    pub fn record_error(&mut self, error: Error) {
        self.error = Some(error);
    }

    /// When the first chunk carrying a choice arrived.
    #[must_use]
    pub const fn first_token(&self) -> Option<FirstToken> {
        self.first_token
    }

    /// Usage as last reported by the provider.
    #[must_use]
    pub fn usage(&self) -> CompletionUsage {
        let mut usage = CompletionUsage {
            prompt_tokens: self.input_tokens,
            completion_tokens: self.output_tokens,
            total_tokens: self.total_tokens,
            ..Default::default()
        };
        if self.reasoning_tokens > 0 {
            usage = usage.with_reasoning(self.reasoning_tokens);
        }
        if self.cached_tokens > 0 {
            usage = usage.with_cached(self.cached_tokens);
        }
        usage
    }

    /// Last non-empty finish reason.
    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// The terminal error, if the stream failed.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// A completed response equivalent to what was streamed.
    ///
    /// The finish reason defaults to `stop` when none was seen.
    #[must_use]
    pub fn to_completion(&self, model: &str) -> ChatCompletion {
        ChatCompletion {
            id: crate::metering::transaction_id(),
            object: "chat.completion".to_owned(),
            created: self.started_at.timestamp(),
            model: model.to_owned(),
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".to_owned(),
                    content: Some(String::new()),
                    ..Default::default()
                },
                finish_reason: Some(
                    self.finish_reason
                        .clone()
                        .unwrap_or_else(|| "stop".to_owned()),
                ),
            }],
            usage: Some(self.usage()),
            system_fingerprint: self.system_fingerprint.clone(),
            service_tier: None,
        }
    }
}

/// Shared view of a stream's accumulator, usable from another task.
#[derive(Debug, Clone)]
pub struct StreamProgress {
    state: Arc<Mutex<StreamAccumulator>>,
}

impl StreamProgress {
    /// Copy of the current totals.
    #[must_use]
    pub fn snapshot(&self) -> StreamAccumulator {
        lock(&self.state).clone()
    }
}

struct StreamContext {
    model: String,
    provider: Provider,
    request_time: DateTime<Utc>,
    metadata: UsageMetadata,
    dispatcher: MeteringDispatcher,
}

/// A chunk stream that meters itself when it ends.
///
/// Consume it with [`futures::StreamExt::next`]; every chunk and error is
/// passed through. Call [`MeteredStream::close`] when done. Dropping the
/// stream without closing it still dispatches the event.
pub struct MeteredStream {
    inner: Option<ChunkStream>,
    state: Arc<Mutex<StreamAccumulator>>,
    context: Option<StreamContext>,
}

impl MeteredStream {
    pub(crate) fn new(
        inner: ChunkStream,
        model: String,
        provider: Provider,
        request_time: DateTime<Utc>,
        started: Instant,
        metadata: UsageMetadata,
        dispatcher: MeteringDispatcher,
    ) -> Self {
        Self {
            inner: Some(inner),
            state: Arc::new(Mutex::new(StreamAccumulator::new(started, request_time))),
            context: Some(StreamContext {
                model,
                provider,
                request_time,
                metadata,
                dispatcher,
            }),
        }
    }

    /// The terminal stream error, if any.
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        lock(&self.state).error.clone()
    }

    /// A handle to observe totals while the stream is consumed.
    #[must_use]
    pub fn progress(&self) -> StreamProgress {
        StreamProgress {
            state: Arc::clone(&self.state),
        }
    }

    /// Close the stream and dispatch its metering event.
    ///
    /// Returns the terminal stream error, if the stream failed.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner = None;
        let Some(ctx) = self.context.take() else {
            return Ok(());
        };

        let state = lock(&self.state).clone();
        let call = CallInfo {
            provider: ctx.provider,
            is_streamed: true,
            request_time: ctx.request_time,
            duration: state.started.elapsed(),
            metadata: ctx.metadata,
        };

        if let Some(err) = state.error {
            tracing::debug!(model = %ctx.model, error = %err, "Stream ended with error");
            ctx.dispatcher
                .dispatch(MeteringEvent::error(ctx.model, call, err.to_string()));
            return Err(err);
        }

        let response = state.to_completion(&ctx.model);
        ctx.dispatcher
            .dispatch(MeteringEvent::success(&response, call, state.first_token));
        Ok(())
    }
}

impl Stream for MeteredStream {
    type Item = Result<ChatCompletionChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        let item = ready!(inner.as_mut().poll_next(cx));
        match &item {
            Some(Ok(chunk)) => lock(&self.state).observe(chunk),
            Some(Err(err)) => lock(&self.state).record_error(err.clone()),
            None => self.inner = None,
        }
        Poll::Ready(item)
    }
}

impl FusedStream for MeteredStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for MeteredStream {
    fn drop(&mut self) {
        if self.context.is_some() {
            tracing::debug!("Metered stream dropped without close, finalizing");
            let _ = self.finish();
        }
    }
}

impl std::fmt::Debug for MeteredStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredStream")
            .field("open", &self.inner.is_some())
            .field("state", &*lock(&self.state))
            .finish_non_exhaustive()
    }
}

fn lock(state: &Mutex<StreamAccumulator>) -> MutexGuard<'_, StreamAccumulator> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
