//! Metered chat completions.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::backend::ChatBackend;
use crate::client::ClientInner;
use crate::error::Result;
use crate::metadata::UsageMetadata;
use crate::metering::{CallInfo, MeteringEvent};
use crate::provider::Provider;
use crate::streaming::MeteredStream;
use crate::types::{ChatCompletion, ChatCompletionRequest};

/// Chat completions with automatic metering.
///
/// Carries ambient [`UsageMetadata`] for every call made through it;
/// per-call metadata passed to the `*_with_metadata` methods wins key by key.
#[derive(Debug, Clone)]
pub struct Completions {
    inner: Arc<ClientInner>,
    metadata: UsageMetadata,
}

impl Completions {
    pub(crate) const fn new(inner: Arc<ClientInner>, metadata: UsageMetadata) -> Self {
        Self { inner, metadata }
    }

    /// The ambient metadata of this handle.
    #[must_use]
    pub const fn metadata(&self) -> &UsageMetadata {
        &self.metadata
    }

    /// A handle whose ambient metadata is this one's merged with `metadata`.
    #[must_use]
    pub fn with_metadata(&self, metadata: &UsageMetadata) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            metadata: UsageMetadata::merge(Some(&self.metadata), Some(metadata)),
        }
    }

    /// Create a chat completion.
    pub async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        self.create_with_metadata(request, None).await
    }

    /// Create a chat completion with per-call metadata.
    ///
    /// Provider errors are returned unchanged after their error event is
    /// dispatched.
    pub async fn create_with_metadata(
        &self,
        request: &ChatCompletionRequest,
        metadata: Option<&UsageMetadata>,
    ) -> Result<ChatCompletion> {
        let metadata = UsageMetadata::merge(Some(&self.metadata), metadata);
        let primary = self.inner.backend.as_ref();

        let result = self
            .metered_create(primary, self.inner.provider, request, &metadata)
            .await;

        match (result, self.fallback()) {
            (Err(err), Some(fallback)) => {
                tracing::warn!(error = %err, "Azure OpenAI request failed, falling back to OpenAI");
                self.metered_create(fallback, Provider::OpenAI, request, &metadata)
                    .await
            }
            (result, _) => result,
        }
    }

    /// Create a streaming chat completion.
    pub async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<MeteredStream> {
        self.create_stream_with_metadata(request, None).await
    }

    /// Create a streaming chat completion with per-call metadata.
    ///
    /// The returned stream dispatches its event when closed or dropped. If
    /// the stream cannot be opened, an error event is dispatched and the
    /// provider error returned.
    pub async fn create_stream_with_metadata(
        &self,
        request: &ChatCompletionRequest,
        metadata: Option<&UsageMetadata>,
    ) -> Result<MeteredStream> {
        let metadata = UsageMetadata::merge(Some(&self.metadata), metadata);
        let primary = self.inner.backend.as_ref();

        let result = self
            .metered_stream(primary, self.inner.provider, request, &metadata)
            .await;

        match (result, self.fallback()) {
            (Err(err), Some(fallback)) => {
                tracing::warn!(error = %err, "Azure OpenAI stream failed to open, falling back to OpenAI");
                self.metered_stream(fallback, Provider::OpenAI, request, &metadata)
                    .await
            }
            (result, _) => result,
        }
    }

    /// The OpenAI fallback, only consulted when the primary is Azure.
    fn fallback(&self) -> Option<&dyn ChatBackend> {
        if self.inner.provider.is_azure() {
            self.inner.fallback.as_deref()
        } else {
            None
        }
    }

    async fn metered_create(
        &self,
        backend: &dyn ChatBackend,
        provider: Provider,
        request: &ChatCompletionRequest,
        metadata: &UsageMetadata,
    ) -> Result<ChatCompletion> {
        if provider.is_azure() {
            tracing::debug!(deployment = %request.model, "Using Azure deployment name from request");
        }

        let request_time = Utc::now();
        let started = Instant::now();
        let result = backend.create(request).await;

        let call = CallInfo {
            provider,
            is_streamed: false,
            request_time,
            duration: started.elapsed(),
            metadata: metadata.clone(),
        };

        let event = match &result {
            Ok(response) => MeteringEvent::success(response, call, None),
            Err(err) => MeteringEvent::error(request.model.as_str(), call, err.to_string()),
        };
        self.inner.dispatcher.dispatch(event);

        result
    }

    async fn metered_stream(
        &self,
        backend: &dyn ChatBackend,
        provider: Provider,
        request: &ChatCompletionRequest,
        metadata: &UsageMetadata,
    ) -> Result<MeteredStream> {
        let request_time = Utc::now();
        let started = Instant::now();

        match backend.create_stream(request).await {
            Ok(stream) => Ok(MeteredStream::new(
                stream,
                request.model.clone(),
                provider,
                request_time,
                started,
                metadata.clone(),
                self.inner.dispatcher.clone(),
            )),
            Err(err) => {
                let call = CallInfo {
                    provider,
                    is_streamed: true,
                    request_time,
                    duration: started.elapsed(),
                    metadata: metadata.clone(),
                };
                self.inner.dispatcher.dispatch(MeteringEvent::error(
                    request.model.as_str(),
                    call,
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }
}
