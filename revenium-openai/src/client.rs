//! The metered client.

use std::sync::Arc;

use crate::backend::{OpenAIBackend, SharedBackend};
use crate::completions::Completions;
use crate::config::{Config, FallbackPolicy};
use crate::error::Result;
use crate::metadata::UsageMetadata;
use crate::metering::{MeteringClient, MeteringDispatcher, RetryPolicy};
use crate::provider::{Provider, is_azure_url};

pub(crate) struct ClientInner {
    pub(crate) config: Config,
    pub(crate) provider: Provider,
    pub(crate) backend: SharedBackend,
    pub(crate) fallback: Option<SharedBackend>,
    pub(crate) dispatcher: MeteringDispatcher,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .field("backend", &self.backend.name())
            .field("fallback", &self.fallback.as_ref().map(|b| b.name()))
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// OpenAI / Azure OpenAI client that meters every chat completion.
///
/// Cheap to clone; clones share the backend and the set of in-flight
/// metering deliveries.
///
/// ```rust,ignore
/// use revenium_openai::{ChatCompletionRequest, ReveniumOpenAI};
///
/// let client = ReveniumOpenAI::from_env()?;
/// let request = ChatCompletionRequest::new("gpt-4o-mini").user("Hello!");
/// let response = client.chat().completions().create(&request).await?;
/// client.close().await;
/// ```
#[derive(Debug, Clone)]
pub struct ReveniumOpenAI {
    inner: Arc<ClientInner>,
}

impl ReveniumOpenAI {
    /// Create a client from configuration.
    ///
    /// Validates the configuration, detects the provider and builds the HTTP
    /// backend for it. When the provider is Azure, the fallback policy is
    /// [`FallbackPolicy::OpenAI`] and an OpenAI key is configured, failed
    /// Azure calls are retried against OpenAI.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = Provider::detect(Some(&config));
        let backend: SharedBackend = Arc::new(OpenAIBackend::for_provider(provider, &config)?);

        let fallback = if provider.is_azure()
            && config.fallback == FallbackPolicy::OpenAI
            && config.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
        {
            let fallback: SharedBackend = Arc::new(OpenAIBackend::openai(&openai_fallback_config(&config))?);
            Some(fallback)
        } else {
            None
        };

        Self::assemble(config, provider, backend, fallback, RetryPolicy::default())
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env())
    }

    /// Create a client that calls `backend` instead of the HTTP provider.
    ///
    /// The provider identity is still detected from `config`. No fallback is
    /// configured.
    pub fn with_backend(config: Config, backend: SharedBackend) -> Result<Self> {
        Self::with_backends(config, backend, None, RetryPolicy::default())
    }

    /// Create a client with explicit primary and fallback backends and a
    /// custom metering retry schedule.
    ///
    /// The fallback is only used when the detected provider is Azure.
    pub fn with_backends(
        config: Config,
        backend: SharedBackend,
        fallback: Option<SharedBackend>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let provider = Provider::detect(Some(&config));
        Self::assemble(config, provider, backend, fallback, retry)
    }

    fn assemble(
        config: Config,
        provider: Provider,
        backend: SharedBackend,
        fallback: Option<SharedBackend>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let metering = MeteringClient::with_retry_policy(&config, retry)?;
        tracing::info!(
            %provider,
            backend = backend.name(),
            fallback = fallback.is_some(),
            metering_endpoint = metering.endpoint(),
            "Revenium middleware initialized"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                provider,
                backend,
                fallback,
                dispatcher: MeteringDispatcher::new(metering),
            }),
        })
    }

    /// The detected provider.
    #[must_use]
    pub fn provider(&self) -> Provider {
        self.inner.provider
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The chat namespace.
    #[must_use]
    pub fn chat(&self) -> Chat {
        Chat {
            inner: Arc::clone(&self.inner),
            metadata: UsageMetadata::new(),
        }
    }

    /// A chat namespace whose calls carry `metadata` as ambient metadata.
    #[must_use]
    pub fn with_metadata(&self, metadata: UsageMetadata) -> Chat {
        Chat {
            inner: Arc::clone(&self.inner),
            metadata,
        }
    }

    /// Metering deliveries still in flight.
    #[must_use]
    pub fn pending_deliveries(&self) -> usize {
        self.inner.dispatcher.pending()
    }

    /// Wait until every in-flight metering delivery has finished.
    pub async fn flush(&self) {
        tracing::debug!("Flushing pending metering requests");
        self.inner.dispatcher.flush().await;
        tracing::debug!("All metering requests completed");
    }

    /// Drain in-flight deliveries before shutdown.
    pub async fn close(&self) {
        self.inner.dispatcher.close().await;
    }
}

/// The configuration the OpenAI fallback is built from. An Azure base URL
/// addresses the Azure resource, not OpenAI, so it is dropped.
fn openai_fallback_config(config: &Config) -> Config {
    let mut config = config.clone();
    if config.base_url.as_deref().is_some_and(is_azure_url) {
        config.base_url = None;
    }
    config
}

/// Chat namespace of [`ReveniumOpenAI`].
#[derive(Debug, Clone)]
pub struct Chat {
    inner: Arc<ClientInner>,
    metadata: UsageMetadata,
}

impl Chat {
    /// Metered chat completions.
    #[must_use]
    pub fn completions(&self) -> Completions {
        Completions::new(Arc::clone(&self.inner), self.metadata.clone())
    }
}
