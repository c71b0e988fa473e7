//! OpenAI and Azure OpenAI HTTP backend.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::types::{ChatCompletion, ChatCompletionRequest, ErrorResponse};

use super::sse::SseStream;
use super::{ChatBackend, ChunkStream};

#[derive(Debug)]
enum Target {
    OpenAI {
        api_key: String,
        organization: Option<String>,
        base_url: String,
    },
    Azure {
        api_key: String,
        endpoint: String,
        api_version: String,
    },
}

/// Chat Completions over HTTP, against OpenAI or an Azure OpenAI resource.
#[derive(Debug, Clone)]
pub struct OpenAIBackend {
    target: Arc<Target>,
    client: Client,
}

impl OpenAIBackend {
    /// Create a backend for the native OpenAI API.
    pub fn openai(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::auth("openai", "OPENAI_API_KEY is required"))?;

        Self::build(
            config,
            Target::OpenAI {
                api_key,
                organization: config.openai_org_id.clone(),
                base_url: config.openai_base_url().trim_end_matches('/').to_owned(),
            },
        )
    }

    /// Create a backend for Azure OpenAI.
    ///
    /// Without an explicit Azure endpoint the base URL override is used as
    /// the resource endpoint, and the OpenAI key stands in for a missing
    /// Azure key.
    pub fn azure(config: &Config) -> Result<Self> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        let endpoint = present(&config.azure_endpoint).or_else(|| present(&config.base_url));
        let api_key = present(&config.azure_api_key).or_else(|| present(&config.openai_api_key));
        let (Some(api_key), Some(endpoint)) = (api_key, endpoint) else {
            return Err(Error::config(
                "AZURE_OPENAI_API_KEY and AZURE_OPENAI_ENDPOINT are required for Azure OpenAI",
            ));
        };

        Self::build(
            config,
            Target::Azure {
                api_key,
                endpoint: endpoint.trim_end_matches('/').to_owned(),
                api_version: config.azure_api_version().to_owned(),
            },
        )
    }

    /// Create the backend matching a detected provider.
    pub fn for_provider(provider: Provider, config: &Config) -> Result<Self> {
        match provider {
            Provider::OpenAI => Self::openai(config),
            Provider::Azure => Self::azure(config),
        }
    }

    fn build(config: &Config, target: Target) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            target: Arc::new(target),
            client,
        })
    }

    /// The provider this backend talks to.
    #[must_use]
    pub fn provider(&self) -> Provider {
        match *self.target {
            Target::OpenAI { .. } => Provider::OpenAI,
            Target::Azure { .. } => Provider::Azure,
        }
    }

    /// Build the chat completions URL. For Azure the model is the deployment.
    pub(crate) fn chat_url(&self, model: &str) -> String {
        match &*self.target {
            Target::OpenAI { base_url, .. } => format!("{base_url}/chat/completions"),
            Target::Azure {
                endpoint,
                api_version,
                ..
            } => format!(
                "{endpoint}/openai/deployments/{model}/chat/completions?api-version={api_version}"
            ),
        }
    }

    fn build_request(&self, url: &str) -> RequestBuilder {
        let req = self
            .client
            .post(url)
            .header("Content-Type", "application/json");

        match &*self.target {
            Target::OpenAI {
                api_key,
                organization,
                ..
            } => {
                let req = req.header("Authorization", format!("Bearer {api_key}"));
                match organization {
                    Some(org) => req.header("OpenAI-Organization", org),
                    None => req,
                }
            }
            Target::Azure { api_key, .. } => req.header("api-key", api_key),
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = self.chat_url(&request.model);
        tracing::debug!(backend = self.name(), %url, stream = request.stream, "Sending chat completion");

        let response = self.build_request(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        Ok(response)
    }

    /// Parse an error response from the provider.
    pub(crate) fn parse_error(&self, status: u16, body: &str) -> Error {
        let name = self.name();

        let (message, code) = match serde_json::from_str::<ErrorResponse>(body) {
            Ok(resp) => {
                let code = resp
                    .error
                    .code
                    .map(|c| match c {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .or(resp.error.error_type);
                (resp.error.message, code)
            }
            Err(_) => (format!("HTTP {status}: {body}"), None),
        };

        match status {
            401 | 403 => Error::auth(name, message),
            _ => Error::provider_status(name, status, code, message),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAIBackend {
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        let mut body = request.clone();
        body.stream = false;
        body.stream_options = None;

        let response = self.send(&body).await?;
        let response_text = response.text().await?;

        serde_json::from_str(&response_text).map_err(|e| {
            Error::provider(
                self.name(),
                format!("invalid chat completion response: {e}, response: {response_text}"),
            )
        })
    }

    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        let body = request.to_streaming();
        let response = self.send(&body).await?;
        Ok(Box::pin(SseStream::new(Box::pin(response.bytes_stream()))))
    }

    fn name(&self) -> &'static str {
        match *self.target {
            Target::OpenAI { .. } => "openai",
            Target::Azure { .. } => "azure",
        }
    }
}
