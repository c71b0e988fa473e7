//! Provider identity and detection.

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// The upstream chat-completion service a client talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    /// Native OpenAI API.
    #[default]
    OpenAI,
    /// Azure-hosted OpenAI deployment.
    Azure,
}

impl Provider {
    /// Detects the provider from configuration.
    ///
    /// First match wins:
    /// 1. Azure explicitly disabled → [`Provider::OpenAI`]
    /// 2. Azure API key and endpoint both present → [`Provider::Azure`]
    /// 3. Base URL override looks like an Azure URL → [`Provider::Azure`]
    /// 4. Otherwise → [`Provider::OpenAI`]
    #[must_use]
    pub fn detect(config: Option<&Config>) -> Self {
        let Some(config) = config else {
            return Self::OpenAI;
        };

        if config.azure_disabled {
            tracing::debug!("Azure OpenAI is explicitly disabled, using OpenAI native API");
            return Self::OpenAI;
        }

        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if present(&config.azure_api_key) && present(&config.azure_endpoint) {
            tracing::debug!("Azure OpenAI credentials detected, using Azure OpenAI");
            return Self::Azure;
        }

        if config.base_url.as_deref().is_some_and(is_azure_url) {
            tracing::debug!("Azure OpenAI URL detected in base URL, using Azure OpenAI");
            return Self::Azure;
        }

        tracing::debug!("No Azure configuration detected, using OpenAI native API");
        Self::OpenAI
    }

    /// Returns the wire representation used in metering events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI",
            Self::Azure => "AZURE",
        }
    }

    /// Returns `true` for [`Provider::Azure`].
    #[must_use]
    pub const fn is_azure(&self) -> bool {
        matches!(self, Self::Azure)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks whether a URL points at an Azure OpenAI resource.
#[must_use]
pub fn is_azure_url(url: &str) -> bool {
    let url = url.to_lowercase();
    ["azure.com", "openai.azure.com", ".azure.", "azureopenai"]
        .iter()
        .any(|pattern| url.contains(pattern))
}
