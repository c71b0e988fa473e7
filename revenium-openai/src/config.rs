//! Middleware configuration.
//!
//! [`Config`] holds both halves of the setup: credentials for the wrapped
//! chat-completion provider (OpenAI or Azure OpenAI) and the metering
//! collector settings. It is immutable once handed to a client.

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

/// What to do when a call against Azure OpenAI fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Return the Azure error to the caller.
    Disabled,
    /// Retry the same request once against the native OpenAI API.
    ///
    /// Only takes effect when an OpenAI API key is configured.
    #[default]
    OpenAI,
}

/// Configuration for the metering middleware.
#[derive(Clone)]
pub struct Config {
    /// OpenAI API key.
    pub openai_api_key: Option<String>,
    /// Optional OpenAI organization ID.
    pub openai_org_id: Option<String>,
    /// Optional override of the OpenAI API base URL.
    pub base_url: Option<String>,

    /// Metering API key (`hak_...`).
    pub metering_api_key: String,
    /// Metering collector base URL, already normalized.
    pub metering_base_url: String,

    /// Azure OpenAI API key.
    pub azure_api_key: Option<String>,
    /// Azure OpenAI resource endpoint.
    pub azure_endpoint: Option<String>,
    /// Azure OpenAI API version.
    pub azure_api_version: Option<String>,
    /// Forces the native OpenAI API even when Azure credentials are present.
    pub azure_disabled: bool,

    /// Routing behavior when Azure calls fail.
    pub fallback: FallbackPolicy,
    /// Timeout for chat-completion requests.
    pub request_timeout: Option<Duration>,
    /// Enables verbose diagnostics.
    pub debug: bool,
}

impl Config {
    /// Default metering collector base URL.
    pub const DEFAULT_METERING_BASE_URL: &'static str = "https://api.revenium.ai";
    /// Default OpenAI API base URL.
    pub const DEFAULT_OPENAI_BASE_URL: &'static str = "https://api.openai.com/v1";
    /// Default Azure OpenAI API version.
    pub const DEFAULT_AZURE_API_VERSION: &'static str = "2024-10-21";
    /// Prefix every metering API key carries.
    pub const METERING_KEY_PREFIX: &'static str = "hak_";

    /// Creates a configuration with the given metering API key and defaults
    /// for everything else.
    #[must_use]
    pub fn new(metering_api_key: impl Into<String>) -> Self {
        Self {
            metering_api_key: metering_api_key.into(),
            ..Self::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Reads from:
    /// - `OPENAI_API_KEY`, `OPENAI_ORG_ID`, `OPENAI_BASE_URL`
    /// - `REVENIUM_METERING_API_KEY`, `REVENIUM_METERING_BASE_URL`
    /// - `AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_VERSION`
    /// - `REVENIUM_AZURE_DISABLE` (`1` or `true`)
    /// - `REVENIUM_DEBUG` (`true`)
    ///
    /// The result is not validated; see [`Config::validate`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let azure_disable = var("REVENIUM_AZURE_DISABLE");
        let config = Self {
            openai_api_key: var("OPENAI_API_KEY"),
            openai_org_id: var("OPENAI_ORG_ID"),
            base_url: var("OPENAI_BASE_URL"),
            metering_api_key: var("REVENIUM_METERING_API_KEY").unwrap_or_default(),
            metering_base_url: normalize_base_url(
                var("REVENIUM_METERING_BASE_URL").as_deref().unwrap_or_default(),
            ),
            azure_api_key: var("AZURE_OPENAI_API_KEY"),
            azure_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            azure_api_version: var("AZURE_OPENAI_API_VERSION"),
            azure_disabled: matches!(azure_disable.as_deref(), Some("1" | "true")),
            fallback: FallbackPolicy::default(),
            request_timeout: Some(Duration::from_secs(120)),
            debug: var("REVENIUM_DEBUG").as_deref() == Some("true"),
        };

        tracing::debug!("Loaded configuration from environment variables");
        config
    }

    /// Sets the OpenAI API key.
    #[must_use]
    pub fn with_openai_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    /// Sets the OpenAI organization ID.
    #[must_use]
    pub fn with_openai_org_id(mut self, org: impl Into<String>) -> Self {
        self.openai_org_id = Some(org.into());
        self
    }

    /// Sets the OpenAI API base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the metering API key.
    #[must_use]
    pub fn with_metering_api_key(mut self, key: impl Into<String>) -> Self {
        self.metering_api_key = key.into();
        self
    }

    /// Sets the metering collector base URL. The URL is normalized.
    #[must_use]
    pub fn with_metering_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.metering_base_url = normalize_base_url(url.as_ref());
        self
    }

    /// Sets the Azure OpenAI API key.
    #[must_use]
    pub fn with_azure_api_key(mut self, key: impl Into<String>) -> Self {
        self.azure_api_key = Some(key.into());
        self
    }

    /// Sets the Azure OpenAI endpoint.
    #[must_use]
    pub fn with_azure_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.azure_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the Azure OpenAI API version.
    #[must_use]
    pub fn with_azure_api_version(mut self, version: impl Into<String>) -> Self {
        self.azure_api_version = Some(version.into());
        self
    }

    /// Enables or disables Azure OpenAI routing.
    #[must_use]
    pub const fn with_azure_disabled(mut self, disabled: bool) -> Self {
        self.azure_disabled = disabled;
        self
    }

    /// Sets the Azure failure policy.
    #[must_use]
    pub const fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sets the chat-completion request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Enables or disables verbose diagnostics.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The Azure API version, falling back to
    /// [`Config::DEFAULT_AZURE_API_VERSION`].
    #[must_use]
    pub fn azure_api_version(&self) -> &str {
        self.azure_api_version
            .as_deref()
            .unwrap_or(Self::DEFAULT_AZURE_API_VERSION)
    }

    /// The OpenAI API base URL, falling back to
    /// [`Config::DEFAULT_OPENAI_BASE_URL`].
    #[must_use]
    pub fn openai_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_OPENAI_BASE_URL)
    }

    /// The full collector endpoint for chat completions.
    #[must_use]
    pub fn metering_endpoint(&self) -> String {
        format!("{}/meter/v2/ai/completions", self.metering_base_url)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.metering_api_key.is_empty() {
            return Err(Error::config("REVENIUM_METERING_API_KEY is required"));
        }

        if !self.metering_api_key.starts_with(Self::METERING_KEY_PREFIX) {
            return Err(Error::config("invalid Revenium API key format"));
        }

        let url = Url::parse(&self.metering_base_url).map_err(|e| {
            Error::config(format!(
                "invalid metering base URL {:?}: {e}",
                self.metering_base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "metering base URL must use http or https, got {}",
                url.scheme()
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_org_id: None,
            base_url: None,
            metering_api_key: String::new(),
            metering_base_url: Self::DEFAULT_METERING_BASE_URL.to_owned(),
            azure_api_key: None,
            azure_endpoint: None,
            azure_api_version: None,
            azure_disabled: false,
            fallback: FallbackPolicy::default(),
            request_timeout: Some(Duration::from_secs(120)),
            debug: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: Option<&String>) -> Option<&'static str> {
            value.map(|_| "<redacted>")
        }

        f.debug_struct("Config")
            .field("openai_api_key", &redact(self.openai_api_key.as_ref()))
            .field("openai_org_id", &self.openai_org_id)
            .field("base_url", &self.base_url)
            .field("metering_api_key", &redact(Some(&self.metering_api_key)))
            .field("metering_base_url", &self.metering_base_url)
            .field("azure_api_key", &redact(self.azure_api_key.as_ref()))
            .field("azure_endpoint", &self.azure_endpoint)
            .field("azure_api_version", &self.azure_api_version)
            .field("azure_disabled", &self.azure_disabled)
            .field("fallback", &self.fallback)
            .field("request_timeout", &self.request_timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

/// Normalizes a collector base URL to a bare origin.
///
/// Strips one trailing slash, then a legacy `/meter/v2`, `/meter` or `/v2`
/// suffix. The endpoint path is appended at send time. An empty input yields
/// [`Config::DEFAULT_METERING_BASE_URL`].
#[must_use]
pub fn normalize_base_url(base_url: &str) -> String {
    if base_url.is_empty() {
        return Config::DEFAULT_METERING_BASE_URL.to_owned();
    }

    let trimmed = base_url.strip_suffix('/').unwrap_or(base_url);

    for legacy in ["/meter/v2", "/meter", "/v2"] {
        if let Some(origin) = trimmed.strip_suffix(legacy) {
            return origin.to_owned();
        }
    }

    trimmed.to_owned()
}
