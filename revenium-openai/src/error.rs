//! Error types for the metering middleware.
//!
//! [`Error`] covers both sides of the interceptor: failures of the wrapped
//! chat-completion call (returned to the caller unchanged) and failures of the
//! metering path (logged by the delivery task and never surfaced to the
//! caller).

/// Result type alias for middleware operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for middleware operations.
///
/// Each variant is one category of the failure taxonomy so callers can
/// pattern-match on specific cases (e.g. retrying transient errors).
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration.
    #[error("[CONFIG_ERROR] {0}")]
    Config(String),

    /// The upstream chat-completion call failed.
    #[error("[PROVIDER_ERROR] [{provider}] {message}")]
    Provider {
        /// Backend name (e.g. "openai", "azure").
        provider: String,
        /// Error description.
        message: String,
        /// HTTP status returned by the provider, if any.
        status: Option<u16>,
        /// Error code reported by the provider, if any.
        code: Option<String>,
    },

    /// Metering delivery failed after exhausting retries, or the payload
    /// could not be built.
    #[error("[METERING_ERROR] {message}{}", source_suffix(.source.as_deref()))]
    Metering {
        /// Error description.
        message: String,
        /// The last underlying failure.
        source: Option<Box<Error>>,
    },

    /// Transport-level failure (connect, timeout, TLS...).
    #[error("[NETWORK_ERROR] {0}")]
    Network(String),

    /// The collector rejected the payload (HTTP 4xx). Never retried.
    #[error("[VALIDATION_ERROR] HTTP {status}: {message}")]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Response body or description.
        message: String,
    },

    /// Authentication or authorization failure.
    #[error("[AUTH_ERROR] [{provider}] {message}")]
    Auth {
        /// Backend name.
        provider: String,
        /// Error description.
        message: String,
    },

    /// Failure while consuming a streaming response.
    #[error("[STREAMING_ERROR] {0}")]
    Streaming(String),

    /// Internal error (serialization, runtime...).
    #[error("[INTERNAL_ERROR] {0}")]
    Internal(String),
}

fn source_suffix(source: Option<&Error>) -> String {
    source.map_or_else(String::new, |e| format!(": {e}"))
}

/// Categories of [`Error`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Configuration error.
    Config,
    /// Upstream provider error.
    Provider,
    /// Metering delivery error.
    Metering,
    /// Network error.
    Network,
    /// Collector validation error.
    Validation,
    /// Authentication error.
    Auth,
    /// Streaming error.
    Streaming,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// Returns the wire-style name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Provider => "PROVIDER_ERROR",
            Self::Metering => "METERING_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::Streaming => "STREAMING_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a provider error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: None,
            code: None,
        }
    }

    /// Create a provider error carrying the HTTP status and provider code.
    #[must_use]
    pub fn provider_status(
        provider: impl Into<String>,
        status: u16,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status: Some(status),
            code,
        }
    }

    /// Create a metering error.
    #[must_use]
    pub fn metering(message: impl Into<String>, source: Option<Self>) -> Self {
        Self::Metering {
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(status: u16, message: impl Into<String>) -> Self {
        Self::Validation {
            status,
            message: message.into(),
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Auth {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a streaming error.
    #[must_use]
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming(message.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Metering { .. } => ErrorKind::Metering,
            Self::Network(_) => ErrorKind::Network,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Streaming(_) => ErrorKind::Streaming,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::Validation { status, .. } => Some(*status),
            Self::Metering { source, .. } => source.as_deref().and_then(Self::status_code),
            _ => None,
        }
    }

    /// Returns `true` if the collector rejected the payload.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this is a retryable error.
    ///
    /// Validation rejections and configuration problems never succeed on a
    /// second attempt; transport failures and 5xx responses may.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Metering { source, .. } => match source.as_deref() {
                Some(inner) => inner.is_retryable(),
                None => true,
            },
            Self::Provider { status, .. } => status.is_some_and(|s| s == 429 || s >= 500),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {err}"))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {err}"))
    }
}
