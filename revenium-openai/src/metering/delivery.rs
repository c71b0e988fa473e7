//! Metering delivery to the collector.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};

use super::payload::MeteringEvent;

/// `User-Agent` sent with every metering request.
pub const USER_AGENT: &str = concat!("revenium-middleware-openai-rust/", env!("CARGO_PKG_VERSION"));

/// Bounded retry schedule for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubled for each later one.
    pub initial_backoff: Duration,
    /// Timeout of each attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the metering collector.
#[derive(Debug, Clone)]
pub struct MeteringClient {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl MeteringClient {
    /// Create a client for the collector configured in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_retry_policy(config, RetryPolicy::default())
    }

    /// Create a client with a custom retry schedule.
    pub fn with_retry_policy(config: &Config, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(retry.attempt_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.metering_endpoint(),
            api_key: config.metering_api_key.clone(),
            retry,
        })
    }

    /// The collector endpoint events are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The active retry schedule.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Deliver one event.
    ///
    /// Transport failures and non-4xx error statuses are retried with
    /// exponential backoff. A 4xx response aborts immediately with a
    /// validation error; exhausting all attempts yields a metering error
    /// wrapping the last failure.
    pub async fn deliver(&self, event: &MeteringEvent) -> Result<()> {
        let payload = event
            .to_payload()
            .map_err(|e| Error::metering("failed to serialize metering payload", Some(e)))?;

        let attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }

            match self.send(&payload).await {
                Ok(()) => {
                    tracing::debug!(attempt, "Metering data sent successfully");
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "Metering attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::metering(
            format!("metering failed after {attempts} attempts"),
            last_error,
        ))
    }

    async fn send(&self, payload: &Value) -> Result<()> {
        tracing::debug!(endpoint = %self.endpoint, "Sending metering request");
        tracing::trace!(%payload, "Metering payload");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("x-api-key", &self.api_key)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            return Err(Error::validation(
                status.as_u16(),
                format!("metering API returned {}: {body}", status.as_u16()),
            ));
        }

        Err(Error::metering(
            format!("metering API error: status {}: {body}", status.as_u16()),
            None,
        ))
    }
}
