//! Standardized stop reasons for metering events.
//!
//! Providers report a free-form `finish_reason`; the collector only accepts a
//! closed vocabulary. [`StopReason::from_finish_reason`] maps one onto the
//! other and never fails.

use serde::{Deserialize, Serialize};

/// Reason why a completion ended, as understood by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    /// Natural end of the response (including tool calls).
    #[default]
    End,
    /// A stop sequence was hit.
    EndSequence,
    /// The request timed out.
    Timeout,
    /// The token limit was reached.
    TokenLimit,
    /// A cost limit was reached.
    CostLimit,
    /// A completion limit was reached.
    CompletionLimit,
    /// The call failed or content was filtered.
    Error,
    /// The call was cancelled.
    Cancelled,
}

impl StopReason {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::End => "END",
            Self::EndSequence => "END_SEQUENCE",
            Self::Timeout => "TIMEOUT",
            Self::TokenLimit => "TOKEN_LIMIT",
            Self::CostLimit => "COST_LIMIT",
            Self::CompletionLimit => "COMPLETION_LIMIT",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Maps an OpenAI / Azure OpenAI `finish_reason` (case-insensitive).
    ///
    /// - `stop` → [`StopReason::End`]
    /// - `length` → [`StopReason::TokenLimit`]
    /// - `content_filter` → [`StopReason::Error`]
    /// - `tool_calls`, `function_call` → [`StopReason::End`]
    ///
    /// An empty string yields `fallback` silently; any other value yields
    /// `fallback` with a warning so new provider values show up in logs.
    #[must_use]
    pub fn from_finish_reason(finish_reason: &str, fallback: Self) -> Self {
        if finish_reason.is_empty() {
            return fallback;
        }

        match finish_reason.to_ascii_lowercase().as_str() {
            "stop" | "tool_calls" | "function_call" => Self::End,
            "length" => Self::TokenLimit,
            "content_filter" => Self::Error,
            _ => {
                tracing::warn!(
                    "Unknown finish_reason {finish_reason:?}, using fallback {fallback}"
                );
                fallback
            }
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
