//! Metering event construction.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::metadata::UsageMetadata;
use crate::provider::Provider;
use crate::stop_reason::StopReason;
use crate::types::ChatCompletion;

/// Value of `middlewareSource` on every event.
pub const MIDDLEWARE_SOURCE: &str = "rust";

/// Facts about one provider call, shared by both event builders.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Provider that served (or failed) the call.
    pub provider: Provider,
    /// Whether the call was a streaming call.
    pub is_streamed: bool,
    /// Taken immediately before the provider call.
    pub request_time: DateTime<Utc>,
    /// Wall-clock duration of the call.
    pub duration: Duration,
    /// Merged usage metadata.
    pub metadata: UsageMetadata,
}

/// When the first content arrived on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirstToken {
    /// Timestamp of the first chunk carrying a choice.
    pub at: DateTime<Utc>,
    /// Delay between the request and that chunk.
    pub after: Duration,
}

/// One usage record for the collector.
///
/// Built once per finished call and handed to delivery as-is. Serializes to
/// the collector's camelCase body; allow-listed metadata is added by
/// [`MeteringEvent::to_payload`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteringEvent {
    /// Why the completion ended.
    pub stop_reason: StopReason,
    /// Always `AI`.
    pub cost_type: &'static str,
    /// Whether the call streamed.
    pub is_streamed: bool,
    /// Always `CHAT`.
    pub operation_type: &'static str,
    /// Prompt tokens.
    pub input_token_count: u64,
    /// Completion tokens.
    pub output_token_count: u64,
    /// Reasoning tokens (o-series models).
    pub reasoning_token_count: u64,
    /// Always 0; OpenAI does not report cache writes.
    pub cache_creation_token_count: u64,
    /// Prompt tokens served from cache.
    pub cache_read_token_count: u64,
    /// Total tokens.
    pub total_token_count: u64,
    /// Model reported by the provider, or the requested model on error.
    pub model: String,
    /// Locally generated ID; a metadata `transactionId` replaces it on the wire.
    pub transaction_id: String,
    /// When the response (or error) arrived.
    #[serde(serialize_with = "timestamp")]
    pub response_time: DateTime<Utc>,
    /// Call duration in milliseconds.
    pub request_duration: u64,
    /// Provider that served the call.
    pub provider: Provider,
    /// Taken immediately before the provider call.
    #[serde(serialize_with = "timestamp")]
    pub request_time: DateTime<Utc>,
    /// First-token time, or the request time when unknown.
    #[serde(serialize_with = "timestamp")]
    pub completion_start_time: DateTime<Utc>,
    /// Milliseconds until the first chunk with a choice; 0 when not streamed.
    pub time_to_first_token: u64,
    /// Always [`MIDDLEWARE_SOURCE`].
    pub middleware_source: &'static str,
    /// Backend configuration fingerprint, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// Error text for failed calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Merged metadata; allow-listed keys are added by [`MeteringEvent::to_payload`].
    #[serde(skip)]
    pub metadata: UsageMetadata,
}

impl MeteringEvent {
    /// Event for a call that produced a response.
    ///
    /// `first_token` is `None` for non-streaming calls and for streams that
    /// never carried a choice; completion start then equals the request time.
    #[must_use]
    pub fn success(response: &ChatCompletion, call: CallInfo, first_token: Option<FirstToken>) -> Self {
        let usage = response.usage.unwrap_or_default();
        let stop_reason = StopReason::from_finish_reason(response.finish_reason(), StopReason::End);
        let system_fingerprint = response
            .system_fingerprint
            .clone()
            .filter(|fp| !fp.is_empty());

        Self {
            stop_reason,
            input_token_count: usage.prompt_tokens,
            output_token_count: usage.completion_tokens,
            reasoning_token_count: usage.reasoning_tokens(),
            cache_read_token_count: usage.cached_tokens(),
            total_token_count: usage.total_tokens,
            completion_start_time: first_token.map_or(call.request_time, |ft| ft.at),
            time_to_first_token: first_token.map_or(0, |ft| millis(ft.after)),
            system_fingerprint,
            ..Self::base(response.model.clone(), call)
        }
    }

    /// Event for a call that failed. All counters are zero.
    #[must_use]
    pub fn error(model: impl Into<String>, call: CallInfo, error_reason: impl Into<String>) -> Self {
        Self {
            stop_reason: StopReason::Error,
            error_reason: Some(error_reason.into()),
            ..Self::base(model.into(), call)
        }
    }

    fn base(model: String, call: CallInfo) -> Self {
        Self {
            stop_reason: StopReason::End,
            cost_type: "AI",
            is_streamed: call.is_streamed,
            operation_type: "CHAT",
            input_token_count: 0,
            output_token_count: 0,
            reasoning_token_count: 0,
            cache_creation_token_count: 0,
            cache_read_token_count: 0,
            total_token_count: 0,
            model,
            transaction_id: transaction_id(),
            response_time: Utc::now(),
            request_duration: millis(call.duration),
            provider: call.provider,
            request_time: call.request_time,
            completion_start_time: call.request_time,
            time_to_first_token: 0,
            middleware_source: MIDDLEWARE_SOURCE,
            system_fingerprint: None,
            error_reason: None,
            metadata: call.metadata,
        }
    }

    /// JSON body for the collector.
    ///
    /// Allow-listed metadata is written after the base fields, so a metadata
    /// `transactionId` replaces the generated one.
    pub fn to_payload(&self) -> Result<Value> {
        let mut payload = serde_json::to_value(self)?;
        let Value::Object(fields) = &mut payload else {
            return Err(Error::internal("metering event did not serialize to an object"));
        };

        for (key, value) in self.metadata.allowed() {
            fields.insert(key.to_owned(), value.clone());
        }

        Ok(payload)
    }
}

/// Local transaction ID derived from the nanosecond clock.
#[must_use]
pub fn transaction_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{nanos}-{}", nanos % 1_000_000)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn timestamp<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::backend::MockReply;
    use crate::usage::CompletionUsage;

    fn call(metadata: UsageMetadata) -> CallInfo {
        CallInfo {
            provider: Provider::OpenAI,
            is_streamed: false,
            request_time: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            duration: Duration::from_millis(1234),
            metadata,
        }
    }

    fn completion(usage: CompletionUsage) -> ChatCompletion {
        match MockReply::text("gpt-4o", "hi", usage) {
            MockReply::Completion(c) => c,
            _ => unreachable!(),
        }
    }

    mod success {
        use super::*;

        #[test]
        fn carries_usage_and_stop_reason() {
            let mut response = completion(CompletionUsage::new(10, 5).with_cached(4).with_reasoning(2));
            response.choices[0].finish_reason = Some("length".to_owned());
            response.system_fingerprint = Some("fp_1".to_owned());

            let event = MeteringEvent::success(&response, call(UsageMetadata::new()), None);
            assert_eq!(event.stop_reason, StopReason::TokenLimit);
            assert_eq!(event.input_token_count, 10);
            assert_eq!(event.output_token_count, 5);
            assert_eq!(event.total_token_count, 15);
            assert_eq!(event.cache_read_token_count, 4);
            assert_eq!(event.reasoning_token_count, 2);
            assert_eq!(event.cache_creation_token_count, 0);
            assert_eq!(event.request_duration, 1234);
            assert_eq!(event.time_to_first_token, 0);
            assert_eq!(event.completion_start_time, event.request_time);
            assert_eq!(event.system_fingerprint.as_deref(), Some("fp_1"));
            assert!(event.error_reason.is_none());
        }

        #[test]
        fn first_token_sets_completion_start() {
            let call = call(UsageMetadata::new());
            let first = FirstToken {
                at: call.request_time + chrono::Duration::milliseconds(250),
                after: Duration::from_millis(250),
            };
            let event = MeteringEvent::success(&completion(CompletionUsage::new(1, 1)), call, Some(first));
            assert_eq!(event.time_to_first_token, 250);
            assert_eq!(event.completion_start_time, first.at);
        }

        #[test]
        fn empty_finish_reason_is_end() {
            let mut response = completion(CompletionUsage::new(1, 1));
            response.choices.clear();
            let event = MeteringEvent::success(&response, call(UsageMetadata::new()), None);
            assert_eq!(event.stop_reason, StopReason::End);
        }
    }

    mod error {
        use super::*;

        #[test]
        fn zero_counters_and_reason() {
            let event = MeteringEvent::error("gpt-4o", call(UsageMetadata::new()), "boom");
            assert_eq!(event.stop_reason, StopReason::Error);
            assert_eq!(event.total_token_count, 0);
            assert_eq!(event.time_to_first_token, 0);
            assert_eq!(event.completion_start_time, event.request_time);
            assert_eq!(event.error_reason.as_deref(), Some("boom"));
        }
    }

    mod payload {
        use super::*;

        #[test]
        fn wire_keys_and_formats() {
            let event = MeteringEvent::success(
                &completion(CompletionUsage::new(10, 5)),
                call(UsageMetadata::new()),
                None,
            );
            let payload = event.to_payload().unwrap();

            assert_eq!(payload["stopReason"], "END");
            assert_eq!(payload["costType"], "AI");
            assert_eq!(payload["operationType"], "CHAT");
            assert_eq!(payload["isStreamed"], false);
            assert_eq!(payload["inputTokenCount"], 10);
            assert_eq!(payload["cacheCreationTokenCount"], 0);
            assert_eq!(payload["provider"], "OPENAI");
            assert_eq!(payload["middlewareSource"], MIDDLEWARE_SOURCE);
            assert_eq!(payload["requestTime"], "2025-01-02T03:04:05.000Z");
            assert_eq!(payload["completionStartTime"], "2025-01-02T03:04:05.000Z");
            assert!(payload.get("systemFingerprint").is_none());
            assert!(payload.get("errorReason").is_none());
            assert!(payload.get("metadata").is_none());
        }

        #[test]
        fn allowed_metadata_is_merged_and_others_dropped() {
            let metadata = UsageMetadata::new()
                .organization_id("org-1")
                .with("subscriber", json!({"id": "u1"}))
                .with("secret", "nope");
            let event = MeteringEvent::error("gpt-4o", call(metadata), "boom");
            let payload = event.to_payload().unwrap();

            assert_eq!(payload["organizationId"], "org-1");
            assert_eq!(payload["subscriber"], json!({"id": "u1"}));
            assert_eq!(payload["errorReason"], "boom");
            assert!(payload.get("secret").is_none());
        }

        #[test]
        fn metadata_transaction_id_overrides_generated() {
            let metadata = UsageMetadata::new().transaction_id("txn-from-caller");
            let event = MeteringEvent::error("gpt-4o", call(metadata), "boom");
            assert_ne!(event.transaction_id, "txn-from-caller");

            let payload = event.to_payload().unwrap();
            assert_eq!(payload["transactionId"], "txn-from-caller");
        }
    }

    #[test]
    fn transaction_id_shape() {
        let id = transaction_id();
        let (nanos, suffix) = id.split_once('-').unwrap();
        let nanos: i64 = nanos.parse().unwrap();
        assert_eq!(suffix.parse::<i64>().unwrap(), nanos % 1_000_000);
    }
}
