//! Usage metadata attached to metering events.
//!
//! Metadata is an open JSON object. Only the keys in
//! [`ALLOWED_METADATA_KEYS`] reach the collector; everything else stays local.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata keys forwarded to the collector.
pub const ALLOWED_METADATA_KEYS: &[&str] = &[
    "organizationId",
    "productId",
    "taskType",
    "taskId",
    "agent",
    "subscriptionId",
    "traceId",
    "transactionId",
    "subscriber",
    "responseQualityScore",
    "modelSource",
    "temperature",
    "mediationLatency",
    "traceType",
    "traceName",
    "environment",
    "region",
    "retryNumber",
    "credentialAlias",
    "parentTransactionId",
];

/// A subscriber identity, sent as the `subscriber` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Subscriber ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Subscriber email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Credential used by the subscriber.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<SubscriberCredential>,
}

impl Subscriber {
    /// Creates a subscriber with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the credential.
    #[must_use]
    pub fn credential(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credential = Some(SubscriberCredential {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// A named subscriber credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberCredential {
    /// Credential name (e.g. an API key alias).
    pub name: String,
    /// Credential value.
    pub value: String,
}

/// Caller-supplied tags for one call or one scope of calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageMetadata(Map<String, Value>);

impl UsageMetadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges two optional metadata sets; `overrides` wins key by key.
    ///
    /// Neither input is modified.
    #[must_use]
    pub fn merge(base: Option<&Self>, overrides: Option<&Self>) -> Self {
        let mut merged = base.cloned().unwrap_or_default();
        if let Some(overrides) = overrides {
            for (key, value) in &overrides.0 {
                merged.0.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    /// Sets an arbitrary key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an arbitrary key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` when no keys are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the allow-listed entries, in allow-list order.
    pub fn allowed(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        ALLOWED_METADATA_KEYS
            .iter()
            .filter_map(|key| self.0.get(*key).map(|value| (*key, value)))
    }

    /// Sets `organizationId`.
    #[must_use]
    pub fn organization_id(self, id: impl Into<String>) -> Self {
        self.with("organizationId", id.into())
    }

    /// Sets `productId`.
    #[must_use]
    pub fn product_id(self, id: impl Into<String>) -> Self {
        self.with("productId", id.into())
    }

    /// Sets `subscriptionId`.
    #[must_use]
    pub fn subscription_id(self, id: impl Into<String>) -> Self {
        self.with("subscriptionId", id.into())
    }

    /// Sets `taskType`.
    #[must_use]
    pub fn task_type(self, task_type: impl Into<String>) -> Self {
        self.with("taskType", task_type.into())
    }

    /// Sets `taskId`.
    #[must_use]
    pub fn task_id(self, id: impl Into<String>) -> Self {
        self.with("taskId", id.into())
    }

    /// Sets `agent`.
    #[must_use]
    pub fn agent(self, agent: impl Into<String>) -> Self {
        self.with("agent", agent.into())
    }

    /// Sets `traceId`.
    #[must_use]
    pub fn trace_id(self, id: impl Into<String>) -> Self {
        self.with("traceId", id.into())
    }

    /// Sets `transactionId`, replacing the generated one on the wire.
    #[must_use]
    pub fn transaction_id(self, id: impl Into<String>) -> Self {
        self.with("transactionId", id.into())
    }

    /// Sets `parentTransactionId`.
    #[must_use]
    pub fn parent_transaction_id(self, id: impl Into<String>) -> Self {
        self.with("parentTransactionId", id.into())
    }

    /// Sets `environment`.
    #[must_use]
    pub fn environment(self, environment: impl Into<String>) -> Self {
        self.with("environment", environment.into())
    }

    /// Sets `region`.
    #[must_use]
    pub fn region(self, region: impl Into<String>) -> Self {
        self.with("region", region.into())
    }

    /// Sets `responseQualityScore`.
    #[must_use]
    pub fn response_quality_score(self, score: f64) -> Self {
        self.with("responseQualityScore", score)
    }

    /// Sets `subscriber`.
    #[must_use]
    pub fn subscriber(self, subscriber: &Subscriber) -> Self {
        let value = serde_json::to_value(subscriber).unwrap_or(Value::Null);
        self.with("subscriber", value)
    }
}

impl From<Map<String, Value>> for UsageMetadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for UsageMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(value: Value) -> UsageMetadata {
        match value {
            Value::Object(map) => map.into(),
            _ => UsageMetadata::new(),
        }
    }

    mod merge {
        use super::*;

        #[test]
        fn override_wins_per_key() {
            let base = meta(json!({"a": 1, "b": 2}));
            let overrides = meta(json!({"b": 3, "c": 4}));
            let merged = UsageMetadata::merge(Some(&base), Some(&overrides));
            assert_eq!(merged, meta(json!({"a": 1, "b": 3, "c": 4})));
            assert_eq!(base, meta(json!({"a": 1, "b": 2})));
        }

        #[test]
        fn absent_override_returns_base() {
            let base = meta(json!({"a": 1}));
            assert_eq!(UsageMetadata::merge(Some(&base), None), base);
        }

        #[test]
        fn absent_base_copies_override() {
            let overrides = meta(json!({"c": 4}));
            assert_eq!(UsageMetadata::merge(None, Some(&overrides)), overrides);
        }

        #[test]
        fn both_absent_is_empty() {
            assert!(UsageMetadata::merge(None, None).is_empty());
        }
    }

    #[test]
    fn allowed_filters_unknown_keys() {
        let metadata = UsageMetadata::new()
            .organization_id("org-1")
            .trace_id("trace-9")
            .with("internalNote", "drop me");

        let keys: Vec<_> = metadata.allowed().map(|(k, _)| k).collect();
        assert_eq!(keys, ["organizationId", "traceId"]);
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn subscriber_serializes_as_object() {
        let subscriber = Subscriber::new("user-1")
            .email("user@example.com")
            .credential("api-key-alias", "sk-...abc");
        let metadata = UsageMetadata::new().subscriber(&subscriber);

        assert_eq!(
            metadata.get("subscriber"),
            Some(&json!({
                "id": "user-1",
                "email": "user@example.com",
                "credential": {"name": "api-key-alias", "value": "sk-...abc"}
            }))
        );
    }

    #[test]
    fn collects_from_pairs() {
        let metadata: UsageMetadata = [("taskType", "summarize"), ("agent", "bot")]
            .into_iter()
            .collect();
        assert_eq!(metadata.get("agent"), Some(&json!("bot")));
    }
}
