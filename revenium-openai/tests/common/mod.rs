//! Shared helpers for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const METER_PATH: &str = "/meter/v2/ai/completions";
pub const METERING_KEY: &str = "hak_test_key";

/// A collector that accepts every event.
pub async fn collector() -> MockServer {
    let server = MockServer::start().await;
    mount_collector(&server, ResponseTemplate::new(200)).await;
    server
}

pub async fn mount_collector(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Bodies of every metering event the server received.
pub async fn metering_events(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.url.path() == METER_PATH)
        .map(|req| serde_json::from_slice(&req.body).unwrap())
        .collect()
}

/// A chat completion response body as OpenAI returns it.
pub fn completion_body(model: &str, content: &str, prompt: u64, completion: u64) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "system_fingerprint": "fp_test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        }
    })
}
