//! HTTP backend against a mock OpenAI / Azure OpenAI server.

#![allow(clippy::unwrap_used, clippy::panic, clippy::clone_on_ref_ptr)]

mod common;

use futures::StreamExt;
use revenium_openai::prelude::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::METERING_KEY;

fn openai_config(server: &MockServer) -> Config {
    Config::new(METERING_KEY)
        .with_metering_base_url(server.uri())
        .with_openai_api_key("sk-test")
        .with_base_url(format!("{}/v1", server.uri()))
}

fn azure_config(server: &MockServer) -> Config {
    Config::new(METERING_KEY)
        .with_metering_base_url(server.uri())
        .with_azure_api_key("az-key")
        .with_azure_endpoint(server.uri())
}

fn sse_body(events: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

mod openai {
    use super::*;

    #[tokio::test]
    async fn create_posts_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "stream": false })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::completion_body("gpt-4o", "pong", 4, 2)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::openai(&openai_config(&server)).unwrap();
        assert_eq!(backend.provider(), Provider::OpenAI);

        let response = backend
            .create(&ChatCompletionRequest::new("gpt-4o").user("ping"))
            .await
            .unwrap();

        assert_eq!(response.text(), Some("pong"));
        assert_eq!(response.usage.unwrap().total_tokens, 6);
        assert_eq!(response.system_fingerprint.as_deref(), Some("fp_test"));
    }

    #[tokio::test]
    async fn stream_requests_usage_and_parses_events() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            json!({ "id": "c1", "object": "chat.completion.chunk", "model": "gpt-4o",
                    "choices": [{ "index": 0, "delta": { "role": "assistant", "content": "Hi" } }] }),
            json!({ "id": "c1", "object": "chat.completion.chunk", "model": "gpt-4o",
                    "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }] }),
            json!({ "id": "c1", "object": "chat.completion.chunk", "model": "gpt-4o", "choices": [],
                    "usage": { "prompt_tokens": 8, "completion_tokens": 1, "total_tokens": 9 } }),
        ]);

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "stream": true,
                "stream_options": { "include_usage": true }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::openai(&openai_config(&server)).unwrap();
        let chunks: Vec<_> = backend
            .create_stream(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        let chunks: Vec<_> = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(chunks[0].text(), Some("Hi"));
        assert_eq!(chunks[1].finish_reason(), "stop");
        assert_eq!(chunks[2].usage.unwrap().total_tokens, 9);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::openai(&openai_config(&server)).unwrap();
        let err = backend
            .create(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.to_string().contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "message": "overloaded", "type": "server_error", "code": "overloaded" }
            })))
            .mount(&server)
            .await;

        let backend = OpenAIBackend::openai(&openai_config(&server)).unwrap();
        let err = backend
            .create(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(503));
        assert!(err.is_retryable());
        match err {
            Error::Provider { code, .. } => assert_eq!(code.as_deref(), Some("overloaded")),
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod azure {
    use super::*;

    #[tokio::test]
    async fn create_targets_deployment_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/my-gpt4o/chat/completions"))
            .and(query_param("api-version", Config::DEFAULT_AZURE_API_VERSION))
            .and(header("api-key", "az-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::completion_body("gpt-4o", "from azure", 5, 5)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAIBackend::azure(&azure_config(&server)).unwrap();
        assert_eq!(backend.provider(), Provider::Azure);
        assert_eq!(backend.name(), "azure");

        let response = backend
            .create(&ChatCompletionRequest::new("my-gpt4o").user("hi"))
            .await
            .unwrap();
        assert_eq!(response.text(), Some("from azure"));
    }

    #[tokio::test]
    async fn azure_base_url_client_targets_deployment() {
        let server = common::collector().await;
        Mock::given(method("POST"))
            .and(path("/azureopenai/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", Config::DEFAULT_AZURE_API_VERSION))
            .and(header("api-key", "sk-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::completion_body("gpt-4o", "via base url", 2, 3)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = Config::new(METERING_KEY)
            .with_metering_base_url(server.uri())
            .with_openai_api_key("sk-test")
            .with_base_url(format!("{}/azureopenai/", server.uri()));
        let client = ReveniumOpenAI::new(config).unwrap();
        assert_eq!(client.provider(), Provider::Azure);

        let response = client
            .chat()
            .completions()
            .create(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap();
        assert_eq!(response.text(), Some("via base url"));

        client.flush().await;
        let events = common::metering_events(&server).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["provider"], "AZURE");
        assert_eq!(events[0]["totalTokenCount"], 5);
    }

    #[test]
    fn requires_key_and_endpoint() {
        let config = Config::new(METERING_KEY).with_azure_api_key("az-key");
        let err = OpenAIBackend::azure(&config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

mod end_to_end {
    use super::*;

    #[tokio::test]
    async fn metered_client_reports_provider_usage() {
        let server = common::collector().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::completion_body("gpt-4o-2024-08-06", "hello", 12, 8)),
            )
            .mount(&server)
            .await;

        let client = ReveniumOpenAI::new(openai_config(&server)).unwrap();
        let response = client
            .with_metadata(UsageMetadata::new().subscriber(&Subscriber::new("user-1").email("u@example.com")))
            .completions()
            .create(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap();
        assert_eq!(response.text(), Some("hello"));

        client.close().await;
        let events = common::metering_events(&server).await;
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event["provider"], "OPENAI");
        assert_eq!(event["model"], "gpt-4o-2024-08-06");
        assert_eq!(event["totalTokenCount"], 20);
        assert_eq!(event["systemFingerprint"], "fp_test");
        assert_eq!(event["subscriber"]["id"], "user-1");
        assert_eq!(event["subscriber"]["email"], "u@example.com");
    }

    #[tokio::test]
    async fn azure_outage_falls_back_to_openai() {
        let server = common::collector().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(common::completion_body("gpt-4o", "fallback", 1, 1)),
            )
            .mount(&server)
            .await;

        let config = azure_config(&server)
            .with_openai_api_key("sk-test")
            .with_base_url(format!("{}/v1", server.uri()));
        let client = ReveniumOpenAI::new(config).unwrap();
        assert_eq!(client.provider(), Provider::Azure);

        let response = client
            .chat()
            .completions()
            .create(&ChatCompletionRequest::new("gpt-4o").user("hi"))
            .await
            .unwrap();
        assert_eq!(response.text(), Some("fallback"));

        client.flush().await;
        let events = common::metering_events(&server).await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e["provider"] == "AZURE" && e["stopReason"] == "ERROR"));
        assert!(events.iter().any(|e| e["provider"] == "OPENAI" && e["stopReason"] == "END"));
    }
}
