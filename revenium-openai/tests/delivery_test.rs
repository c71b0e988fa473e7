//! Metering delivery against a mock collector.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::time::{Duration, Instant};

use chrono::Utc;
use revenium_openai::metering::{CallInfo, MeteringClient, MeteringEvent, USER_AGENT};
use revenium_openai::{Config, ErrorKind, Provider, UsageMetadata};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{METER_PATH, METERING_KEY};

fn event() -> MeteringEvent {
    MeteringEvent::error(
        "gpt-4o",
        CallInfo {
            provider: Provider::OpenAI,
            is_streamed: false,
            request_time: Utc::now(),
            duration: Duration::from_millis(42),
            metadata: UsageMetadata::new().trace_id("trace-1"),
        },
        "upstream failed",
    )
}

fn client(server: &MockServer) -> MeteringClient {
    let config = Config::new(METERING_KEY).with_metering_base_url(server.uri());
    MeteringClient::new(&config).unwrap()
}

#[tokio::test]
async fn sends_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .and(header("x-api-key", METERING_KEY))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).deliver(&event()).await.unwrap();

    let events = common::metering_events(&server).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["stopReason"], "ERROR");
    assert_eq!(events[0]["errorReason"], "upstream failed");
    assert_eq!(events[0]["requestDuration"], 42);
    assert_eq!(events[0]["traceId"], "trace-1");
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    client(&server).deliver(&event()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(common::metering_events(&server).await.len(), 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .respond_with(ResponseTemplate::new(422).set_body_string("missing field"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).deliver(&event()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status_code(), Some(422));
    assert!(err.to_string().contains("missing field"));
    assert_eq!(common::metering_events(&server).await.len(), 1);
}

#[tokio::test]
async fn gives_up_after_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(METER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).deliver(&event()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Metering);
    assert!(err.to_string().contains("after 3 attempts"));
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn transport_failures_are_retried() {
    let config = Config::new(METERING_KEY).with_metering_base_url("http://127.0.0.1:1");
    let err = MeteringClient::new(&config)
        .unwrap()
        .deliver(&event())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Metering);
    match err {
        revenium_openai::Error::Metering { source, .. } => {
            assert_eq!(source.unwrap().kind(), ErrorKind::Network);
        }
        other => panic!("unexpected error: {other}"),
    }
}
