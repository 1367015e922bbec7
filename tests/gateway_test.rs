//! HTTP-level tests for the stream-control gateway

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fleetcam::stream::{StreamBackend, StreamError, StreamGateway};

fn gateway(server: &MockServer) -> StreamGateway {
    StreamGateway::new(server.uri(), Duration::from_secs(5))
}

#[tokio::test]
async fn start_returns_stream_endpoints() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/start"))
        .and(body_json(json!({"imei": "123456789012345", "cameraIndex": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "streamUrl": "rtmp://media/live/123456789012345",
            "hlsUrl": "http://media/hls/123456789012345/0.m3u8"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let endpoints = gateway(&server)
        .start("123456789012345", 0)
        .await
        .unwrap();
    assert_eq!(endpoints.stream_url, "rtmp://media/live/123456789012345");
    assert_eq!(endpoints.hls_url, "http://media/hls/123456789012345/0.m3u8");
}

#[tokio::test]
async fn start_rejection_carries_backend_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "device offline"
        })))
        .mount(&server)
        .await;

    let error = gateway(&server).start("123", 1).await.unwrap_err();
    match error {
        StreamError::StartRejected { message, .. } => assert_eq!(message, "device offline"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn start_http_error_is_rejection_with_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/start"))
        .respond_with(ResponseTemplate::new(503).set_body_string("encoder pool exhausted"))
        .mount(&server)
        .await;

    let error = gateway(&server).start("123", 0).await.unwrap_err();
    match error {
        StreamError::StartRejected { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "encoder pool exhausted");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn start_without_urls_is_a_backend_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let error = gateway(&server).start("123", 0).await.unwrap_err();
    assert!(matches!(error, StreamError::Backend(_)));
}

#[tokio::test]
async fn stop_is_safe_on_unknown_imei() {
    let server = MockServer::start().await;

    // The backend treats stop for an unknown or already-stopped device as a
    // successful no-op
    Mock::given(method("POST"))
        .and(path("/stream/stop"))
        .and(body_json(json!({"imei": "000000000000000"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server).stop("000000000000000").await.unwrap();
}

#[tokio::test]
async fn auth_token_is_forwarded_as_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/stop"))
        .and(header("authorization", "Bearer fleet-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = StreamGateway::new(server.uri(), Duration::from_secs(5))
        .with_auth_token(Some("fleet-token".to_string()));
    gateway.stop("123").await.unwrap();
}

#[tokio::test]
async fn detached_stop_reaches_the_backend() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/stream/stop"))
        .and(body_json(json!({"imei": "123"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    // The response is not awaited, but the handle resolves once the
    // request has been dispatched
    let dispatch = gateway(&server).stop_detached("123");
    tokio::time::timeout(Duration::from_secs(2), dispatch)
        .await
        .unwrap()
        .unwrap();
    server.verify().await;
}
