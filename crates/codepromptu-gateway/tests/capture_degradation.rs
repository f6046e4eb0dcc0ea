#![allow(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use futures::StreamExt;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

use codepromptu_gateway::{AppState, GatewayConfig, build_state, router};
use codepromptu_types::Provider;

const CHAT_REQUEST: &str = r#"{"model":"gpt-4","messages":[{"role":"user","content":"ping"}]}"#;

/// Stub provider that streams its response in chunks with pauses, so the
/// client can disconnect mid-body.
async fn start_streaming_stub(chunks: usize) -> SocketAddr {
    let app = Router::new().fallback(move |_request: Request| async move {
        let stream = futures::stream::iter(0..chunks).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, std::convert::Infallible>(format!("chunk-{i};"))
        });
        axum::response::Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .body(Body::from_stream(stream))
            .unwrap_or_default()
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn start_flaky_stub(failures: Arc<Mutex<u32>>) -> SocketAddr {
    let app = Router::new().fallback(move |_request: Request| {
        let failures = failures.clone();
        async move {
            let mut remaining = failures.lock().await;
            if *remaining > 0 {
                *remaining -= 1;
                (StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":{"message":"boom"}}"#)
            } else {
                (StatusCode::OK, r#"{"id":"x","choices":[{"message":{"content":"ok"}}]}"#)
            }
        }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn gateway_for(stub: SocketAddr, config: GatewayConfig) -> (AppState, Router) {
    let mut config = config;
    config.provider_bases.openai = format!("http://{stub}");
    let (state, _workers) = build_state(config);
    let app = router(state.clone());
    (state, app)
}

fn chat_request() -> Request {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("Authorization", "Bearer sk-abc")
        .header("content-type", "application/json")
        .body(Body::from(CHAT_REQUEST))
        .expect("request")
}

async fn wait_for_usage(state: &AppState) {
    let start = tokio::time::Instant::now();
    while state.prompts.store().usage_count() == 0 {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "capture did not land within 5s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn disconnect_mid_stream_captures_a_partial_prefix() {
    let stub = start_streaming_stub(20).await;
    let (state, app) = gateway_for(stub, GatewayConfig::default());

    let response = app.oneshot(chat_request()).await.expect("proxy call");
    assert_eq!(response.status(), StatusCode::OK);

    // Read two chunks, then hang up by dropping the body stream.
    let mut body = response.into_body().into_data_stream();
    let first = body.next().await;
    assert!(first.is_some());
    let second = body.next().await;
    assert!(second.is_some());
    drop(body);

    wait_for_usage(&state).await;
    let usage = &state.prompts.store().list_usages(1)[0];
    assert_eq!(
        usage.metadata.get("partial"),
        Some(&serde_json::Value::Bool(true))
    );
}

#[tokio::test]
async fn repeated_provider_failures_open_the_circuit() {
    let failures = Arc::new(Mutex::new(1_000u32));
    let stub = start_flaky_stub(failures.clone()).await;
    let mut config = GatewayConfig::default();
    config.breaker_window = 4;
    config.breaker_cooldown = Duration::from_secs(3600);
    let (state, app) = gateway_for(stub, config);

    // Fill the breaker window with 5xx outcomes; each is still forwarded
    // verbatim to the caller.
    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(chat_request())
            .await
            .expect("proxy call");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // The window is full of failures: the next call short-circuits.
    let response = app
        .clone()
        .oneshot(chat_request())
        .await
        .expect("proxy call");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["error"]["code"], "circuit_breaker_open");

    let snapshot = state.breakers.snapshot();
    let openai = snapshot
        .iter()
        .find(|s| s.provider == Provider::Openai.as_str())
        .expect("openai snapshot");
    assert_eq!(openai.state, "open");
}

#[tokio::test]
async fn half_open_probe_recovers_a_healed_provider() {
    let failures = Arc::new(Mutex::new(2u32));
    let stub = start_flaky_stub(failures).await;
    let mut config = GatewayConfig::default();
    config.breaker_window = 2;
    config.breaker_cooldown = Duration::ZERO;
    let (_state, app) = gateway_for(stub, config);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_request())
            .await
            .expect("proxy call");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Circuit opened, cooldown elapsed immediately: the next call is the
    // half-open probe, the stub has healed, the circuit closes.
    let response = app
        .clone()
        .oneshot(chat_request())
        .await
        .expect("probe call");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(chat_request()).await.expect("closed call");
    assert_eq!(response.status(), StatusCode::OK);
}
