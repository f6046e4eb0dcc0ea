//! Capture gateway filter: byte-faithful forwarding with async capture.
//!
//! The request body is buffered and forwarded unchanged with the client's
//! own credential; the response streams back to the caller through a tee
//! that copies bytes into the bounded capture buffer. The capture context
//! is submitted to the pipeline only after the downstream response
//! completes (or the client disconnects, in which case the prefix is
//! submitted marked partial). Capture never alters or blocks the proxied
//! traffic.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use uuid::Uuid;

use codepromptu_types::CaptureContext;

use crate::breaker::BreakerDecision;
use crate::capture::context::{CaptureBuffer, hash_credential};
use crate::capture::pipeline::CapturePipeline;
use crate::fallback;
use crate::provider::{Detection, EndpointKind, ProviderRoute, detect, is_llm_like};
use crate::state::AppState;

/// Headers never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Proxy entry point for every provider-pattern route.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(String::from);

    let detection = detect(&path, &parts.headers, query.as_deref(), &state.config.provider_bases);
    let route = match detection {
        Detection::Known(route) => route,
        Detection::MissingCredential(provider) => {
            tracing::debug!(
                event = "proxy.credential.rejected",
                provider = provider.as_str(),
                path,
                "recognized path without a valid credential"
            );
            return fallback::missing_credential_response(provider);
        }
        Detection::Unknown => {
            return if is_llm_like(&path) {
                fallback::unknown_llm_endpoint_response(&path)
            } else {
                (StatusCode::NOT_FOUND, "not found").into_response()
            };
        }
    };

    let correlation_id = parts
        .headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let body_bytes = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!(
                event = "proxy.body.read_failed",
                error = %error,
                "failed to buffer request body"
            );
            return fallback::gateway_internal_response("request body unreadable");
        }
    };

    // Circuit check before any provider contact; open short-circuits to the
    // fallback controller with no capture. A probe acquired here is always
    // reported back through `record`.
    let probe = match state.breakers.check(route.provider) {
        BreakerDecision::Open => {
            tracing::debug!(
                event = "proxy.circuit.open",
                provider = route.provider.as_str(),
                "circuit open; provider not contacted"
            );
            return fallback::circuit_open_response(route.provider);
        }
        BreakerDecision::AllowProbe => true,
        BreakerDecision::Allow => false,
    };

    let mut ctx = CaptureContext::new(
        correlation_id.clone(),
        route.provider,
        hash_credential(&route.credential),
        Utc::now(),
    );
    ctx.model = route.model_hint.clone();
    ctx.client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string());
    ctx.user_agent = parts
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let mut request_buffer = CaptureBuffer::new(state.config.max_capture_bytes);
    request_buffer.extend(&body_bytes);
    ctx.flags.request_truncated = request_buffer.truncated();
    ctx.request_body = request_buffer.into_bytes();

    let url = match &query {
        Some(q) => format!("{}{}?{}", route.target_base, path, q),
        None => format!("{}{}", route.target_base, path),
    };
    let timeout = match route.endpoint_kind {
        EndpointKind::Chat => state.config.chat_timeout,
        EndpointKind::Embeddings => state.config.embeddings_timeout,
    };
    let egress_headers = egress_headers(&parts.headers, &route);

    let upstream = state
        .http
        .request(parts.method.clone(), &url)
        .headers(egress_headers)
        .body(reqwest::Body::from(body_bytes))
        .timeout(timeout)
        .send()
        .await;

    let response = match upstream {
        Ok(response) => response,
        Err(error) if error.is_timeout() => {
            state.breakers.record(route.provider, false, probe);
            // Timeouts are valuable data: capture with the timeout flag.
            ctx.flags.timeout = true;
            state.pipeline.submit(ctx);
            tracing::warn!(
                event = "proxy.upstream.timeout",
                provider = route.provider.as_str(),
                timeout_secs = timeout.as_secs(),
                "provider forward timed out"
            );
            return fallback::upstream_timeout_response(route.provider);
        }
        Err(error) => {
            state.breakers.record(route.provider, false, probe);
            tracing::warn!(
                event = "proxy.upstream.unreachable",
                provider = route.provider.as_str(),
                error = %error,
                "provider unreachable"
            );
            return fallback::provider_unreachable_response(route.provider);
        }
    };

    let status = response.status();
    // Provider 5xx is forwarded verbatim AND captured; only the breaker
    // counts it as a failure.
    state
        .breakers
        .record(route.provider, !status.is_server_error(), probe);
    ctx.response_status = Some(status.as_u16());

    let mut builder = Response::builder().status(status);
    if let Some(headers) = builder.headers_mut() {
        copy_response_headers(response.headers(), headers);
        if let Ok(value) = HeaderValue::from_str(&correlation_id) {
            headers.insert(
                HeaderName::from_static("x-correlation-id"),
                value,
            );
        }
    }

    let tee = TeeStream::new(
        Box::pin(response.bytes_stream()),
        ctx,
        CaptureBuffer::new(state.config.max_capture_bytes),
        state.pipeline.clone(),
    );
    match builder.body(Body::from_stream(tee)) {
        Ok(response) => response,
        Err(error) => {
            tracing::error!(
                event = "proxy.response.build_failed",
                error = %error,
                "failed to assemble proxied response"
            );
            fallback::gateway_internal_response("response assembly failed")
        }
    }
}

/// Egress header set: everything the client sent except hop-by-hop and
/// gateway-owned headers, plus required provider extras and the gateway
/// user agent.
fn egress_headers(inbound: &HeaderMap, route: &ProviderRoute) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower)
            || lower == "host"
            || lower == "content-length"
            || lower == "user-agent"
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    for (name, value) in &route.extra_headers {
        let header_name = HeaderName::from_static(name);
        if !headers.contains_key(&header_name) {
            headers.insert(header_name, HeaderValue::from_static(value));
        }
    }
    static GATEWAY_UA: &str = concat!("CodePromptu-Gateway/", env!("CARGO_PKG_VERSION"));
    headers.insert(
        HeaderName::from_static("user-agent"),
        HeaderValue::from_static(GATEWAY_UA),
    );
    headers
}

fn copy_response_headers(upstream: &HeaderMap, downstream: &mut HeaderMap) {
    for (name, value) in upstream {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        downstream.append(name.clone(), value.clone());
    }
}

struct CaptureFinalizer {
    ctx: CaptureContext,
    buffer: CaptureBuffer,
    pipeline: CapturePipeline,
}

impl CaptureFinalizer {
    /// Assemble the context and submit it; called exactly once per request.
    fn finalize(mut self, partial: bool) {
        self.ctx.flags.partial = self.ctx.flags.partial || partial;
        self.ctx.flags.response_truncated = self.buffer.truncated();
        self.ctx.response_timestamp = Some(Utc::now());
        self.ctx.response_body = self.buffer.into_bytes();
        self.pipeline.submit(self.ctx);
    }
}

/// Response pass-through that tees bytes into the capture buffer.
///
/// Completion finalizes and submits the capture; a drop before completion
/// (client disconnect) submits the captured prefix marked partial, and
/// dropping the inner stream cancels the upstream call.
struct TeeStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    state: Option<CaptureFinalizer>,
}

impl TeeStream {
    fn new(
        inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
        ctx: CaptureContext,
        buffer: CaptureBuffer,
        pipeline: CapturePipeline,
    ) -> Self {
        TeeStream {
            inner,
            state: Some(CaptureFinalizer {
                ctx,
                buffer,
                pipeline,
            }),
        }
    }
}

impl Stream for TeeStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(state) = this.state.as_mut() {
                    state.buffer.extend(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                if let Some(state) = this.state.take() {
                    state.finalize(true);
                }
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                if let Some(state) = this.state.take() {
                    state.finalize(false);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TeeStream {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            tracing::debug!(
                event = "proxy.capture.partial",
                request_id = %state.ctx.request_id,
                "client disconnected mid-response; capturing prefix"
            );
            state.finalize(true);
        }
    }
}

/// Fallback route: provider-shaped rejection for LLM-looking paths,
/// plain 404 otherwise.
pub async fn handle_unmatched(request: Request) -> Response {
    let path = request.uri().path();
    if is_llm_like(path) {
        fallback::unknown_llm_endpoint_response(path)
    } else {
        (StatusCode::NOT_FOUND, "not found").into_response()
    }
}
