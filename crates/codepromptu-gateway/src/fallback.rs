//! Provider-shaped error envelopes.
//!
//! The envelope schema is stable across providers:
//! `{"error": {"message", "type", "code"}}`; only the message text varies
//! per provider endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use codepromptu_types::Provider;

/// Body returned when a provider circuit is open.
#[must_use]
pub fn circuit_open_body(provider: Provider) -> Value {
    json!({
        "error": {
            "message": format!(
                "{} is temporarily unavailable through this gateway; the circuit breaker is open",
                provider.as_str()
            ),
            "type": "service_unavailable",
            "code": "circuit_breaker_open"
        }
    })
}

/// HTTP 503 with the circuit-open envelope.
#[must_use]
pub fn circuit_open_response(provider: Provider) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, Json(circuit_open_body(provider))).into_response()
}

/// HTTP 503 when the provider is unreachable (network failure).
#[must_use]
pub fn provider_unreachable_response(provider: Provider) -> Response {
    let body = json!({
        "error": {
            "message": format!("{} could not be reached", provider.as_str()),
            "type": "service_unavailable",
            "code": "provider_unreachable"
        }
    });
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

/// HTTP 401 for a recognized path with a missing or malformed credential;
/// the provider is never contacted.
#[must_use]
pub fn missing_credential_response(provider: Provider) -> Response {
    let body = json!({
        "error": {
            "message": format!(
                "missing or malformed credential for {}",
                provider.as_str()
            ),
            "type": "authentication_error",
            "code": "invalid_api_key"
        }
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// HTTP 504 when the provider forward timed out.
#[must_use]
pub fn upstream_timeout_response(provider: Provider) -> Response {
    let body = json!({
        "error": {
            "message": format!("{} did not answer within the gateway deadline", provider.as_str()),
            "type": "timeout_error",
            "code": "upstream_timeout"
        }
    });
    (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response()
}

/// HTTP 404 for an unmatched path that still looks like an LLM call.
#[must_use]
pub fn unknown_llm_endpoint_response(path: &str) -> Response {
    let body = json!({
        "error": {
            "message": format!("no provider route matches {path}"),
            "type": "invalid_request_error",
            "code": "unknown_endpoint"
        }
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// HTTP 502 for gateway-internal failures (never captured).
#[must_use]
pub fn gateway_internal_response(detail: &str) -> Response {
    let body = json!({
        "error": {
            "message": format!("gateway error: {detail}"),
            "type": "gateway_internal",
            "code": "bad_gateway"
        }
    });
    (StatusCode::BAD_GATEWAY, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_envelope_is_stable() {
        let body = circuit_open_body(Provider::Openai);
        assert_eq!(body["error"]["type"], "service_unavailable");
        assert_eq!(body["error"]["code"], "circuit_breaker_open");
        assert!(body["error"]["message"].as_str().is_some_and(|m| m.contains("OPENAI")));
    }
}
