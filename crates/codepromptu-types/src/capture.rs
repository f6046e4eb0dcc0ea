//! In-flight capture state handed from the gateway to the pipeline.
//!
//! A `CaptureContext` is an owned value built by the proxy filter and moved
//! into the pipeline by explicit submit; it is never stashed in framework
//! request extensions and never persisted as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::provider::Provider;

/// Degradation markers recorded during capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFlags {
    /// Request body exceeded the capture cap and was truncated.
    pub request_truncated: bool,
    /// Response body exceeded the capture cap and was truncated.
    pub response_truncated: bool,
    /// Client disconnected mid-response; the body is a prefix.
    pub partial: bool,
    /// Provider forward timed out.
    pub timeout: bool,
}

/// Request-scoped capture record for one proxied call.
///
/// The credential itself never appears here: the proxy filter strips the
/// provider auth locations from the captured payload and records only
/// `api_key_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureContext {
    /// Idempotency key for store ingest.
    pub request_id: Uuid,
    /// Correlation identifier (client-supplied verbatim or freshly minted).
    pub correlation_id: String,
    /// Detected provider.
    pub provider: Provider,
    /// Model named in the request, when already known at capture time.
    pub model: Option<String>,
    /// Raw request bytes, bounded by the capture cap.
    pub request_body: Vec<u8>,
    /// Raw response bytes, bounded by the capture cap.
    pub response_body: Vec<u8>,
    /// Upstream response status, when a response was received.
    pub response_status: Option<u16>,
    /// When the gateway received the request.
    pub request_timestamp: DateTime<Utc>,
    /// When the upstream response completed, if it did.
    pub response_timestamp: Option<DateTime<Utc>>,
    /// Caller address.
    pub client_ip: Option<String>,
    /// Caller user agent.
    pub user_agent: Option<String>,
    /// Truncated one-way hash of the client credential.
    pub api_key_hash: String,
    /// Degradation markers.
    #[serde(default)]
    pub flags: CaptureFlags,
    /// Mutable scratch map for parser-extracted fields.
    #[serde(default)]
    pub extracted: Map<String, Value>,
}

impl CaptureContext {
    /// Fresh context for a classified request; response fields start empty.
    #[must_use]
    pub fn new(
        correlation_id: String,
        provider: Provider,
        api_key_hash: String,
        request_timestamp: DateTime<Utc>,
    ) -> Self {
        CaptureContext {
            request_id: Uuid::new_v4(),
            correlation_id,
            provider,
            model: None,
            request_body: Vec::new(),
            response_body: Vec::new(),
            response_status: None,
            request_timestamp,
            response_timestamp: None,
            client_ip: None,
            user_agent: None,
            api_key_hash,
            flags: CaptureFlags::default(),
            extracted: Map::new(),
        }
    }
}
