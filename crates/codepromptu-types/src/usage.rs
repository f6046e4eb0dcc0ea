//! Usage records: one row per proxied request/response pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::provider::Provider;

/// Token counts lifted from a provider response, when recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt side.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
    /// Total billed tokens.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Usage with an explicit total (some providers omit it).
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// One proxied request/response pair, keyed for idempotency by `request_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptUsage {
    /// Row identifier.
    pub id: Uuid,
    /// Gateway request identifier; the idempotency key for ingest.
    pub request_id: Uuid,
    /// Conversation correlation identifier (verbatim when client-supplied).
    pub correlation_id: String,
    /// Matched or created prompt, when capture resolved one.
    pub prompt_id: Option<Uuid>,
    /// Upstream provider.
    pub provider: Provider,
    /// Model named in the request, when parseable.
    pub model: Option<String>,
    /// When the gateway received the request.
    pub request_timestamp: DateTime<Utc>,
    /// When the provider response completed, if it did.
    pub response_timestamp: Option<DateTime<Utc>>,
    /// Caller address, when known.
    pub client_ip: Option<String>,
    /// Caller user agent, when supplied.
    pub user_agent: Option<String>,
    /// Truncated one-way hash of the client credential; never the key itself.
    pub api_key_hash: String,
    /// Token accounting, when the response carried a usage object.
    pub token_usage: Option<TokenUsage>,
    /// Sampling parameters and other provider-specific fields.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
