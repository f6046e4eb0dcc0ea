//! Conversation sessions and their ordered messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::provider::Provider;
use crate::usage::TokenUsage;

/// Lifecycle state of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Receiving messages.
    Active,
    /// Explicitly closed by an operator call.
    Closed,
    /// Idle past the session timeout.
    Expired,
}

/// Direction of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client-side prompt.
    Prompt,
    /// Provider-side response.
    Response,
}

/// A temporally bounded group of messages sharing a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Session identifier.
    pub id: Uuid,
    /// Unique correlation identifier grouping the messages.
    pub correlation_id: String,
    /// Structured caller context (client ip, user agent, api key hash).
    #[serde(default)]
    pub user_context: Map<String, Value>,
    /// Timestamp of the first message.
    pub session_start: DateTime<Utc>,
    /// Timestamp of the last message once closed or expired.
    pub session_end: Option<DateTime<Utc>>,
    /// Number of messages recorded.
    pub message_count: u64,
    /// Accumulated `token_usage.total_tokens` across messages.
    pub total_tokens: u64,
    /// Lifecycle state.
    pub status: SessionStatus,
}

/// One prompt or response inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Prompt or response.
    pub message_type: MessageType,
    /// Message text (bounded by the capture cap).
    pub content: String,
    /// When the message was observed.
    pub timestamp: DateTime<Utc>,
    /// Provider the message went to or came from.
    pub provider: Provider,
    /// Model, when known.
    pub model: Option<String>,
    /// Token accounting, when present on the response.
    pub token_usage: Option<TokenUsage>,
    /// Provider-specific extras; responses with no preceding prompt carry
    /// `orphaned: true` here.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
