//! Conversation correlator: sessions keyed by correlation id.
//!
//! Message append is strictly ordered per correlation id (the shard lock on
//! the session entry covers the whole append); distinct correlation ids are
//! unordered with respect to each other.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use uuid::Uuid;

use codepromptu_types::limits::SESSION_IDLE_TIMEOUT_SECS;
use codepromptu_types::{
    ConversationMessage, ConversationSession, MessageType, Provider, SessionStatus, TokenUsage,
};

use crate::error::StoreError;

/// Input for one message append.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Prompt or response.
    pub message_type: MessageType,
    /// Message text, bounded upstream by the capture cap.
    pub content: String,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Provider involved.
    pub provider: Provider,
    /// Model, when known.
    pub model: Option<String>,
    /// Token accounting, when present.
    pub token_usage: Option<TokenUsage>,
    /// Provider-specific extras.
    pub metadata: Map<String, Value>,
}

struct SessionEntry {
    session: ConversationSession,
    messages: Vec<ConversationMessage>,
    last_activity: DateTime<Utc>,
}

/// Session map with ordered per-key message append and idle expiry.
pub struct ConversationLog {
    sessions: DashMap<String, SessionEntry>,
    by_id: DashMap<Uuid, String>,
    idle_timeout: Duration,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    /// Log with the normative 30-minute idle timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_timeout(SESSION_IDLE_TIMEOUT_SECS)
    }

    /// Log with an explicit idle timeout in seconds.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout_secs: u64) -> Self {
        ConversationLog {
            sessions: DashMap::new(),
            by_id: DashMap::new(),
            idle_timeout: Duration::seconds(idle_timeout_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Append a message to the session for `correlation_id`, opening the
    /// session on first contact.
    ///
    /// A PROMPT arriving on a closed or expired session re-opens it. A
    /// RESPONSE with no preceding PROMPT in the active window is stored
    /// with `orphaned: true` in its metadata.
    pub fn record(
        &self,
        correlation_id: &str,
        user_context: Map<String, Value>,
        record: MessageRecord,
    ) -> ConversationMessage {
        match self.sessions.entry(correlation_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let message = append_message(entry, record);
                tracing::debug!(
                    event = "sessions.message.appended",
                    correlation_id,
                    session_id = %entry.session.id,
                    message_count = entry.session.message_count,
                    "conversation message appended"
                );
                message
            }
            Entry::Vacant(vacant) => {
                let session_id = Uuid::new_v4();
                let session = ConversationSession {
                    id: session_id,
                    correlation_id: correlation_id.to_string(),
                    user_context,
                    session_start: record.timestamp,
                    session_end: None,
                    message_count: 0,
                    total_tokens: 0,
                    status: SessionStatus::Active,
                };
                let mut entry = SessionEntry {
                    session,
                    messages: Vec::new(),
                    last_activity: record.timestamp,
                };
                let message = append_message(&mut entry, record);
                self.by_id.insert(session_id, correlation_id.to_string());
                vacant.insert(entry);
                tracing::debug!(
                    event = "sessions.session.opened",
                    correlation_id,
                    session_id = %session_id,
                    "conversation session opened"
                );
                message
            }
        }
    }

    /// Explicitly close an ACTIVE session. Closing a session in any other
    /// state leaves it unchanged.
    pub fn close(&self, session_id: Uuid) -> Result<ConversationSession, StoreError> {
        let correlation_id = self
            .by_id
            .get(&session_id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(session_id))?;
        let mut entry = self
            .sessions
            .get_mut(&correlation_id)
            .ok_or(StoreError::NotFound(session_id))?;
        let value = entry.value_mut();
        if value.session.status == SessionStatus::Active {
            value.session.status = SessionStatus::Closed;
            value.session.session_end = Some(value.last_activity);
            tracing::debug!(
                event = "sessions.session.closed",
                session_id = %session_id,
                "conversation session closed"
            );
        }
        Ok(value.session.clone())
    }

    /// Session with its ordered messages, by session id.
    pub fn session(
        &self,
        session_id: Uuid,
    ) -> Result<(ConversationSession, Vec<ConversationMessage>), StoreError> {
        let correlation_id = self
            .by_id
            .get(&session_id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(session_id))?;
        self.session_by_correlation(&correlation_id)
            .ok_or(StoreError::NotFound(session_id))
    }

    /// Session with its ordered messages, by correlation id.
    #[must_use]
    pub fn session_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Option<(ConversationSession, Vec<ConversationMessage>)> {
        self.sessions
            .get(correlation_id)
            .map(|entry| (entry.session.clone(), entry.messages.clone()))
    }

    /// Sessions, newest first, optionally filtered by status.
    #[must_use]
    pub fn list(&self, status: Option<SessionStatus>, limit: usize) -> Vec<ConversationSession> {
        let mut sessions: Vec<ConversationSession> = self
            .sessions
            .iter()
            .map(|entry| entry.session.clone())
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .collect();
        sessions.sort_by(|a, b| b.session_start.cmp(&a.session_start));
        if limit > 0 {
            sessions.truncate(limit);
        }
        sessions
    }

    /// Expire ACTIVE sessions idle past the timeout as of `now`; returns
    /// how many flipped. `session_end` is the last message timestamp.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0usize;
        for mut entry in self.sessions.iter_mut() {
            let value = entry.value_mut();
            if value.session.status != SessionStatus::Active {
                continue;
            }
            if now - value.last_activity >= self.idle_timeout {
                value.session.status = SessionStatus::Expired;
                value.session.session_end = Some(value.last_activity);
                expired += 1;
                tracing::debug!(
                    event = "sessions.session.expired",
                    session_id = %value.session.id,
                    idle_since = %value.last_activity,
                    "conversation session expired"
                );
            }
        }
        expired
    }

    /// Number of sessions, any status.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn append_message(entry: &mut SessionEntry, record: MessageRecord) -> ConversationMessage {
    let mut metadata = record.metadata;
    match record.message_type {
        MessageType::Prompt => {
            // A prompt re-opens a closed or expired session.
            if entry.session.status != SessionStatus::Active {
                entry.session.status = SessionStatus::Active;
                entry.session.session_end = None;
            }
        }
        MessageType::Response => {
            let has_prompt = entry
                .messages
                .iter()
                .any(|m| m.message_type == MessageType::Prompt);
            if !has_prompt || entry.session.status != SessionStatus::Active {
                metadata.insert("orphaned".to_string(), Value::Bool(true));
            }
        }
    }
    let message = ConversationMessage {
        id: Uuid::new_v4(),
        session_id: entry.session.id,
        message_type: record.message_type,
        content: record.content,
        timestamp: record.timestamp,
        provider: record.provider,
        model: record.model,
        token_usage: record.token_usage,
        metadata,
    };
    entry.messages.push(message.clone());
    entry.session.message_count += 1;
    if let Some(usage) = record.token_usage {
        entry.session.total_tokens += u64::from(usage.total_tokens);
    }
    if record.timestamp > entry.last_activity {
        entry.last_activity = record.timestamp;
    }
    message
}
