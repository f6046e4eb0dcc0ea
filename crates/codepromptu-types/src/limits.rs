//! Normative defaults for every bounded value in the system.
//!
//! All of these are overridable through `GatewayConfig`; the constants here
//! apply whenever a deployment leaves the corresponding knob unset.

/// Fixed embedding dimension (OpenAI ada-002 family).
pub const EMBEDDING_DIM: usize = 1536;

/// Maximum characters fed to the embedding backend; longer input is truncated.
pub const MAX_EMBED_CHARS: usize = 8_000;

/// Maximum prompt content length accepted by the store.
pub const MAX_PROMPT_CHARS: usize = 100_000;

/// Capture buffer cap per direction (request or response), in bytes.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Active embedded rows required before an ANN index is maintained.
pub const MIN_INDEX_ROWS: usize = 100;

/// Lineage traversal bound; the K-th ancestor is reported as the root.
pub const MAX_LINEAGE_DEPTH: usize = 100;

/// Session idle timeout before expiry, in seconds (30 minutes).
pub const SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

/// Similarity score at or above which two prompts are the same.
pub const TAU_SAME: f32 = 0.95;

/// Similarity score at or above which a prompt is a fork candidate.
pub const TAU_FORK: f32 = 0.70;

/// Hex characters kept from the SHA-256 of a client credential.
pub const API_KEY_HASH_LEN: usize = 16;

/// Fallback capture queue capacity; overflow drops the oldest entry.
pub const FALLBACK_QUEUE_CAPACITY: usize = 10_000;

/// Fallback queue entry time-to-live, in seconds (24 hours).
pub const FALLBACK_TTL_SECS: u64 = 24 * 60 * 60;

/// Fallback drain worker tick interval, in seconds.
pub const DRAIN_INTERVAL_SECS: u64 = 30;

/// Primary store-ingest attempt timeout, in seconds.
pub const INGEST_TIMEOUT_SECS: u64 = 2;

/// Initial retry backoff for deferred captures, in seconds.
pub const RETRY_INITIAL_SECS: u64 = 1;

/// Retry backoff multiplier.
pub const RETRY_MULTIPLIER: u32 = 2;

/// Retry backoff ceiling, in seconds.
pub const RETRY_CAP_SECS: u64 = 60;

/// Retry attempts before a deferred capture is dropped.
pub const RETRY_MAX_ATTEMPTS: u32 = 6;

/// Circuit breaker sliding window size (samples).
pub const BREAKER_WINDOW: usize = 20;

/// Failure rate over a full window that opens the breaker.
pub const BREAKER_FAILURE_RATE: f64 = 0.5;

/// Seconds an open breaker waits before allowing a half-open probe.
pub const BREAKER_COOLDOWN_SECS: u64 = 30;

/// Provider forward timeout for chat-style endpoints, in seconds.
pub const CHAT_TIMEOUT_SECS: u64 = 60;

/// Provider forward timeout for embeddings endpoints, in seconds.
pub const EMBEDDINGS_TIMEOUT_SECS: u64 = 30;

/// Per-call embedding backend timeout, in seconds.
pub const EMBED_CALL_TIMEOUT_SECS: u64 = 10;

/// Embedding backend attempts before failure propagates.
pub const EMBED_ATTEMPTS: u32 = 3;

/// Seconds within which an active prompt must be embedded or queued.
pub const T_EMBED_SECS: u64 = 30;
