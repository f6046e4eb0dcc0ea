//! codepromptu-embedding - Embedding service for prompt texts.
//!
//! Maps prompt text to a fixed-dimension real-valued vector through a
//! pluggable backend. The HTTP backend talks to an OpenAI-shaped embeddings
//! API; the hash backend is deterministic and network-free for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use codepromptu_types::limits::{EMBED_ATTEMPTS, EMBED_CALL_TIMEOUT_SECS, EMBEDDING_DIM};

pub mod cosine;
pub mod hash;
pub mod http;
pub mod preprocess;

pub use cosine::cosine;
pub use hash::HashEmbeddingBackend;
pub use http::HttpEmbeddingBackend;
pub use preprocess::{Preprocessed, preprocess};

/// Errors from embedding backends and the retry wrapper.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failure reaching the backend.
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("embedding backend returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, bounded.
        body: String,
    },

    /// Backend payload did not match the expected shape.
    #[error("embedding payload malformed: {0}")]
    Malformed(String),

    /// Vector came back with the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// All retry attempts failed.
    #[error("embedding failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Message of the final failure.
        last: String,
    },

    /// One backend call exceeded its deadline.
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
}

/// A provider-agnostic embedding backend.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Fixed output dimension of this backend.
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Embed a batch of already-preprocessed texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embedding entry point: preprocessing, per-call timeout and retry.
///
/// Backend errors are retried with exponential backoff; the final failure
/// propagates so callers can park the prompt for re-embedding.
#[derive(Clone)]
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    attempts: u32,
    call_timeout: Duration,
}

impl EmbeddingService {
    /// Service over `backend` with the normative timeout and attempt count.
    #[must_use]
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        EmbeddingService {
            backend,
            attempts: EMBED_ATTEMPTS,
            call_timeout: Duration::from_secs(EMBED_CALL_TIMEOUT_SECS),
        }
    }

    /// Override the per-call timeout and attempt count (test hook).
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, call_timeout: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.call_timeout = call_timeout;
        self
    }

    /// Output dimension of the configured backend.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed one text; preprocesses first.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Malformed("backend returned empty batch".to_string()))
    }

    /// Embed a batch of texts, preserving order; preprocesses each first.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let prepared: Vec<String> = texts.iter().map(|t| preprocess(t).text).collect();

        let mut backoff = Duration::from_millis(500);
        let mut last_error: Option<EmbeddingError> = None;
        for attempt in 1..=self.attempts {
            match tokio::time::timeout(self.call_timeout, self.backend.embed_batch(&prepared)).await
            {
                Ok(Ok(vectors)) => {
                    self.check_dimensions(&vectors)?;
                    tracing::debug!(
                        event = "embedding.batch.completed",
                        attempt,
                        batch = vectors.len(),
                        "embedding batch completed"
                    );
                    return Ok(vectors);
                }
                Ok(Err(error)) => {
                    tracing::warn!(
                        event = "embedding.batch.attempt_failed",
                        attempt,
                        error = %error,
                        "embedding attempt failed"
                    );
                    last_error = Some(error);
                }
                Err(_) => {
                    tracing::warn!(
                        event = "embedding.batch.attempt_timeout",
                        attempt,
                        timeout_ms = self.call_timeout.as_millis() as u64,
                        "embedding attempt timed out"
                    );
                    last_error = Some(EmbeddingError::Timeout(self.call_timeout));
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(EmbeddingError::Exhausted {
            attempts: self.attempts,
            last,
        })
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
        let expected = self.backend.dimension();
        for v in vectors {
            if v.len() != expected {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: v.len(),
                });
            }
        }
        Ok(())
    }
}
