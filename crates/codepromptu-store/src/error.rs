//! Error types for store operations.

use thiserror::Error;
use uuid::Uuid;

use codepromptu_embedding::EmbeddingError;

/// Errors for prompt store and similarity operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Content empty or over the configured bound.
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// Self-lineage, unknown parent, or a parent chain forming a cycle.
    #[error("invalid lineage: {0}")]
    LineageInvalid(String),

    /// No row with the given id.
    #[error("not found: {0}")]
    NotFound(Uuid),

    /// Concurrent version bump; the caller retries with the current version.
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Prompt id.
        id: Uuid,
        /// Version the caller expected.
        expected: u32,
        /// Version actually stored.
        actual: u32,
    },

    /// Query or embedding vector with the wrong dimension.
    #[error("invalid vector: expected dimension {expected}, got {actual}")]
    InvalidVector {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding backend failure, surfaced from text-query paths.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}
