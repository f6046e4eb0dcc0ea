//! Similarity query results and the SAME/FORK/NEW classification.

use serde::{Deserialize, Serialize};

use crate::prompt::Prompt;

/// Outcome of classifying a prompt against the stored corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Effectively a duplicate of an existing prompt (s >= tau_same).
    Same,
    /// Likely related; candidate parent for a fork (tau_fork <= s < tau_same).
    Fork,
    /// Unrelated to anything stored (s < tau_fork).
    New,
}

/// One k-NN result: a prompt and its similarity score.
///
/// Score convention, enforced end-to-end: raw cosine similarity in
/// [-1, 1], higher means more similar. Distances are never exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityHit {
    /// The matched prompt.
    pub prompt: Prompt,
    /// Cosine similarity of the query to this prompt's embedding.
    pub score: f32,
}

/// Result of `classify`: the nearest match, its score, and the verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Nearest stored prompt, when the corpus is non-empty.
    pub best_match: Option<SimilarityHit>,
    /// Score of the best match; 0.0 on an empty corpus.
    pub score: f32,
    /// SAME, FORK or NEW.
    pub classification: Classification,
}

impl ClassificationResult {
    /// The empty-corpus result: NEW with score zero.
    #[must_use]
    pub fn new_prompt() -> Self {
        ClassificationResult {
            best_match: None,
            score: 0.0,
            classification: Classification::New,
        }
    }
}
