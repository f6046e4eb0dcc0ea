//! Similarity engine: k-NN over prompt embeddings plus classification.
//!
//! Score convention, enforced end-to-end: the score is raw cosine
//! similarity in [-1, 1] and higher means more similar. Distances are
//! never exposed, so the SAME/FORK/NEW thresholds compare against the
//! score directly.

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use codepromptu_embedding::{EmbeddingService, cosine};
use codepromptu_types::limits::{MIN_INDEX_ROWS, TAU_FORK, TAU_SAME};
use codepromptu_types::{Classification, ClassificationResult, Prompt, SimilarityHit};

use crate::error::StoreError;
use crate::index::IvfIndex;
use crate::store::PromptStore;

/// Classification thresholds; deployment-configurable, defaults normative.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Score at or above which a prompt is SAME.
    pub tau_same: f32,
    /// Score at or above which a prompt is FORK.
    pub tau_fork: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            tau_same: TAU_SAME,
            tau_fork: TAU_FORK,
        }
    }
}

/// k-nearest-neighbour retrieval and classification over the store.
pub struct SimilarityEngine {
    store: Arc<PromptStore>,
    embedding: EmbeddingService,
    thresholds: Thresholds,
    min_index_rows: usize,
    index: RwLock<Option<IvfIndex>>,
}

impl SimilarityEngine {
    /// Engine over `store` embedding queries through `embedding`.
    #[must_use]
    pub fn new(store: Arc<PromptStore>, embedding: EmbeddingService) -> Self {
        SimilarityEngine {
            store,
            embedding,
            thresholds: Thresholds::default(),
            min_index_rows: MIN_INDEX_ROWS,
            index: RwLock::new(None),
        }
    }

    /// Override the classification thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Override the flat-scan cutoff (test hook).
    #[must_use]
    pub fn with_min_index_rows(mut self, min_index_rows: usize) -> Self {
        self.min_index_rows = min_index_rows.max(1);
        self
    }

    /// Active thresholds.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Top-`limit` active embedded prompts by descending score.
    ///
    /// Retired prompts and rows still waiting for their vector are
    /// excluded. An empty corpus returns an empty list, never an error;
    /// an empty or wrong-dimension query is an error.
    pub async fn find_similar_vec(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SimilarityHit>, StoreError> {
        let expected = self.store.dimension();
        if query.is_empty() || query.len() != expected {
            return Err(StoreError::InvalidVector {
                expected,
                actual: query.len(),
            });
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.candidates(query).await;
        let mut hits: Vec<SimilarityHit> = candidates
            .into_iter()
            .filter_map(|prompt| {
                let score = prompt
                    .embedding
                    .as_deref()
                    .map(|embedding| cosine(query, embedding))?;
                Some(SimilarityHit { prompt, score })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.prompt.updated_at.cmp(&a.prompt.updated_at))
                .then_with(|| a.prompt.id.to_string().cmp(&b.prompt.id.to_string()))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// `embed(text)` then `find_similar_vec`.
    ///
    /// Embedding backend failure degrades to an empty result with a
    /// warning rather than an error; only invalid inputs surface errors.
    pub async fn find_similar_text(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<SimilarityHit>, StoreError> {
        let query = match self.embedding.embed(text).await {
            Ok(vector) => vector,
            Err(error) => {
                tracing::warn!(
                    event = "store.search.embed_failed",
                    error = %error,
                    "similarity query embedding failed; returning empty"
                );
                return Ok(Vec::new());
            }
        };
        self.find_similar_vec(&query, limit).await
    }

    /// Classify `text` against the nearest stored prompt.
    pub async fn classify(&self, text: &str) -> Result<ClassificationResult, StoreError> {
        let mut hits = self.find_similar_text(text, 1).await?;
        let Some(best) = hits.pop() else {
            return Ok(ClassificationResult::new_prompt());
        };
        let score = best.score;
        let classification = self.classify_score(score);
        Ok(ClassificationResult {
            best_match: Some(best),
            score,
            classification,
        })
    }

    /// Threshold comparison alone (no lookup).
    #[must_use]
    pub fn classify_score(&self, score: f32) -> Classification {
        if score >= self.thresholds.tau_same {
            Classification::Same
        } else if score >= self.thresholds.tau_fork {
            Classification::Fork
        } else {
            Classification::New
        }
    }

    /// Candidate rows for a query: the probed index buckets past the
    /// indexing threshold, the whole active embedded set below it.
    async fn candidates(&self, query: &[f32]) -> Vec<Prompt> {
        let row_count = self.store.embedded_active_count();
        if row_count < self.min_index_rows {
            let mut guard = self.index.write().await;
            *guard = None;
            return self.store.active_embedded_rows();
        }
        let ids = self.probe_index(query, row_count).await;
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(prompt) = self.store.get(id) {
                if prompt.is_searchable() {
                    rows.push(prompt);
                }
            }
        }
        rows
    }

    async fn probe_index(&self, query: &[f32], row_count: usize) -> Vec<Uuid> {
        {
            let guard = self.index.read().await;
            if let Some(ref index) = *guard {
                if !index.needs_rebuild(row_count) {
                    return index.probe(query);
                }
            }
        }
        let mut guard = self.index.write().await;
        // Another writer may have rebuilt while we waited for the lock.
        let stale = guard
            .as_ref()
            .map_or(true, |index| index.needs_rebuild(row_count));
        if stale {
            let rows = self.store.active_embedded_rows();
            *guard = Some(IvfIndex::build(&rows));
        }
        guard
            .as_ref()
            .map(|index| index.probe(query))
            .unwrap_or_default()
    }
}
