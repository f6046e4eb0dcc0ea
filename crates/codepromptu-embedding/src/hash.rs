//! Deterministic, network-free embedding backend for tests.
//!
//! Vectors are signed random projections of the input's token bag, seeded
//! from SHA-256 of each token. Texts sharing vocabulary land near each
//! other under cosine; disjoint texts land near zero. Not semantic, but
//! stable across runs and platforms.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use codepromptu_types::limits::EMBEDDING_DIM;

use crate::{EmbeddingBackend, EmbeddingError};

/// Index/sign pairs derived per token from its hash.
const PROJECTIONS_PER_TOKEN: usize = 8;

/// Deterministic hash-projection embedding backend.
pub struct HashEmbeddingBackend {
    dimension: usize,
}

impl HashEmbeddingBackend {
    /// Backend with the system dimension (1536).
    #[must_use]
    pub fn new() -> Self {
        HashEmbeddingBackend {
            dimension: EMBEDDING_DIM,
        }
    }

    /// Backend with an explicit dimension (small-vector tests).
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        HashEmbeddingBackend {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            for chunk in digest.chunks_exact(4).take(PROJECTIONS_PER_TOKEN) {
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let index = (word >> 1) as usize % self.dimension;
                let sign = if word & 1 == 1 { 1.0 } else { -1.0 };
                vector[index] += sign;
            }
        }
        let norm = vector.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x = (f64::from(*x) / norm) as f32;
            }
        }
        vector
    }
}

impl Default for HashEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosine::cosine;

    fn embed(backend: &HashEmbeddingBackend, text: &str) -> Vec<f32> {
        backend.embed_one(text)
    }

    #[test]
    fn deterministic_across_calls() {
        let backend = HashEmbeddingBackend::new();
        assert_eq!(embed(&backend, "alpha beta"), embed(&backend, "alpha beta"));
    }

    #[test]
    fn identical_texts_are_identical_vectors() {
        let backend = HashEmbeddingBackend::new();
        let a = embed(&backend, "Write a Python function");
        let b = embed(&backend, "write a python FUNCTION");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_vocabulary_scores_higher_than_disjoint() {
        let backend = HashEmbeddingBackend::new();
        let base = embed(&backend, "write a python function to sum two numbers");
        let related = embed(&backend, "python function that adds two integers");
        let unrelated = embed(&backend, "knit a warm scarf");
        assert!(cosine(&base, &related) > cosine(&base, &unrelated));
        assert!(cosine(&base, &related) > 0.3);
        assert!(cosine(&base, &unrelated) < 0.3);
    }

    #[test]
    fn vectors_are_unit_norm() {
        let backend = HashEmbeddingBackend::with_dimension(64);
        let v = embed(&backend, "some text");
        let norm: f64 = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum();
        assert!((norm.sqrt() - 1.0).abs() < 1e-4);
    }
}
