//! IVF-style approximate index over prompt embeddings.
//!
//! Below `MIN_INDEX_ROWS` the engine scans flat; past it, rows are bucketed
//! under `lists = max(n/1000, 10)` centroids and queries probe only the
//! nearest buckets. The index is rebuilt when the row count changes or the
//! lists value drifts more than `LISTS_DRIFT` from its target.

use uuid::Uuid;

use codepromptu_embedding::cosine;
use codepromptu_types::Prompt;

/// Allowed deviation between the built lists value and its target.
const LISTS_DRIFT: usize = 5;

/// Fraction of lists probed per query (at least one).
const PROBE_DIVISOR: usize = 10;

/// Centroid-bucketed view of the active embedded rows.
pub struct IvfIndex {
    lists: usize,
    centroids: Vec<Vec<f32>>,
    buckets: Vec<Vec<Uuid>>,
    row_count: usize,
}

impl IvfIndex {
    /// Index tuning target: `max(n/1000, 10)`.
    #[must_use]
    pub fn target_lists(row_count: usize) -> usize {
        (row_count / 1000).max(10)
    }

    /// Build an index over `rows` (each must carry an embedding).
    ///
    /// Centroid seeds are evenly spaced over the id-sorted rows, so a build
    /// over the same corpus is deterministic.
    #[must_use]
    pub fn build(rows: &[Prompt]) -> Self {
        let row_count = rows.len();
        let lists = Self::target_lists(row_count).min(row_count.max(1));
        let mut sorted: Vec<&Prompt> = rows.iter().collect();
        sorted.sort_by_key(|p| p.id);

        let stride = (sorted.len() / lists).max(1);
        let centroids: Vec<Vec<f32>> = sorted
            .iter()
            .step_by(stride)
            .take(lists)
            .filter_map(|p| p.embedding.clone())
            .collect();

        let mut buckets: Vec<Vec<Uuid>> = vec![Vec::new(); centroids.len()];
        for prompt in &sorted {
            let Some(ref embedding) = prompt.embedding else {
                continue;
            };
            if let Some(best) = nearest_centroid(&centroids, embedding) {
                buckets[best].push(prompt.id);
            }
        }
        tracing::debug!(
            event = "store.index.rebuilt",
            lists = centroids.len(),
            rows = row_count,
            "vector index rebuilt"
        );
        IvfIndex {
            lists: centroids.len(),
            centroids,
            buckets,
            row_count,
        }
    }

    /// Whether the index no longer matches the corpus.
    #[must_use]
    pub fn needs_rebuild(&self, row_count: usize) -> bool {
        if self.row_count != row_count {
            return true;
        }
        let target = Self::target_lists(row_count);
        self.lists.abs_diff(target) > LISTS_DRIFT
    }

    /// Candidate ids from the buckets nearest to `query`.
    #[must_use]
    pub fn probe(&self, query: &[f32]) -> Vec<Uuid> {
        if self.centroids.is_empty() {
            return Vec::new();
        }
        let nprobe = (self.lists / PROBE_DIVISOR).max(1);
        let mut scored: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine(query, c)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(nprobe)
            .flat_map(|(i, _)| self.buckets[i].iter().copied())
            .collect()
    }

    /// Lists value this index was built with.
    #[must_use]
    pub fn lists(&self) -> usize {
        self.lists
    }

    /// Rows this index was built over.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], embedding: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, c) in centroids.iter().enumerate() {
        let score = cosine(embedding, c);
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}
