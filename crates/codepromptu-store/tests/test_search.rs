#![allow(missing_docs)]

use std::sync::Arc;

use codepromptu_embedding::{EmbeddingService, HashEmbeddingBackend};
use codepromptu_store::{PromptStore, SimilarityEngine, StoreError, Thresholds};
use codepromptu_types::limits::EMBEDDING_DIM;
use codepromptu_types::{Classification, PromptDraft, Prompt};

fn embedding_service() -> EmbeddingService {
    EmbeddingService::new(Arc::new(HashEmbeddingBackend::new()))
}

/// Thresholds calibrated for the deterministic hash backend, which scores
/// vocabulary overlap rather than meaning.
fn test_thresholds() -> Thresholds {
    Thresholds {
        tau_same: 0.90,
        tau_fork: 0.35,
    }
}

async fn seed(store: &PromptStore, service: &EmbeddingService, content: &str) -> Prompt {
    let prompt = store
        .create(PromptDraft::from_content(content))
        .expect("create");
    let vector = service.embed(content).await.expect("embed");
    store
        .set_embedding(prompt.id, prompt.version, vector)
        .expect("set embedding");
    store.get(prompt.id).expect("get")
}

#[tokio::test]
async fn empty_store_returns_empty_and_classifies_new() {
    let store = Arc::new(PromptStore::new());
    let engine = SimilarityEngine::new(store, embedding_service());

    let hits = engine.find_similar_text("anything at all", 5).await.expect("search");
    assert!(hits.is_empty());

    let result = engine.classify("anything at all").await.expect("classify");
    assert_eq!(result.classification, Classification::New);
    assert_eq!(result.score, 0.0);
    assert!(result.best_match.is_none());
}

#[tokio::test]
async fn wrong_dimension_query_is_an_error() {
    let store = Arc::new(PromptStore::new());
    let engine = SimilarityEngine::new(store, embedding_service());

    let result = engine.find_similar_vec(&[0.1, 0.2], 5).await;
    assert!(matches!(result, Err(StoreError::InvalidVector { .. })));

    let result = engine.find_similar_vec(&[], 5).await;
    assert!(matches!(result, Err(StoreError::InvalidVector { .. })));
}

#[tokio::test]
async fn retired_and_unembedded_rows_are_excluded() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone());

    let kept = seed(&store, &service, "generate a weekly status report").await;
    let retired = seed(&store, &service, "generate a weekly status report too").await;
    store.retire(retired.id).expect("retire");
    // Row without a vector yet.
    store
        .create(PromptDraft::from_content("generate a weekly report draft"))
        .expect("create unembedded");

    let hits = engine
        .find_similar_text("generate a weekly status report", 10)
        .await
        .expect("search");
    let ids: Vec<_> = hits.iter().map(|h| h.prompt.id).collect();
    assert!(ids.contains(&kept.id));
    assert!(!ids.contains(&retired.id));
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn classification_separates_related_from_unrelated() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone())
        .with_thresholds(test_thresholds());

    let p1 = seed(&store, &service, "Write a Python function to sum two numbers").await;
    let p2 = seed(
        &store,
        &service,
        "Write a Python function to compute the product of two numbers",
    )
    .await;
    seed(&store, &service, "Bake chocolate chip cookies.").await;

    let related = engine
        .classify("Python function that adds two integers")
        .await
        .expect("classify related");
    assert!(matches!(
        related.classification,
        Classification::Same | Classification::Fork
    ));
    let best = related.best_match.expect("best match");
    assert!(best.prompt.id == p1.id || best.prompt.id == p2.id);
    assert!(related.score >= test_thresholds().tau_fork);

    let unrelated = engine.classify("knit a scarf").await.expect("classify unrelated");
    assert_eq!(unrelated.classification, Classification::New);
}

#[tokio::test]
async fn duplicate_content_classifies_same() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone())
        .with_thresholds(test_thresholds());

    let stored = seed(&store, &service, "Translate the following text to French").await;
    let result = engine
        .classify("Translate the following text to French")
        .await
        .expect("classify");
    assert_eq!(result.classification, Classification::Same);
    assert_eq!(result.best_match.expect("best").prompt.id, stored.id);
    assert!(result.score > 0.99);
}

#[tokio::test]
async fn equal_scores_break_ties_by_recency() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone());

    let older = seed(&store, &service, "identical tie break content").await;
    let newer = seed(&store, &service, "identical tie break content").await;
    // Touch `newer` so its updated_at is strictly later.
    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut draft = PromptDraft::from_content("identical tie break content");
    draft.author = Some("touched".to_string());
    store.update(newer.id, draft, None).expect("touch");

    let hits = engine
        .find_similar_text("identical tie break content", 2)
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);
    assert!((hits[0].score - hits[1].score).abs() < 1e-6);
    assert_eq!(hits[0].prompt.id, newer.id);
    assert_eq!(hits[1].prompt.id, older.id);
}

#[tokio::test]
async fn indexed_path_still_finds_exact_match() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone()).with_min_index_rows(10);

    for i in 0..40 {
        seed(&store, &service, &format!("corpus prompt number {i} about topic {}", i % 7)).await;
    }
    let needle = seed(&store, &service, "a very specific needle about llamas").await;

    let hits = engine
        .find_similar_text("a very specific needle about llamas", 3)
        .await
        .expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].prompt.id, needle.id);
    assert!(hits[0].score > 0.99);
}

#[tokio::test]
async fn limit_zero_returns_empty() {
    let store = Arc::new(PromptStore::new());
    let service = embedding_service();
    let engine = SimilarityEngine::new(store.clone(), service.clone());
    seed(&store, &service, "some stored prompt").await;

    let hits = engine
        .find_similar_vec(&vec![0.5; EMBEDDING_DIM], 0)
        .await
        .expect("search");
    assert!(hits.is_empty());
}
