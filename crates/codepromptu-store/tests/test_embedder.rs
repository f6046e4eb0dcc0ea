#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use codepromptu_embedding::{
    EmbeddingBackend, EmbeddingError, EmbeddingService, HashEmbeddingBackend,
};
use codepromptu_store::{EmbeddingWriter, PromptService, PromptStore};
use codepromptu_types::PromptDraft;

/// Backend that fails the first `failures` calls, then delegates.
struct FlakyBackend {
    inner: HashEmbeddingBackend,
    failures: AtomicU32,
}

#[async_trait]
impl EmbeddingBackend for FlakyBackend {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmbeddingError::Malformed("induced failure".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

async fn wait_for_embedding(
    store: &PromptStore,
    id: uuid::Uuid,
    deadline: Duration,
) -> Option<Vec<f32>> {
    let start = tokio::time::Instant::now();
    loop {
        if let Ok(prompt) = store.get(id) {
            if let Some(embedding) = prompt.embedding {
                return Some(embedding);
            }
        }
        if start.elapsed() > deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn create_embeds_shortly_after_row_save() {
    let store = Arc::new(PromptStore::new());
    let embedding = EmbeddingService::new(Arc::new(HashEmbeddingBackend::new()));
    let (writer, worker) = EmbeddingWriter::spawn(store.clone(), embedding.clone());
    let service = PromptService::new(store.clone(), writer);

    let created = service
        .create(PromptDraft::from_content("embed this prompt"))
        .expect("create");

    let vector = wait_for_embedding(&store, created.id, Duration::from_secs(2))
        .await
        .expect("embedded in time");
    let expected = embedding.embed("embed this prompt").await.expect("embed");
    assert_eq!(vector, expected);
    worker.abort();
}

#[tokio::test]
async fn content_update_reembeds_to_match_new_content() {
    let store = Arc::new(PromptStore::new());
    let embedding = EmbeddingService::new(Arc::new(HashEmbeddingBackend::new()));
    let (writer, worker) = EmbeddingWriter::spawn(store.clone(), embedding.clone());
    let service = PromptService::new(store.clone(), writer);

    let created = service
        .create(PromptDraft::from_content("first revision"))
        .expect("create");
    wait_for_embedding(&store, created.id, Duration::from_secs(2))
        .await
        .expect("first embedding");

    let updated = service
        .update(created.id, PromptDraft::from_content("second revision"), None)
        .expect("update");
    assert_eq!(updated.version, 2);

    let vector = wait_for_embedding(&store, created.id, Duration::from_secs(2))
        .await
        .expect("re-embedded");
    let expected = embedding.embed("second revision").await.expect("embed");
    assert_eq!(vector, expected);
    worker.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_embeds_are_parked_and_retried() {
    let store = Arc::new(PromptStore::new());
    let backend = Arc::new(FlakyBackend {
        inner: HashEmbeddingBackend::new(),
        failures: AtomicU32::new(6),
    });
    // Single attempt per call so the writer's parking path is exercised.
    let embedding = EmbeddingService::new(backend).with_retry(1, Duration::from_secs(1));
    let (writer, worker) = EmbeddingWriter::spawn(store.clone(), embedding);
    let service = PromptService::new(store.clone(), writer);

    let created = service
        .create(PromptDraft::from_content("eventually embedded"))
        .expect("create");

    let vector = wait_for_embedding(&store, created.id, Duration::from_secs(120))
        .await
        .expect("embedded after retries");
    assert!(!vector.is_empty());
    worker.abort();
}
