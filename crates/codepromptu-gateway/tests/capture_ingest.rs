#![allow(missing_docs)]

use std::sync::Arc;

use chrono::Utc;

use codepromptu_embedding::{EmbeddingService, HashEmbeddingBackend};
use codepromptu_gateway::{CaptureIngest, StoreCaptureIngest, hash_credential};
use codepromptu_store::{ConversationLog, EmbeddingWriter, PromptService, PromptStore, SimilarityEngine};
use codepromptu_types::{CaptureContext, MessageType, Provider};

struct Fixture {
    store: Arc<PromptStore>,
    conversations: Arc<ConversationLog>,
    ingest: StoreCaptureIngest,
    _worker: tokio::task::JoinHandle<()>,
}

fn fixture() -> Fixture {
    let store = Arc::new(PromptStore::new());
    let embedding = EmbeddingService::new(Arc::new(HashEmbeddingBackend::new()));
    let (writer, worker) = EmbeddingWriter::spawn(store.clone(), embedding.clone());
    let prompts = PromptService::new(store.clone(), writer);
    let engine = Arc::new(SimilarityEngine::new(store.clone(), embedding));
    let conversations = Arc::new(ConversationLog::new());
    let ingest = StoreCaptureIngest::new(prompts, engine, conversations.clone());
    Fixture {
        store,
        conversations,
        ingest,
        _worker: worker,
    }
}

fn chat_capture(correlation_id: &str) -> CaptureContext {
    let mut ctx = CaptureContext::new(
        correlation_id.to_string(),
        Provider::Openai,
        hash_credential("sk-abc"),
        Utc::now(),
    );
    ctx.request_body =
        br#"{"model":"gpt-4","messages":[{"role":"user","content":"ping"}]}"#.to_vec();
    ctx.response_body = br#"{"id":"x","choices":[{"message":{"role":"assistant","content":"pong"}}],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#.to_vec();
    ctx.response_status = Some(200);
    ctx.response_timestamp = Some(Utc::now());
    ctx.client_ip = Some("127.0.0.1".to_string());
    ctx.user_agent = Some("sdk/1.0".to_string());
    ctx
}

async fn wait_for_embedded(store: &PromptStore) {
    let start = tokio::time::Instant::now();
    while store.embedded_active_count() == 0 {
        assert!(start.elapsed() < std::time::Duration::from_secs(2), "embed timed out");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn capture_stores_usage_prompt_and_messages() {
    let fx = fixture();
    let ctx = chat_capture("corr-ingest-1");
    let request_id = ctx.request_id;

    fx.ingest.ingest(ctx).await.expect("ingest");

    let usage = fx.store.usage_by_request(request_id).expect("usage stored");
    assert_eq!(usage.provider, Provider::Openai);
    assert_eq!(usage.model.as_deref(), Some("gpt-4"));
    let tokens = usage.token_usage.expect("token usage");
    assert_eq!(
        (tokens.prompt_tokens, tokens.completion_tokens, tokens.total_tokens),
        (1, 1, 2)
    );
    assert!(!usage.api_key_hash.is_empty());
    assert_ne!(usage.api_key_hash, "sk-abc");

    // The captured text lands as a new prompt linked from the usage row.
    let prompt_id = usage.prompt_id.expect("prompt created");
    let prompt = fx.store.get(prompt_id).expect("prompt");
    assert_eq!(prompt.content, "user: ping");

    let (session, messages) = fx
        .conversations
        .session_by_correlation("corr-ingest-1")
        .expect("session");
    assert_eq!(session.message_count, 2);
    assert_eq!(session.total_tokens, 2);
    assert_eq!(messages[0].message_type, MessageType::Prompt);
    assert_eq!(messages[0].content, "user: ping");
    assert_eq!(messages[1].message_type, MessageType::Response);
    assert_eq!(messages[1].content, "pong");
}

#[tokio::test]
async fn replayed_capture_is_fully_skipped() {
    let fx = fixture();
    let ctx = chat_capture("corr-ingest-2");
    let replay = ctx.clone();

    fx.ingest.ingest(ctx).await.expect("first ingest");
    fx.ingest.ingest(replay).await.expect("replay ingest");

    assert_eq!(fx.store.usage_count(), 1);
    let (session, messages) = fx
        .conversations
        .session_by_correlation("corr-ingest-2")
        .expect("session");
    assert_eq!(session.message_count, 2);
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn duplicate_prompt_text_links_instead_of_creating() {
    let fx = fixture();

    let first = chat_capture("corr-ingest-3");
    let first_request = first.request_id;
    fx.ingest.ingest(first).await.expect("first ingest");
    wait_for_embedded(&fx.store).await;

    // Same prompt text, different request: classifies SAME and links.
    let second = chat_capture("corr-ingest-4");
    let second_request = second.request_id;
    fx.ingest.ingest(second).await.expect("second ingest");

    assert_eq!(fx.store.prompt_count(), 1);
    let first_usage = fx.store.usage_by_request(first_request).expect("usage");
    let second_usage = fx.store.usage_by_request(second_request).expect("usage");
    assert!(first_usage.prompt_id.is_some());
    assert_eq!(second_usage.prompt_id, first_usage.prompt_id);
}

#[tokio::test]
async fn case_insensitive_credentials_hash_identically() {
    // The same key reaches the hash regardless of how the header was cased
    // on the wire; the hash depends only on the credential bytes.
    assert_eq!(hash_credential("sk-xyz"), hash_credential("sk-xyz"));
    assert_ne!(hash_credential("sk-xyz"), hash_credential("sk-XYZ"));
}
