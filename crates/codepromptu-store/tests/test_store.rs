#![allow(missing_docs)]

use chrono::Utc;
use serde_json::Map;
use uuid::Uuid;

use codepromptu_store::{PromptFilter, PromptStore, StoreError};
use codepromptu_types::limits::EMBEDDING_DIM;
use codepromptu_types::{PromptDraft, PromptUsage, Provider, TokenUsage};

fn draft(content: &str) -> PromptDraft {
    PromptDraft::from_content(content)
}

fn usage_row(request_id: Uuid) -> PromptUsage {
    PromptUsage {
        id: Uuid::new_v4(),
        request_id,
        correlation_id: "corr-1".to_string(),
        prompt_id: None,
        provider: Provider::Openai,
        model: Some("gpt-4".to_string()),
        request_timestamp: Utc::now(),
        response_timestamp: Some(Utc::now()),
        client_ip: Some("127.0.0.1".to_string()),
        user_agent: Some("test".to_string()),
        api_key_hash: "abcd1234abcd1234".to_string(),
        token_usage: Some(TokenUsage::new(1, 1, 2)),
        metadata: Map::new(),
    }
}

#[test]
fn create_round_trips_content_and_defaults() {
    let store = PromptStore::new();
    let created = store.create(draft("summarize this document")).expect("create");
    let read = store.get(created.id).expect("get");
    assert_eq!(read.content, "summarize this document");
    assert_eq!(read.version, 1);
    assert!(read.is_active);
    assert!(read.embedding.is_none());
    assert!(read.parent_id.is_none());
}

#[test]
fn create_normalizes_tags() {
    let store = PromptStore::new();
    let mut d = draft("tagged prompt");
    d.tags = vec![
        " summarization ".to_string(),
        "summarization".to_string(),
        String::new(),
        "prod".to_string(),
    ];
    let created = store.create(d).expect("create");
    assert_eq!(created.tags, vec!["summarization", "prod"]);
}

#[test]
fn create_rejects_empty_content() {
    let store = PromptStore::new();
    let result = store.create(draft("   "));
    assert!(matches!(result, Err(StoreError::InvalidContent(_))));
}

#[test]
fn create_rejects_oversize_content() {
    let store = PromptStore::with_limits(EMBEDDING_DIM, 16, 100);
    let result = store.create(draft("this content is longer than sixteen chars"));
    assert!(matches!(result, Err(StoreError::InvalidContent(_))));
}

#[test]
fn create_rejects_unknown_parent() {
    let store = PromptStore::new();
    let mut d = draft("child");
    d.parent_id = Some(Uuid::new_v4());
    assert!(matches!(
        store.create(d),
        Err(StoreError::LineageInvalid(_))
    ));
}

#[test]
fn update_bumps_version_only_on_content_change() {
    let store = PromptStore::new();
    let created = store.create(draft("v1 content")).expect("create");

    // Metadata-only update: same version.
    let mut unchanged = draft("v1 content");
    unchanged.author = Some("ana".to_string());
    let (updated, changed) = store
        .update(created.id, unchanged, None)
        .expect("metadata update");
    assert!(!changed);
    assert_eq!(updated.version, 1);
    assert_eq!(updated.author.as_deref(), Some("ana"));

    // Content change: version bump.
    let (updated, changed) = store
        .update(created.id, draft("v2 content"), None)
        .expect("content update");
    assert!(changed);
    assert_eq!(updated.version, 2);
    assert_eq!(updated.content, "v2 content");
}

#[test]
fn content_update_clears_stale_embedding() {
    let store = PromptStore::new();
    let created = store.create(draft("original")).expect("create");
    store
        .set_embedding(created.id, 1, vec![0.5; EMBEDDING_DIM])
        .expect("set embedding");
    assert!(store.get(created.id).expect("get").embedding.is_some());

    let (updated, _) = store
        .update(created.id, draft("rewritten"), None)
        .expect("update");
    assert_eq!(updated.version, 2);
    assert!(updated.embedding.is_none());
}

#[test]
fn update_conflicts_on_stale_expected_version() {
    let store = PromptStore::new();
    let created = store.create(draft("first")).expect("create");
    store
        .update(created.id, draft("second"), Some(1))
        .expect("first update");
    let result = store.update(created.id, draft("third"), Some(1));
    match result {
        Err(StoreError::Conflict { expected, actual, .. }) => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[test]
fn update_rejects_self_parent() {
    let store = PromptStore::new();
    let created = store.create(draft("solo")).expect("create");
    let mut d = draft("solo");
    d.parent_id = Some(created.id);
    assert!(matches!(
        store.update(created.id, d, None),
        Err(StoreError::LineageInvalid(_))
    ));
}

#[test]
fn update_rejects_parent_cycle() {
    let store = PromptStore::new();
    let root = store.create(draft("root")).expect("create root");
    let child = store.fork(root.id, "child".to_string(), None).expect("fork");

    let mut d = draft("root");
    d.parent_id = Some(child.id);
    assert!(matches!(
        store.update(root.id, d, None),
        Err(StoreError::LineageInvalid(_))
    ));
}

#[test]
fn retire_is_idempotent() {
    let store = PromptStore::new();
    let created = store.create(draft("to retire")).expect("create");
    store.retire(created.id).expect("first retire");
    store.retire(created.id).expect("second retire");
    let read = store.get(created.id).expect("get");
    assert!(!read.is_active);
}

#[test]
fn retire_unknown_id_is_not_found() {
    let store = PromptStore::new();
    assert!(matches!(
        store.retire(Uuid::new_v4()),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn fork_lineage_and_ancestor_order() {
    let store = PromptStore::new();
    let p0 = store.create(draft("v0")).expect("create");
    let p1 = store.fork(p0.id, "v1".to_string(), Some("a".to_string())).expect("fork p1");
    let p2 = store.fork(p1.id, "v2".to_string(), Some("a".to_string())).expect("fork p2");

    assert_eq!(store.get(p2.id).expect("get").parent_id, Some(p1.id));

    let lineage = store.ancestors(p2.id).expect("ancestors");
    let ids: Vec<Uuid> = lineage.chain.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![p1.id, p0.id]);
    assert!(!lineage.truncated);
    assert_eq!(lineage.chain[0].id, p1.id);
}

#[test]
fn ancestors_truncate_at_depth_bound() {
    let k = 5;
    let store = PromptStore::with_limits(EMBEDDING_DIM, 100_000, k);

    // Chain of exactly K ancestors: all returned, untruncated.
    let mut head = store.create(draft("gen 0")).expect("create");
    for generation in 1..=k {
        head = store
            .fork(head.id, format!("gen {generation}"), None)
            .expect("fork");
    }
    let lineage = store.ancestors(head.id).expect("ancestors");
    assert_eq!(lineage.chain.len(), k);
    assert!(!lineage.truncated);
    assert_eq!(lineage.chain[k - 1].content, "gen 0");

    // One more generation: still K entries, the K-th reported as root.
    let deeper = store
        .fork(head.id, "gen 6".to_string(), None)
        .expect("fork deeper");
    let lineage = store.ancestors(deeper.id).expect("ancestors");
    assert_eq!(lineage.chain.len(), k);
    assert!(lineage.truncated);
    assert_eq!(lineage.chain[k - 1].content, "gen 1");
}

#[test]
fn list_filters_and_pagination() {
    let store = PromptStore::new();
    for i in 0..5 {
        let mut d = draft(&format!("alpha prompt {i}"));
        d.author = Some("ana".to_string());
        d.tags = vec!["team-a".to_string()];
        store.create(d).expect("create");
    }
    let mut other = draft("beta prompt");
    other.author = Some("bob".to_string());
    let retired = store.create(other).expect("create beta");
    store.retire(retired.id).expect("retire");

    let by_author = store.list(&PromptFilter {
        author: Some("ana".to_string()),
        ..PromptFilter::default()
    });
    assert_eq!(by_author.len(), 5);

    let by_tag = store.list(&PromptFilter {
        tag: Some("team-a".to_string()),
        ..PromptFilter::default()
    });
    assert_eq!(by_tag.len(), 5);

    let by_content = store.list(&PromptFilter {
        content_search: Some("ALPHA".to_string()),
        ..PromptFilter::default()
    });
    assert_eq!(by_content.len(), 5);

    // Retired rows are invisible to default listings.
    let all = store.list(&PromptFilter::default());
    assert_eq!(all.len(), 5);

    let page = store.list(&PromptFilter {
        limit: 2,
        offset: 4,
        ..PromptFilter::default()
    });
    assert_eq!(page.len(), 1);
}

#[test]
fn ingest_usage_is_idempotent_on_request_id() {
    let store = PromptStore::new();
    let request_id = Uuid::new_v4();
    let first = store.ingest_usage(usage_row(request_id));
    let second = store.ingest_usage(usage_row(request_id));
    assert_eq!(store.usage_count(), 1);
    assert_eq!(first.id, second.id);
    assert_eq!(
        store.usage_by_request(request_id).expect("usage").id,
        first.id
    );
}

#[test]
fn set_embedding_validates_dimension_and_version() {
    let store = PromptStore::new();
    let created = store.create(draft("embed me")).expect("create");

    assert!(matches!(
        store.set_embedding(created.id, 1, vec![0.1; 3]),
        Err(StoreError::InvalidVector { .. })
    ));

    // Stale version: skipped, not written.
    store
        .update(created.id, draft("embed me v2"), None)
        .expect("update");
    let written = store
        .set_embedding(created.id, 1, vec![0.1; EMBEDDING_DIM])
        .expect("stale write");
    assert!(!written);
    assert!(store.get(created.id).expect("get").embedding.is_none());

    let written = store
        .set_embedding(created.id, 2, vec![0.1; EMBEDDING_DIM])
        .expect("current write");
    assert!(written);
    assert!(store.get(created.id).expect("get").embedding.is_some());
}
