//! PromptService - the store's public write contract.
//!
//! Wraps row persistence and the asynchronous embedding trigger: every
//! create, content update and fork saves the row first, then queues the
//! dedicated vector write.

use std::sync::Arc;

use uuid::Uuid;

use codepromptu_types::{Prompt, PromptDraft, PromptUsage};

use crate::embedder::{EmbedJob, EmbeddingWriter};
use crate::error::StoreError;
use crate::store::{AncestorChain, PromptFilter, PromptStore};

/// Facade over the prompt store that keeps embeddings flowing.
#[derive(Clone)]
pub struct PromptService {
    store: Arc<PromptStore>,
    writer: EmbeddingWriter,
}

impl PromptService {
    /// Service over `store`, embedding through `writer`.
    #[must_use]
    pub fn new(store: Arc<PromptStore>, writer: EmbeddingWriter) -> Self {
        PromptService { store, writer }
    }

    /// The underlying row store.
    #[must_use]
    pub fn store(&self) -> &Arc<PromptStore> {
        &self.store
    }

    /// Create a prompt and queue its embedding.
    pub fn create(&self, draft: PromptDraft) -> Result<Prompt, StoreError> {
        let prompt = self.store.create(draft)?;
        self.queue_embed(&prompt);
        Ok(prompt)
    }

    /// Read a prompt.
    pub fn get(&self, id: Uuid) -> Result<Prompt, StoreError> {
        self.store.get(id)
    }

    /// Update a prompt; a content change queues re-embedding.
    pub fn update(
        &self,
        id: Uuid,
        draft: PromptDraft,
        expected_version: Option<u32>,
    ) -> Result<Prompt, StoreError> {
        let (prompt, content_changed) = self.store.update(id, draft, expected_version)?;
        if content_changed {
            self.queue_embed(&prompt);
        }
        Ok(prompt)
    }

    /// Soft-retire a prompt.
    pub fn retire(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.retire(id)
    }

    /// Fork a prompt and queue the child's embedding.
    pub fn fork(
        &self,
        parent_id: Uuid,
        content: String,
        author: Option<String>,
    ) -> Result<Prompt, StoreError> {
        let prompt = self.store.fork(parent_id, content, author)?;
        self.queue_embed(&prompt);
        Ok(prompt)
    }

    /// List prompts matching `filter`.
    #[must_use]
    pub fn list(&self, filter: &PromptFilter) -> Vec<Prompt> {
        self.store.list(filter)
    }

    /// Ancestor chain toward the root, truncated at K.
    pub fn ancestors(&self, id: Uuid) -> Result<AncestorChain, StoreError> {
        self.store.ancestors(id)
    }

    /// Store a usage row, idempotent on `request_id`.
    pub fn ingest_usage(&self, usage: PromptUsage) -> PromptUsage {
        self.store.ingest_usage(usage)
    }

    fn queue_embed(&self, prompt: &Prompt) {
        self.writer.submit(EmbedJob {
            prompt_id: prompt.id,
            version: prompt.version,
            content: prompt.content.clone(),
        });
    }
}
