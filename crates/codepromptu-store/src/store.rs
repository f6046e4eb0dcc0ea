//! PromptStore - concurrent, versioned prompt rows and usage ingest.
//!
//! Rows live in sharded maps; every mutation happens under a single
//! row-scoped lock, which gives the per-row serialization the store
//! promises. The embedding is written adjacent to the row in a second,
//! dedicated step (`set_embedding`), so a row is briefly visible with a
//! null vector after create or a content update.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use codepromptu_types::limits::{EMBEDDING_DIM, MAX_LINEAGE_DEPTH, MAX_PROMPT_CHARS};
use codepromptu_types::{Prompt, PromptDraft, PromptUsage};

use crate::error::StoreError;

/// Ancestor chain toward the root, nearest parent first.
#[derive(Debug, Clone)]
pub struct AncestorChain {
    /// Ancestors, nearest first; at most K entries.
    pub chain: Vec<Prompt>,
    /// True when the walk stopped at the depth bound; the last entry is the
    /// approximate root.
    pub truncated: bool,
}

/// Filters for prompt listing; all optional, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct PromptFilter {
    /// Exact match on `team_owner`.
    pub team_owner: Option<String>,
    /// Exact match on `author`.
    pub author: Option<String>,
    /// Membership match on `tags`.
    pub tag: Option<String>,
    /// Case-insensitive substring match on `content`.
    pub content_search: Option<String>,
    /// Include retired prompts; listings default to active only.
    pub include_inactive: bool,
    /// Maximum rows returned.
    pub limit: usize,
    /// Rows skipped from the newest end.
    pub offset: usize,
}

impl PromptFilter {
    /// Filter returning the newest `limit` active prompts.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        PromptFilter {
            limit,
            ..PromptFilter::default()
        }
    }
}

/// Concurrent prompt and usage row store.
pub struct PromptStore {
    rows: DashMap<Uuid, Prompt>,
    usages: DashMap<Uuid, PromptUsage>,
    usage_request_index: DashMap<Uuid, Uuid>,
    dimension: usize,
    max_content_chars: usize,
    max_lineage_depth: usize,
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptStore {
    /// Empty store with the normative bounds (D=1536, K=100).
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(EMBEDDING_DIM, MAX_PROMPT_CHARS, MAX_LINEAGE_DEPTH)
    }

    /// Empty store with explicit bounds.
    #[must_use]
    pub fn with_limits(dimension: usize, max_content_chars: usize, max_lineage_depth: usize) -> Self {
        PromptStore {
            rows: DashMap::new(),
            usages: DashMap::new(),
            usage_request_index: DashMap::new(),
            dimension: dimension.max(1),
            max_content_chars,
            max_lineage_depth: max_lineage_depth.max(1),
        }
    }

    /// Fixed embedding dimension enforced on vector writes.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Lineage traversal bound K.
    #[must_use]
    pub fn max_lineage_depth(&self) -> usize {
        self.max_lineage_depth
    }

    /// Persist a new prompt; `version = 1`, `is_active = true`, embedding
    /// null until the dedicated vector write lands.
    pub fn create(&self, draft: PromptDraft) -> Result<Prompt, StoreError> {
        self.validate_content(&draft.content)?;
        if let Some(parent_id) = draft.parent_id {
            if !self.rows.contains_key(&parent_id) {
                return Err(StoreError::LineageInvalid(format!(
                    "parent {parent_id} does not exist"
                )));
            }
        }
        let now = Utc::now();
        let prompt = Prompt {
            id: Uuid::new_v4(),
            content: draft.content,
            author: draft.author,
            team_owner: draft.team_owner,
            purpose: draft.purpose,
            success_criteria: draft.success_criteria,
            model_target: draft.model_target,
            tags: normalize_tags(draft.tags),
            metadata: draft.metadata,
            parent_id: draft.parent_id,
            version: 1,
            is_active: true,
            embedding: None,
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(prompt.id, prompt.clone());
        tracing::debug!(
            event = "store.prompt.created",
            prompt_id = %prompt.id,
            parent_id = ?prompt.parent_id,
            content_chars = prompt.content.chars().count(),
            "prompt created"
        );
        Ok(prompt)
    }

    /// Read one prompt.
    pub fn get(&self, id: Uuid) -> Result<Prompt, StoreError> {
        self.rows
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Replace the mutable fields of a prompt.
    ///
    /// A content change bumps `version` and clears the embedding so the
    /// writer can replace it. `expected_version`, when given, must match the
    /// stored version or the call fails with `Conflict`.
    ///
    /// Returns the new row and whether the content changed.
    pub fn update(
        &self,
        id: Uuid,
        draft: PromptDraft,
        expected_version: Option<u32>,
    ) -> Result<(Prompt, bool), StoreError> {
        self.validate_content(&draft.content)?;
        // Lineage checks walk other rows, so they run before the row lock
        // is taken.
        if let Some(parent_id) = draft.parent_id {
            self.validate_lineage(id, parent_id)?;
        }
        let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let row = entry.value_mut();
        if let Some(expected) = expected_version {
            if row.version != expected {
                return Err(StoreError::Conflict {
                    id,
                    expected,
                    actual: row.version,
                });
            }
        }
        let content_changed = row.content != draft.content;
        row.author = draft.author;
        row.team_owner = draft.team_owner;
        row.purpose = draft.purpose;
        row.success_criteria = draft.success_criteria;
        row.model_target = draft.model_target;
        row.tags = normalize_tags(draft.tags);
        row.metadata = draft.metadata;
        row.parent_id = draft.parent_id;
        row.updated_at = Utc::now();
        if content_changed {
            row.content = draft.content;
            row.version += 1;
            row.embedding = None;
        }
        let updated = row.clone();
        drop(entry);
        tracing::debug!(
            event = "store.prompt.updated",
            prompt_id = %id,
            version = updated.version,
            content_changed,
            "prompt updated"
        );
        Ok((updated, content_changed))
    }

    /// Soft-retire a prompt; idempotent once the row exists.
    pub fn retire(&self, id: Uuid) -> Result<(), StoreError> {
        let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let row = entry.value_mut();
        if row.is_active {
            row.is_active = false;
            row.updated_at = Utc::now();
            tracing::debug!(event = "store.prompt.retired", prompt_id = %id, "prompt retired");
        }
        Ok(())
    }

    /// Materialize a new prompt derived from `parent_id`.
    pub fn fork(
        &self,
        parent_id: Uuid,
        content: String,
        author: Option<String>,
    ) -> Result<Prompt, StoreError> {
        let parent = self.get(parent_id)?;
        self.validate_content(&content)?;
        let draft = PromptDraft {
            content,
            author,
            team_owner: parent.team_owner.clone(),
            model_target: parent.model_target.clone(),
            tags: parent.tags.clone(),
            parent_id: Some(parent_id),
            ..PromptDraft::default()
        };
        let forked = self.create(draft)?;
        tracing::debug!(
            event = "store.prompt.forked",
            prompt_id = %forked.id,
            parent_id = %parent_id,
            "prompt forked"
        );
        Ok(forked)
    }

    /// List prompts matching `filter`, newest first.
    #[must_use]
    pub fn list(&self, filter: &PromptFilter) -> Vec<Prompt> {
        let mut matched: Vec<Prompt> = self
            .rows
            .iter()
            .filter(|r| filter_matches(r.value(), filter))
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let offset = filter.offset.min(matched.len());
        let limit = if filter.limit == 0 { matched.len() } else { filter.limit };
        matched.into_iter().skip(offset).take(limit).collect()
    }

    /// Ancestor chain toward the root, nearest parent first, truncated at K.
    pub fn ancestors(&self, id: Uuid) -> Result<AncestorChain, StoreError> {
        let start = self.get(id)?;
        let mut visited = std::collections::HashSet::from([id]);
        let mut chain = Vec::new();
        let mut cursor = start.parent_id;
        let mut truncated = false;
        while let Some(parent_id) = cursor {
            if chain.len() == self.max_lineage_depth {
                truncated = true;
                break;
            }
            if !visited.insert(parent_id) {
                // A cycle would loop forever; stop at the repeat point.
                tracing::warn!(
                    event = "store.lineage.cycle_detected",
                    prompt_id = %id,
                    repeat_id = %parent_id,
                    "ancestor walk hit a repeated node"
                );
                break;
            }
            let Some(parent) = self.rows.get(&parent_id).map(|r| r.value().clone()) else {
                break;
            };
            cursor = parent.parent_id;
            chain.push(parent);
        }
        Ok(AncestorChain { chain, truncated })
    }

    /// Store a usage row, idempotent on `request_id`; repeated submissions
    /// return the already-stored row.
    pub fn ingest_usage(&self, usage: PromptUsage) -> PromptUsage {
        match self.usage_request_index.entry(usage.request_id) {
            Entry::Occupied(existing) => {
                let usage_id = *existing.get();
                drop(existing);
                tracing::debug!(
                    event = "store.usage.deduplicated",
                    request_id = %usage.request_id,
                    "usage ingest deduplicated"
                );
                self.usages
                    .get(&usage_id)
                    .map_or(usage, |r| r.value().clone())
            }
            Entry::Vacant(slot) => {
                self.usages.insert(usage.id, usage.clone());
                slot.insert(usage.id);
                tracing::debug!(
                    event = "store.usage.ingested",
                    request_id = %usage.request_id,
                    usage_id = %usage.id,
                    provider = %usage.provider,
                    "usage ingested"
                );
                usage
            }
        }
    }

    /// Usage row previously stored for `request_id`, if any.
    #[must_use]
    pub fn usage_by_request(&self, request_id: Uuid) -> Option<PromptUsage> {
        let usage_id = *self.usage_request_index.get(&request_id)?;
        self.usages.get(&usage_id).map(|r| r.value().clone())
    }

    /// All usage rows, newest request first (operator listings and tests).
    #[must_use]
    pub fn list_usages(&self, limit: usize) -> Vec<PromptUsage> {
        let mut rows: Vec<PromptUsage> = self.usages.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| b.request_timestamp.cmp(&a.request_timestamp));
        if limit > 0 {
            rows.truncate(limit);
        }
        rows
    }

    /// Write the embedding adjacent to its row.
    ///
    /// The write is skipped (returns `Ok(false)`) when the row's version
    /// moved past `version`: the vector belongs to stale content and a
    /// fresh embed is already on its way.
    pub fn set_embedding(
        &self,
        id: Uuid,
        version: u32,
        vector: Vec<f32>,
    ) -> Result<bool, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::InvalidVector {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let mut entry = self.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let row = entry.value_mut();
        if row.version != version {
            return Ok(false);
        }
        row.embedding = Some(vector);
        row.updated_at = Utc::now();
        drop(entry);
        tracing::debug!(
            event = "store.embedding.written",
            prompt_id = %id,
            version,
            "embedding written"
        );
        Ok(true)
    }

    /// Active prompts carrying an embedding (similarity candidates).
    #[must_use]
    pub fn active_embedded_rows(&self) -> Vec<Prompt> {
        self.rows
            .iter()
            .filter(|r| r.value().is_searchable())
            .map(|r| r.value().clone())
            .collect()
    }

    /// Count of active prompts carrying an embedding.
    #[must_use]
    pub fn embedded_active_count(&self) -> usize {
        self.rows.iter().filter(|r| r.value().is_searchable()).count()
    }

    /// Total prompt rows, retired included.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.rows.len()
    }

    /// Total usage rows.
    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }

    fn validate_content(&self, content: &str) -> Result<(), StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::InvalidContent("content is empty".to_string()));
        }
        let chars = content.chars().count();
        if chars > self.max_content_chars {
            return Err(StoreError::InvalidContent(format!(
                "content has {chars} chars, above the {} cap",
                self.max_content_chars
            )));
        }
        Ok(())
    }

    /// Reject self-lineage and parent chains that loop back to `id`.
    fn validate_lineage(&self, id: Uuid, parent_id: Uuid) -> Result<(), StoreError> {
        if parent_id == id {
            return Err(StoreError::LineageInvalid(
                "a prompt cannot be its own parent".to_string(),
            ));
        }
        if !self.rows.contains_key(&parent_id) {
            return Err(StoreError::LineageInvalid(format!(
                "parent {parent_id} does not exist"
            )));
        }
        let mut cursor = Some(parent_id);
        let mut hops = 0usize;
        while let Some(current) = cursor {
            if current == id {
                return Err(StoreError::LineageInvalid(format!(
                    "parent {parent_id} would form a cycle through {id}"
                )));
            }
            if hops >= self.max_lineage_depth {
                break;
            }
            hops += 1;
            cursor = self.rows.get(&current).and_then(|r| r.value().parent_id);
        }
        Ok(())
    }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn filter_matches(prompt: &Prompt, filter: &PromptFilter) -> bool {
    if !filter.include_inactive && !prompt.is_active {
        return false;
    }
    if let Some(ref team) = filter.team_owner {
        if prompt.team_owner.as_deref() != Some(team.as_str()) {
            return false;
        }
    }
    if let Some(ref author) = filter.author {
        if prompt.author.as_deref() != Some(author.as_str()) {
            return false;
        }
    }
    if let Some(ref tag) = filter.tag {
        if !prompt.tags.iter().any(|t| t == tag) {
            return false;
        }
    }
    if let Some(ref needle) = filter.content_search {
        if !prompt
            .content
            .to_lowercase()
            .contains(&needle.to_lowercase())
        {
            return false;
        }
    }
    true
}
