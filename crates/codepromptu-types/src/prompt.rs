//! Prompt entity and the draft shape used to create or update one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The central entity: a stored prompt with version, lineage and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Stable identifier, generated on creation.
    pub id: Uuid,
    /// Normalized prompt text.
    pub content: String,
    /// Free-text author.
    pub author: Option<String>,
    /// Free-text owning team.
    pub team_owner: Option<String>,
    /// What the prompt is for.
    pub purpose: Option<String>,
    /// How success is judged.
    pub success_criteria: Option<String>,
    /// Intended provider/model hint.
    pub model_target: Option<String>,
    /// Short tag strings, de-duplicated on write.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary structured metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Parent prompt for fork lineage; never equal to `id`.
    pub parent_id: Option<Uuid>,
    /// Monotonically increasing, starts at 1.
    pub version: u32,
    /// Cleared on retire; retired prompts stay stored.
    pub is_active: bool,
    /// Fixed-dimension embedding; None only until the vector write lands.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Creation time (UTC, millisecond precision).
    pub created_at: DateTime<Utc>,
    /// Last update time (UTC, millisecond precision).
    pub updated_at: DateTime<Utc>,
}

impl Prompt {
    /// Whether the prompt participates in listing and similarity queries.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.is_active && self.embedding.is_some()
    }
}

/// Mutable fields of a prompt, as accepted by create/update/fork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptDraft {
    /// Prompt text; required, bounded by `MAX_PROMPT_CHARS`.
    pub content: String,
    /// Free-text author.
    #[serde(default)]
    pub author: Option<String>,
    /// Free-text owning team.
    #[serde(default)]
    pub team_owner: Option<String>,
    /// What the prompt is for.
    #[serde(default)]
    pub purpose: Option<String>,
    /// How success is judged.
    #[serde(default)]
    pub success_criteria: Option<String>,
    /// Intended provider/model hint.
    #[serde(default)]
    pub model_target: Option<String>,
    /// Short tag strings.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary structured metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Parent prompt reference.
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

impl PromptDraft {
    /// Draft with content only; everything else defaulted.
    #[must_use]
    pub fn from_content(content: impl Into<String>) -> Self {
        PromptDraft {
            content: content.into(),
            ..PromptDraft::default()
        }
    }
}
