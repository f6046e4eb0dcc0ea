//! Upstream LLM provider identities.

use serde::{Deserialize, Serialize};

/// An upstream LLM provider reachable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provider {
    /// OpenAI chat/completions/embeddings endpoints.
    Openai,
    /// Anthropic messages/complete endpoints.
    Anthropic,
    /// Google Generative Language (`generateContent`) endpoints.
    GoogleAi,
}

impl Provider {
    /// Stable uppercase name, matching the persisted `provider` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "OPENAI",
            Provider::Anthropic => "ANTHROPIC",
            Provider::GoogleAi => "GOOGLE_AI",
        }
    }

    /// All providers, in detection-table order.
    #[must_use]
    pub fn all() -> &'static [Provider] {
        &[Provider::Openai, Provider::Anthropic, Provider::GoogleAi]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
