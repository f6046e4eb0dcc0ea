//! Gateway configuration.
//!
//! Layered loading, lowest to highest precedence: normative defaults, the
//! YAML file named by `CONFIG_URI`, then environment variables. Secrets
//! (`EMBEDDING_API_KEY`) come only from the environment and are read by
//! the embedding backend itself, never held here.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use codepromptu_types::limits::{
    BREAKER_COOLDOWN_SECS, BREAKER_FAILURE_RATE, BREAKER_WINDOW, CHAT_TIMEOUT_SECS,
    EMBEDDINGS_TIMEOUT_SECS, FALLBACK_TTL_SECS, MAX_CAPTURE_BYTES, MIN_INDEX_ROWS,
    SESSION_IDLE_TIMEOUT_SECS, TAU_FORK, TAU_SAME,
};

use crate::capture::pipeline::PipelineConfig;
use crate::provider::ProviderBases;

/// Default bind address.
const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Cap on a buffered request body before forwarding (distinct from the
/// capture cap; bodies above it are a gateway error).
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Which embedding backend to run.
#[derive(Debug, Clone)]
pub enum EmbeddingBackendKind {
    /// Deterministic hash backend; no network, used in tests and dev.
    Hash,
    /// HTTP backend (OpenAI embeddings shape).
    Http {
        /// API base, e.g. `https://api.openai.com/v1`.
        base_url: String,
        /// Embedding model name.
        model: String,
    },
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listen address, e.g. `0.0.0.0:8080`.
    pub bind_addr: String,
    /// Per-provider target base URLs.
    pub provider_bases: ProviderBases,
    /// Capture buffer cap per direction.
    pub max_capture_bytes: usize,
    /// Request body buffering cap.
    pub max_body_bytes: usize,
    /// Provider forward timeout for chat endpoints.
    pub chat_timeout: Duration,
    /// Provider forward timeout for embeddings endpoints.
    pub embeddings_timeout: Duration,
    /// SAME threshold.
    pub tau_same: f32,
    /// FORK threshold.
    pub tau_fork: f32,
    /// Rows before the ANN index is maintained.
    pub min_index_rows: usize,
    /// Session idle timeout in seconds.
    pub session_idle_timeout_secs: u64,
    /// Capture pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Breaker window size.
    pub breaker_window: usize,
    /// Breaker failure rate threshold.
    pub breaker_failure_rate: f64,
    /// Breaker open cooldown.
    pub breaker_cooldown: Duration,
    /// Embedding backend selection.
    pub embedding_backend: EmbeddingBackendKind,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bind_addr: DEFAULT_BIND.to_string(),
            provider_bases: ProviderBases::default(),
            max_capture_bytes: MAX_CAPTURE_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            chat_timeout: Duration::from_secs(CHAT_TIMEOUT_SECS),
            embeddings_timeout: Duration::from_secs(EMBEDDINGS_TIMEOUT_SECS),
            tau_same: TAU_SAME,
            tau_fork: TAU_FORK,
            min_index_rows: MIN_INDEX_ROWS,
            session_idle_timeout_secs: SESSION_IDLE_TIMEOUT_SECS,
            pipeline: PipelineConfig::default(),
            breaker_window: BREAKER_WINDOW,
            breaker_failure_rate: BREAKER_FAILURE_RATE,
            breaker_cooldown: Duration::from_secs(BREAKER_COOLDOWN_SECS),
            embedding_backend: EmbeddingBackendKind::Hash,
        }
    }
}

/// YAML file shape; every field optional, merged over defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Listen address.
    pub bind: Option<String>,
    /// Provider base URL overrides.
    #[serde(default)]
    pub providers: ProvidersSection,
    /// Capture and pipeline tuning.
    #[serde(default)]
    pub capture: CaptureSection,
    /// Similarity thresholds.
    #[serde(default)]
    pub similarity: SimilaritySection,
    /// Session settings.
    #[serde(default)]
    pub sessions: SessionsSection,
    /// Egress timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    /// Circuit breaker tuning.
    #[serde(default)]
    pub breaker: BreakerSection,
    /// Embedding backend selection.
    #[serde(default)]
    pub embedding: EmbeddingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct ProvidersSection {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub google_ai: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct CaptureSection {
    pub max_capture_bytes: Option<usize>,
    pub fallback_queue_capacity: Option<usize>,
    pub fallback_ttl_ms: Option<u64>,
    pub drain_interval_secs: Option<u64>,
    pub ingest_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct SimilaritySection {
    pub tau_same: Option<f32>,
    pub tau_fork: Option<f32>,
    pub min_index_rows: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct SessionsSection {
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct TimeoutsSection {
    pub chat_secs: Option<u64>,
    pub embeddings_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct BreakerSection {
    pub window: Option<usize>,
    pub failure_rate: Option<f64>,
    pub cooldown_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[allow(missing_docs)]
pub struct EmbeddingSection {
    /// `hash` or `http`.
    pub backend: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl GatewayConfig {
    /// Defaults, then `CONFIG_URI` file, then environment.
    pub fn load() -> Result<Self> {
        let mut config = GatewayConfig::default();
        if let Ok(uri) = std::env::var("CONFIG_URI") {
            let uri = uri.trim();
            if !uri.is_empty() {
                config.apply_file(Path::new(uri))?;
            }
        }
        config.apply_env();
        Ok(config)
    }

    /// Merge a YAML file into this config.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file: ConfigFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        self.merge_file(file);
        Ok(())
    }

    /// Merge a parsed file shape into this config.
    pub fn merge_file(&mut self, file: ConfigFile) {
        if let Some(bind) = file.bind {
            self.bind_addr = bind;
        }
        if let Some(openai) = file.providers.openai {
            self.provider_bases.openai = openai;
        }
        if let Some(anthropic) = file.providers.anthropic {
            self.provider_bases.anthropic = anthropic;
        }
        if let Some(google_ai) = file.providers.google_ai {
            self.provider_bases.google_ai = google_ai;
        }
        if let Some(v) = file.capture.max_capture_bytes {
            self.max_capture_bytes = v;
        }
        if let Some(v) = file.capture.fallback_queue_capacity {
            self.pipeline.fallback_capacity = v;
        }
        if let Some(v) = file.capture.fallback_ttl_ms {
            self.pipeline.fallback_ttl = Duration::from_millis(v);
        }
        if let Some(v) = file.capture.drain_interval_secs {
            self.pipeline.drain_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.capture.ingest_timeout_secs {
            self.pipeline.ingest_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.similarity.tau_same {
            self.tau_same = v;
        }
        if let Some(v) = file.similarity.tau_fork {
            self.tau_fork = v;
        }
        if let Some(v) = file.similarity.min_index_rows {
            self.min_index_rows = v;
        }
        if let Some(v) = file.sessions.idle_timeout_secs {
            self.session_idle_timeout_secs = v;
        }
        if let Some(v) = file.timeouts.chat_secs {
            self.chat_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.timeouts.embeddings_secs {
            self.embeddings_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.breaker.window {
            self.breaker_window = v;
        }
        if let Some(v) = file.breaker.failure_rate {
            self.breaker_failure_rate = v;
        }
        if let Some(v) = file.breaker.cooldown_secs {
            self.breaker_cooldown = Duration::from_secs(v);
        }
        match file.embedding.backend.as_deref() {
            Some("http") => {
                self.embedding_backend = EmbeddingBackendKind::Http {
                    base_url: file
                        .embedding
                        .base_url
                        .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                    model: file
                        .embedding
                        .model
                        .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
                };
            }
            Some("hash") => self.embedding_backend = EmbeddingBackendKind::Hash,
            _ => {}
        }
    }

    /// Environment overrides; env wins over file wins over defaults.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_string("CODEPROMPTU_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = env_string("OPENAI_BASE_URL") {
            self.provider_bases.openai = v;
        }
        if let Some(v) = env_string("ANTHROPIC_BASE_URL") {
            self.provider_bases.anthropic = v;
        }
        if let Some(v) = env_string("GOOGLE_AI_BASE_URL") {
            self.provider_bases.google_ai = v;
        }
        if let Some(v) = env_parse::<usize>("MAX_CAPTURE_BYTES") {
            self.max_capture_bytes = v;
        }
        if let Some(v) = env_parse::<u64>("FALLBACK_TTL_MS") {
            self.pipeline.fallback_ttl = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<f32>("TAU_SAME") {
            self.tau_same = v;
        }
        if let Some(v) = env_parse::<f32>("TAU_FORK") {
            self.tau_fork = v;
        }
        if let Some(v) = env_parse::<u64>("SESSION_IDLE_TIMEOUT_SECS") {
            self.session_idle_timeout_secs = v;
        }
        match env_string("EMBEDDING_BACKEND").as_deref() {
            Some("http") => {
                self.embedding_backend = EmbeddingBackendKind::Http {
                    base_url: env_string("EMBEDDING_BASE_URL")
                        .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                    model: env_string("EMBEDDING_MODEL")
                        .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
                };
            }
            Some("hash") => self.embedding_backend = EmbeddingBackendKind::Hash,
            _ => {}
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|v| v.parse().ok())
}
