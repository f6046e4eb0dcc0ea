//! HTTP embedding backend (OpenAI embeddings API shape).

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use codepromptu_types::limits::{EMBED_CALL_TIMEOUT_SECS, EMBEDDING_DIM};

use crate::{EmbeddingBackend, EmbeddingError};

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Backend calling `POST {base}/embeddings` with a bearer credential.
///
/// The credential comes from `EMBEDDING_API_KEY`; it is held in memory only
/// and never logged.
pub struct HttpEmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

impl HttpEmbeddingBackend {
    /// Backend for `base_url` (e.g. `https://api.openai.com/v1`) and `model`.
    ///
    /// Reads `EMBEDDING_API_KEY` from the environment when present.
    #[must_use]
    pub fn new(base_url: &str, model: &str) -> Self {
        let api_key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self::new_with_key(base_url, model, api_key)
    }

    /// Backend with an explicit credential (or none).
    #[must_use]
    pub fn new_with_key(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBED_CALL_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        HttpEmbeddingBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            dimension: EMBEDDING_DIM,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.model, "input": texts });
        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payload: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
        if payload.data.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                payload.data.len()
            )));
        }
        let mut rows = payload.data;
        rows.sort_by_key(|r| r.index);
        Ok(rows.into_iter().map(|r| r.embedding).collect())
    }
}
