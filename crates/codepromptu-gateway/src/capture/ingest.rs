//! Store-side capture ingest: parse, classify, link, persist.
//!
//! For each delivered capture: the request and response are parsed, the
//! prompt text is classified against the corpus (SAME links, FORK forks,
//! NEW creates), the usage row is upserted on `request_id`, and the
//! prompt/response pair is appended to the conversation for the
//! correlation id. A replayed capture whose usage row already exists is
//! skipped entirely, which keeps the whole ingest idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use codepromptu_store::{ConversationLog, MessageRecord, PromptService, SimilarityEngine};
use codepromptu_types::{
    CaptureContext, Classification, MessageType, PromptDraft, PromptUsage,
};

use crate::capture::parser::{ParsedRequest, ParsedResponse, parse_request, parse_response};
use crate::capture::pipeline::CaptureIngest;

/// Ingest implementation backed by the in-process store.
pub struct StoreCaptureIngest {
    prompts: PromptService,
    engine: Arc<SimilarityEngine>,
    conversations: Arc<ConversationLog>,
}

impl StoreCaptureIngest {
    /// Ingest over the given store facade, engine and conversation log.
    #[must_use]
    pub fn new(
        prompts: PromptService,
        engine: Arc<SimilarityEngine>,
        conversations: Arc<ConversationLog>,
    ) -> Self {
        StoreCaptureIngest {
            prompts,
            engine,
            conversations,
        }
    }

    /// Resolve the captured text to a prompt id: SAME links to the match,
    /// FORK creates a child of it, NEW creates a root prompt. Any failure
    /// resolves to `None`; usage rows never require a prompt.
    async fn resolve_prompt(&self, prompt_text: &str, model: Option<&str>) -> Option<Uuid> {
        if prompt_text.trim().is_empty() {
            return None;
        }
        let classified = match self.engine.classify(prompt_text).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(
                    event = "capture.ingest.classify_failed",
                    error = %error,
                    "classification failed; treating capture as NEW"
                );
                codepromptu_types::ClassificationResult::new_prompt()
            }
        };
        match (classified.classification, classified.best_match) {
            (Classification::Same, Some(hit)) => {
                tracing::debug!(
                    event = "capture.ingest.matched",
                    prompt_id = %hit.prompt.id,
                    score = classified.score,
                    "capture matched an existing prompt"
                );
                Some(hit.prompt.id)
            }
            (Classification::Fork, Some(hit)) => match self.prompts.fork(
                hit.prompt.id,
                prompt_text.to_string(),
                None,
            ) {
                Ok(forked) => {
                    tracing::debug!(
                        event = "capture.ingest.forked",
                        prompt_id = %forked.id,
                        parent_id = %hit.prompt.id,
                        score = classified.score,
                        "capture forked from its nearest prompt"
                    );
                    Some(forked.id)
                }
                Err(error) => {
                    tracing::warn!(
                        event = "capture.ingest.fork_failed",
                        error = %error,
                        "fork failed; capture stays unlinked"
                    );
                    None
                }
            },
            _ => {
                let mut draft = PromptDraft::from_content(prompt_text.to_string());
                draft.model_target = model.map(String::from);
                match self.prompts.create(draft) {
                    Ok(created) => {
                        tracing::debug!(
                            event = "capture.ingest.created",
                            prompt_id = %created.id,
                            "capture stored as a new prompt"
                        );
                        Some(created.id)
                    }
                    Err(error) => {
                        tracing::warn!(
                            event = "capture.ingest.create_failed",
                            error = %error,
                            "prompt create failed; capture stays unlinked"
                        );
                        None
                    }
                }
            }
        }
    }
}

#[async_trait]
impl CaptureIngest for StoreCaptureIngest {
    async fn ingest(&self, ctx: CaptureContext) -> anyhow::Result<()> {
        // Replay of an already-stored capture: skip everything.
        if self.prompts.store().usage_by_request(ctx.request_id).is_some() {
            tracing::debug!(
                event = "capture.ingest.replayed",
                request_id = %ctx.request_id,
                "capture already ingested; skipping"
            );
            return Ok(());
        }

        let request = parse_request(ctx.provider, &ctx.request_body);
        let response = if ctx.response_body.is_empty() {
            None
        } else {
            Some(parse_response(ctx.provider, &ctx.response_body))
        };
        let model = ctx
            .model
            .clone()
            .or_else(|| request.model.clone())
            .or_else(|| response.as_ref().and_then(|r| r.model.clone()));

        let prompt_id = self
            .resolve_prompt(&request.prompt_text, model.as_deref())
            .await;

        let usage = build_usage(&ctx, &request, response.as_ref(), model.clone(), prompt_id);
        self.prompts.ingest_usage(usage);

        let user_context = build_user_context(&ctx);
        self.conversations.record(
            &ctx.correlation_id,
            user_context.clone(),
            MessageRecord {
                message_type: MessageType::Prompt,
                content: request.prompt_text.clone(),
                timestamp: ctx.request_timestamp,
                provider: ctx.provider,
                model: model.clone(),
                token_usage: None,
                metadata: Map::new(),
            },
        );
        if let Some(ref parsed) = response {
            let content = parsed
                .response_text
                .clone()
                .unwrap_or_else(|| String::from_utf8_lossy(&ctx.response_body).into_owned());
            let mut metadata = Map::new();
            if let Some(status) = ctx.response_status {
                metadata.insert("status".to_string(), Value::from(status));
            }
            if ctx.flags.partial {
                metadata.insert("partial".to_string(), Value::Bool(true));
            }
            self.conversations.record(
                &ctx.correlation_id,
                user_context,
                MessageRecord {
                    message_type: MessageType::Response,
                    content,
                    timestamp: ctx.response_timestamp.unwrap_or_else(Utc::now),
                    provider: ctx.provider,
                    model,
                    token_usage: parsed.token_usage,
                    metadata,
                },
            );
        }
        Ok(())
    }
}

fn build_usage(
    ctx: &CaptureContext,
    request: &ParsedRequest,
    response: Option<&ParsedResponse>,
    model: Option<String>,
    prompt_id: Option<Uuid>,
) -> PromptUsage {
    let mut metadata = Map::new();
    if !request.sampling.is_empty() {
        metadata.insert(
            "sampling_params".to_string(),
            Value::Object(request.sampling.clone()),
        );
    }
    if let Some(ref error) = request.parse_error {
        metadata.insert("parse_error".to_string(), Value::String(error.clone()));
    }
    if let Some(status) = ctx.response_status {
        metadata.insert("response_status".to_string(), Value::from(status));
    }
    if ctx.flags.partial {
        metadata.insert("partial".to_string(), Value::Bool(true));
    }
    if ctx.flags.timeout {
        metadata.insert("timeout".to_string(), Value::Bool(true));
    }
    if ctx.flags.request_truncated || ctx.flags.response_truncated {
        metadata.insert("truncated".to_string(), Value::Bool(true));
    }
    for (key, value) in &ctx.extracted {
        metadata.entry(key.clone()).or_insert_with(|| value.clone());
    }
    PromptUsage {
        id: Uuid::new_v4(),
        request_id: ctx.request_id,
        correlation_id: ctx.correlation_id.clone(),
        prompt_id,
        provider: ctx.provider,
        model,
        request_timestamp: ctx.request_timestamp,
        response_timestamp: ctx.response_timestamp,
        client_ip: ctx.client_ip.clone(),
        user_agent: ctx.user_agent.clone(),
        api_key_hash: ctx.api_key_hash.clone(),
        token_usage: response.and_then(|r| r.token_usage),
        metadata,
    }
}

fn build_user_context(ctx: &CaptureContext) -> Map<String, Value> {
    let mut user_context = Map::new();
    if let Some(ref ip) = ctx.client_ip {
        user_context.insert("client_ip".to_string(), Value::String(ip.clone()));
    }
    if let Some(ref agent) = ctx.user_agent {
        user_context.insert("user_agent".to_string(), Value::String(agent.clone()));
    }
    user_context.insert(
        "api_key_hash".to_string(),
        Value::String(ctx.api_key_hash.clone()),
    );
    user_context
}
