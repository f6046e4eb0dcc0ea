//! Operator REST surface over the store, similarity engine and sessions.
//!
//! JSON over HTTP; errors follow the gateway taxonomy (400 invalid input,
//! 404 missing id, 409 version conflict, 502 internal).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use codepromptu_store::{PromptFilter, StoreError};
use codepromptu_types::{
    CaptureContext, ClassificationResult, ConversationMessage, ConversationSession, Prompt,
    PromptDraft, SessionStatus, SimilarityHit,
};

use crate::breaker::BreakerSnapshot;
use crate::capture::pipeline::CountersSnapshot;
use crate::state::AppState;

/// Default page size for listings.
const DEFAULT_LIST_LIMIT: usize = 50;

/// Default k for similarity queries.
const DEFAULT_SIMILAR_LIMIT: usize = 10;

type ApiError = (StatusCode, String);

/// REST routes (everything except the provider proxy patterns).
pub fn rest_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/prompts", get(list_prompts).post(create_prompt))
        .route(
            "/prompts/{id}",
            get(get_prompt).put(update_prompt).delete(retire_prompt),
        )
        .route("/prompts/{id}/fork", post(fork_prompt))
        .route("/prompts/{id}/similar", get(similar_by_id))
        .route("/prompts/{id}/ancestors", get(prompt_ancestors))
        .route("/prompts/search/similar", post(search_similar))
        .route("/prompts/classify", post(classify_prompt))
        .route("/conversations/sessions", get(list_sessions))
        .route("/conversations/sessions/{id}/messages", get(session_messages))
        .route("/conversations/sessions/{id}/close", post(close_session))
        .route("/internal/prompt-usage", post(ingest_prompt_usage))
}

fn store_error(error: StoreError) -> ApiError {
    let status = match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::InvalidContent(_)
        | StoreError::LineageInvalid(_)
        | StoreError::InvalidVector { .. } => StatusCode::BAD_REQUEST,
        StoreError::Embedding(_) => StatusCode::BAD_GATEWAY,
    };
    (status, error.to_string())
}

#[derive(Debug, Deserialize)]
struct ListPromptsParams {
    team_owner: Option<String>,
    author: Option<String>,
    tag: Option<String>,
    content_search: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_prompts(
    State(state): State<AppState>,
    Query(params): Query<ListPromptsParams>,
) -> Json<Vec<Prompt>> {
    let filter = PromptFilter {
        team_owner: params.team_owner,
        author: params.author,
        tag: params.tag,
        content_search: params.content_search,
        include_inactive: false,
        limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        offset: params.offset.unwrap_or(0),
    };
    Json(state.prompts.list(&filter))
}

async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Prompt>, ApiError> {
    state.prompts.get(id).map(Json).map_err(store_error)
}

async fn create_prompt(
    State(state): State<AppState>,
    Json(draft): Json<PromptDraft>,
) -> Result<(StatusCode, Json<Prompt>), ApiError> {
    let prompt = state.prompts.create(draft).map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

#[derive(Debug, Deserialize)]
struct UpdatePromptBody {
    #[serde(flatten)]
    draft: PromptDraft,
    /// Version the caller saw; a mismatch is a 409.
    version: Option<u32>,
}

async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePromptBody>,
) -> Result<Json<Prompt>, ApiError> {
    state
        .prompts
        .update(id, body.draft, body.version)
        .map(Json)
        .map_err(store_error)
}

async fn retire_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.prompts.retire(id).map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ForkParams {
    content: String,
    author: Option<String>,
}

async fn fork_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ForkParams>,
) -> Result<(StatusCode, Json<Prompt>), ApiError> {
    let forked = state
        .prompts
        .fork(id, params.content, params.author)
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(forked)))
}

#[derive(Debug, Deserialize)]
struct SimilarParams {
    limit: Option<usize>,
}

async fn similar_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<Vec<SimilarityHit>>, ApiError> {
    let prompt = state.prompts.get(id).map_err(store_error)?;
    let limit = params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    // Query by the stored vector when present, by content otherwise; the
    // prompt itself is excluded from its own neighbours.
    let hits = match prompt.embedding {
        Some(ref embedding) => state
            .engine
            .find_similar_vec(embedding, limit.saturating_add(1))
            .await
            .map_err(store_error)?,
        None => state
            .engine
            .find_similar_text(&prompt.content, limit.saturating_add(1))
            .await
            .map_err(store_error)?,
    };
    let mut hits: Vec<SimilarityHit> =
        hits.into_iter().filter(|hit| hit.prompt.id != id).collect();
    hits.truncate(limit);
    Ok(Json(hits))
}

async fn prompt_ancestors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Prompt>>, ApiError> {
    let lineage = state.prompts.ancestors(id).map_err(store_error)?;
    Ok(Json(lineage.chain))
}

#[derive(Debug, Deserialize)]
struct SearchSimilarBody {
    content: String,
    limit: Option<usize>,
}

async fn search_similar(
    State(state): State<AppState>,
    Json(body): Json<SearchSimilarBody>,
) -> Result<Json<Vec<SimilarityHit>>, ApiError> {
    if body.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content must be non-empty".to_string()));
    }
    let hits = state
        .engine
        .find_similar_text(&body.content, body.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT))
        .await
        .map_err(store_error)?;
    Ok(Json(hits))
}

#[derive(Debug, Deserialize)]
struct ClassifyParams {
    content: String,
}

async fn classify_prompt(
    State(state): State<AppState>,
    Query(params): Query<ClassifyParams>,
) -> Result<Json<ClassificationResult>, ApiError> {
    if params.content.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "content must be non-empty".to_string()));
    }
    state
        .engine
        .classify(&params.content)
        .await
        .map(Json)
        .map_err(store_error)
}

#[derive(Debug, Deserialize)]
struct ListSessionsParams {
    status: Option<String>,
    limit: Option<usize>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<Vec<ConversationSession>>, ApiError> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(parse_status(raw)?),
    };
    Ok(Json(state.conversations.list(
        status,
        params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
    )))
}

fn parse_status(raw: &str) -> Result<SessionStatus, ApiError> {
    match raw.to_ascii_uppercase().as_str() {
        "ACTIVE" => Ok(SessionStatus::Active),
        "CLOSED" => Ok(SessionStatus::Closed),
        "EXPIRED" => Ok(SessionStatus::Expired),
        other => Err((
            StatusCode::BAD_REQUEST,
            format!("unknown session status {other}"),
        )),
    }
}

async fn session_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ConversationMessage>>, ApiError> {
    let (_, messages) = state.conversations.session(id).map_err(store_error)?;
    Ok(Json(messages))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationSession>, ApiError> {
    state.conversations.close(id).map(Json).map_err(store_error)
}

#[derive(Debug, Serialize)]
struct IngestAck {
    status: &'static str,
    request_id: Uuid,
}

async fn ingest_prompt_usage(
    State(state): State<AppState>,
    Json(ctx): Json<CaptureContext>,
) -> Result<Json<IngestAck>, ApiError> {
    use crate::capture::pipeline::CaptureIngest;
    let request_id = ctx.request_id;
    state
        .ingest
        .ingest(ctx)
        .await
        .map_err(|error| (StatusCode::BAD_REQUEST, error.to_string()))?;
    Ok(Json(IngestAck {
        status: "stored",
        request_id,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    prompts: usize,
    usages: usize,
    sessions: usize,
    pipeline: CountersSnapshot,
    breakers: Vec<BreakerSnapshot>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        prompts: state.prompts.store().prompt_count(),
        usages: state.prompts.store().usage_count(),
        sessions: state.conversations.session_count(),
        pipeline: state.pipeline.counters(),
        breakers: state.breakers.snapshot(),
    })
}
