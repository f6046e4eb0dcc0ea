//! Gateway wiring: shared state, router assembly and the server loop.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::any;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use codepromptu_embedding::{
    EmbeddingBackend, EmbeddingService, HashEmbeddingBackend, HttpEmbeddingBackend,
};
use codepromptu_store::{
    ConversationLog, EmbeddingWriter, PromptService, PromptStore, SimilarityEngine, Thresholds,
};

use crate::api;
use crate::breaker::CircuitBreakers;
use crate::capture::ingest::StoreCaptureIngest;
use crate::capture::pipeline::CapturePipeline;
use crate::config::{EmbeddingBackendKind, GatewayConfig};
use crate::proxy::{handle_unmatched, proxy_handler};

/// Session expiry sweep interval.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration.
    pub config: Arc<GatewayConfig>,
    /// Prompt store facade (rows + embedding trigger).
    pub prompts: PromptService,
    /// Similarity engine.
    pub engine: Arc<SimilarityEngine>,
    /// Conversation correlator.
    pub conversations: Arc<ConversationLog>,
    /// Capture pipeline handle.
    pub pipeline: CapturePipeline,
    /// Direct ingest (the `/internal/prompt-usage` path).
    pub ingest: Arc<StoreCaptureIngest>,
    /// Per-provider circuit breakers.
    pub breakers: Arc<CircuitBreakers>,
    /// Egress HTTP client.
    pub http: reqwest::Client,
}

/// Wire up stores, workers and clients from `config`.
///
/// Returns the state plus the background worker handles (capture delivery,
/// capture drain, embedding writer, session sweeper) so the caller can
/// abort them on shutdown.
#[must_use]
pub fn build_state(config: GatewayConfig) -> (AppState, Vec<JoinHandle<()>>) {
    let config = Arc::new(config);
    let store = Arc::new(PromptStore::new());

    let backend: Arc<dyn EmbeddingBackend> = match &config.embedding_backend {
        EmbeddingBackendKind::Hash => Arc::new(HashEmbeddingBackend::new()),
        EmbeddingBackendKind::Http { base_url, model } => {
            Arc::new(HttpEmbeddingBackend::new(base_url, model))
        }
    };
    let embedding = EmbeddingService::new(backend);

    let (writer, embed_worker) = EmbeddingWriter::spawn(store.clone(), embedding.clone());
    let prompts = PromptService::new(store.clone(), writer);

    let engine = Arc::new(
        SimilarityEngine::new(store.clone(), embedding)
            .with_thresholds(Thresholds {
                tau_same: config.tau_same,
                tau_fork: config.tau_fork,
            })
            .with_min_index_rows(config.min_index_rows),
    );

    let conversations = Arc::new(ConversationLog::with_idle_timeout(
        config.session_idle_timeout_secs,
    ));
    let sweeper = spawn_session_sweeper(conversations.clone());

    let ingest = Arc::new(StoreCaptureIngest::new(
        prompts.clone(),
        engine.clone(),
        conversations.clone(),
    ));
    let (pipeline, mut workers) =
        CapturePipeline::spawn(ingest.clone(), config.pipeline.clone());
    workers.push(embed_worker);
    workers.push(sweeper);

    let breakers = Arc::new(CircuitBreakers::with_tuning(
        config.breaker_window,
        config.breaker_failure_rate,
        config.breaker_cooldown,
    ));

    let http = reqwest::Client::builder()
        .build()
        .unwrap_or_default();

    (
        AppState {
            config,
            prompts,
            engine,
            conversations,
            pipeline,
            ingest,
            breakers,
            http,
        },
        workers,
    )
}

/// Full router: REST surface plus the provider proxy patterns.
#[must_use]
pub fn router(state: AppState) -> Router {
    api::rest_router()
        .route("/v1/chat/completions", any(proxy_handler))
        .route("/v1/completions", any(proxy_handler))
        .route("/v1/embeddings", any(proxy_handler))
        .route("/v1/messages", any(proxy_handler))
        .route("/v1/complete", any(proxy_handler))
        .route("/v1beta/models/{*model_call}", any(proxy_handler))
        .fallback(handle_unmatched)
        .with_state(state)
}

/// Run the gateway: bind, serve, drain on Ctrl+C/SIGTERM, stop workers.
pub async fn run(config: GatewayConfig) -> Result<()> {
    let bind_addr = config.bind_addr.clone();
    let (state, workers) = build_state(config);
    let app = router(state);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        event = "gateway.started",
        bind = %bind_addr,
        "gateway listening (Ctrl+C/SIGTERM to stop)"
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    for worker in workers {
        worker.abort();
    }
    tracing::info!(event = "gateway.stopped", "gateway stopped");
    Ok(())
}

fn spawn_session_sweeper(conversations: Arc<ConversationLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let expired = conversations.expire_idle(Utc::now());
            if expired > 0 {
                tracing::debug!(
                    event = "sessions.sweep",
                    expired,
                    "idle sessions expired"
                );
            }
        }
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let ctrl_c = tokio::signal::ctrl_c();
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            let _ = ctrl_c.await;
            return;
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
