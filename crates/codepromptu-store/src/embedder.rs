//! Background embedding writer.
//!
//! `create`/`update` persist the row first; the writer then performs the
//! dedicated vector write. Failed embeds stay queued with backoff, so no
//! active prompt remains permanently un-embedded while the backend is
//! healthy. A vector is only written when the row's version still matches
//! the job, which keeps embeddings in sync with content across concurrent
//! updates.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use codepromptu_embedding::EmbeddingService;

use crate::error::StoreError;
use crate::store::PromptStore;

/// Retry tick for parked jobs.
const RETRY_TICK: Duration = Duration::from_secs(5);

/// One pending vector write.
#[derive(Debug, Clone)]
pub struct EmbedJob {
    /// Target prompt.
    pub prompt_id: Uuid,
    /// Row version the content was read at.
    pub version: u32,
    /// Content to embed.
    pub content: String,
}

/// Handle for submitting embed jobs to the background worker.
#[derive(Clone)]
pub struct EmbeddingWriter {
    tx: mpsc::UnboundedSender<EmbedJob>,
}

impl EmbeddingWriter {
    /// Spawn the worker over `store` and `embedding`; returns the submit
    /// handle and the worker task.
    #[must_use]
    pub fn spawn(store: Arc<PromptStore>, embedding: EmbeddingService) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(store, embedding, rx));
        (EmbeddingWriter { tx }, worker)
    }

    /// Queue a vector write; never blocks.
    pub fn submit(&self, job: EmbedJob) {
        if self.tx.send(job).is_err() {
            tracing::error!(
                event = "store.embedder.submit_failed",
                "embedding worker is gone; vector write dropped"
            );
        }
    }
}

async fn run_worker(
    store: Arc<PromptStore>,
    embedding: EmbeddingService,
    mut rx: mpsc::UnboundedReceiver<EmbedJob>,
) {
    let mut parked: VecDeque<EmbedJob> = VecDeque::new();
    let mut tick = tokio::time::interval(RETRY_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                if let Some(retry) = process_job(&store, &embedding, job).await {
                    parked.push_back(retry);
                }
            }
            _ = tick.tick() => {
                let batch: Vec<EmbedJob> = parked.drain(..).collect();
                for job in batch {
                    if let Some(retry) = process_job(&store, &embedding, job).await {
                        parked.push_back(retry);
                    }
                }
            }
        }
    }
    tracing::debug!(event = "store.embedder.stopped", "embedding worker stopped");
}

/// Embed and write one job. Returns the job back when it should be retried.
async fn process_job(
    store: &PromptStore,
    embedding: &EmbeddingService,
    job: EmbedJob,
) -> Option<EmbedJob> {
    // Skip early when the row moved on or disappeared.
    match store.get(job.prompt_id) {
        Ok(row) if row.version == job.version => {}
        _ => return None,
    }
    match embedding.embed(&job.content).await {
        Ok(vector) => match store.set_embedding(job.prompt_id, job.version, vector) {
            Ok(written) => {
                if !written {
                    tracing::debug!(
                        event = "store.embedder.stale_skip",
                        prompt_id = %job.prompt_id,
                        version = job.version,
                        "vector write skipped; row version moved"
                    );
                }
                None
            }
            Err(StoreError::NotFound(_)) => None,
            Err(error) => {
                tracing::error!(
                    event = "store.embedder.write_failed",
                    prompt_id = %job.prompt_id,
                    error = %error,
                    "embedding write failed; dropping job"
                );
                None
            }
        },
        Err(error) => {
            tracing::warn!(
                event = "store.embedder.embed_failed",
                prompt_id = %job.prompt_id,
                error = %error,
                "embedding failed; job parked for retry"
            );
            Some(job)
        }
    }
}
