//! Capture pipeline: non-blocking submission, two-tier delivery, drain.
//!
//! The gateway submits through a bounded channel (`try_send`; saturation
//! drops the capture). A delivery worker attempts the primary store ingest
//! under a short timeout; failures land in a bounded drop-oldest fallback
//! queue with a TTL, drained periodically with exponential backoff.
//! Backpressure is signalled by counters, never by blocking the request
//! path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use codepromptu_types::CaptureContext;
use codepromptu_types::limits::{
    DRAIN_INTERVAL_SECS, FALLBACK_QUEUE_CAPACITY, FALLBACK_TTL_SECS, INGEST_TIMEOUT_SECS,
    RETRY_CAP_SECS, RETRY_INITIAL_SECS, RETRY_MAX_ATTEMPTS, RETRY_MULTIPLIER,
};

/// Capacity of the gateway-facing submission channel.
const SUBMIT_CHANNEL_CAPACITY: usize = 1_024;

/// Primary delivery target for captures.
#[async_trait]
pub trait CaptureIngest: Send + Sync {
    /// Persist one capture; must be idempotent on `ctx.request_id`.
    async fn ingest(&self, ctx: CaptureContext) -> anyhow::Result<()>;
}

/// Pipeline tuning; defaults are normative.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fallback queue capacity (drop-oldest on overflow).
    pub fallback_capacity: usize,
    /// Fallback entry TTL.
    pub fallback_ttl: Duration,
    /// Drain worker tick.
    pub drain_interval: Duration,
    /// Primary ingest attempt timeout.
    pub ingest_timeout: Duration,
    /// First retry backoff.
    pub retry_initial: Duration,
    /// Backoff multiplier.
    pub retry_multiplier: u32,
    /// Backoff ceiling.
    pub retry_cap: Duration,
    /// Attempts before a deferred capture is dropped.
    pub retry_max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            fallback_capacity: FALLBACK_QUEUE_CAPACITY,
            fallback_ttl: Duration::from_secs(FALLBACK_TTL_SECS),
            drain_interval: Duration::from_secs(DRAIN_INTERVAL_SECS),
            ingest_timeout: Duration::from_secs(INGEST_TIMEOUT_SECS),
            retry_initial: Duration::from_secs(RETRY_INITIAL_SECS),
            retry_multiplier: RETRY_MULTIPLIER,
            retry_cap: Duration::from_secs(RETRY_CAP_SECS),
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
        }
    }
}

/// Observability counters; atomic, snapshot-able.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    submitted: AtomicU64,
    primary_ok: AtomicU64,
    fallback: AtomicU64,
    dropped: AtomicU64,
    overflow: AtomicU64,
}

/// Point-in-time counter values for the health document.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountersSnapshot {
    /// Captures submitted by the gateway.
    pub captures_submitted: u64,
    /// Captures stored on the primary attempt.
    pub captures_primary_ok: u64,
    /// Captures deferred to the fallback queue.
    pub captures_fallback: u64,
    /// Captures dropped (saturation, TTL, retry exhaustion).
    pub captures_dropped: u64,
    /// Fallback queue overflow evictions.
    pub fallback_overflow: u64,
}

impl PipelineCounters {
    fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            captures_submitted: self.submitted.load(Ordering::Relaxed),
            captures_primary_ok: self.primary_ok.load(Ordering::Relaxed),
            captures_fallback: self.fallback.load(Ordering::Relaxed),
            captures_dropped: self.dropped.load(Ordering::Relaxed),
            fallback_overflow: self.overflow.load(Ordering::Relaxed),
        }
    }
}

struct FallbackEntry {
    ctx: CaptureContext,
    enqueued_at: Instant,
    attempts: u32,
    next_attempt: Instant,
}

struct Shared {
    ingest: Arc<dyn CaptureIngest>,
    config: PipelineConfig,
    counters: PipelineCounters,
    fallback: Mutex<VecDeque<FallbackEntry>>,
}

/// Gateway-facing handle; submission never blocks.
#[derive(Clone)]
pub struct CapturePipeline {
    tx: mpsc::Sender<CaptureContext>,
    shared: Arc<Shared>,
    saturation_logged: Arc<AtomicBool>,
}

impl CapturePipeline {
    /// Spawn the delivery and drain workers over `ingest`.
    #[must_use]
    pub fn spawn(
        ingest: Arc<dyn CaptureIngest>,
        config: PipelineConfig,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(SUBMIT_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            ingest,
            config,
            counters: PipelineCounters::default(),
            fallback: Mutex::new(VecDeque::new()),
        });
        let delivery = tokio::spawn(run_delivery(shared.clone(), rx));
        let drain = tokio::spawn(run_drain(shared.clone()));
        (
            CapturePipeline {
                tx,
                shared,
                saturation_logged: Arc::new(AtomicBool::new(false)),
            },
            vec![delivery, drain],
        )
    }

    /// Hand one capture to the pipeline; non-blocking and infallible from
    /// the caller's point of view. Saturation drops the capture with a
    /// once-per-episode log.
    pub fn submit(&self, ctx: CaptureContext) {
        self.shared
            .counters
            .submitted
            .fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(ctx) {
            Ok(()) => {
                self.saturation_logged.store(false, Ordering::Relaxed);
            }
            Err(error) => {
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.saturation_logged.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        event = "capture.submit.saturated",
                        error = %error,
                        "capture intake saturated; dropping captures until it drains"
                    );
                }
            }
        }
    }

    /// Counter snapshot for the health document.
    #[must_use]
    pub fn counters(&self) -> CountersSnapshot {
        self.shared.counters.snapshot()
    }

    /// Entries currently parked in the fallback queue.
    pub async fn fallback_len(&self) -> usize {
        self.shared.fallback.lock().await.len()
    }
}

async fn run_delivery(shared: Arc<Shared>, mut rx: mpsc::Receiver<CaptureContext>) {
    while let Some(ctx) = rx.recv().await {
        let request_id = ctx.request_id;
        match try_primary(&shared, ctx).await {
            Ok(()) => {
                shared.counters.primary_ok.fetch_add(1, Ordering::Relaxed);
            }
            Err((ctx, error)) => {
                shared.counters.fallback.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    event = "capture.deferred",
                    request_id = %request_id,
                    error = %error,
                    "primary capture ingest failed; deferred to fallback queue"
                );
                enqueue_fallback(&shared, ctx).await;
            }
        }
    }
    tracing::debug!(event = "capture.delivery.stopped", "capture delivery worker stopped");
}

async fn run_drain(shared: Arc<Shared>) {
    let mut tick = tokio::time::interval(shared.config.drain_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        drain_once(&shared).await;
    }
}

/// One drain pass: retry every due entry, re-park backing-off ones.
async fn drain_once(shared: &Arc<Shared>) {
    let now = Instant::now();
    let due: Vec<FallbackEntry> = {
        let mut queue = shared.fallback.lock().await;
        let mut rest = VecDeque::new();
        let mut due = Vec::new();
        while let Some(entry) = queue.pop_front() {
            if now.duration_since(entry.enqueued_at) >= shared.config.fallback_ttl {
                shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    event = "capture.dropped.ttl",
                    request_id = %entry.ctx.request_id,
                    "deferred capture expired before delivery"
                );
                continue;
            }
            if entry.next_attempt <= now {
                due.push(entry);
            } else {
                rest.push_back(entry);
            }
        }
        *queue = rest;
        due
    };

    for mut entry in due {
        let request_id = entry.ctx.request_id;
        match try_primary(shared, entry.ctx).await {
            Ok(()) => {
                shared.counters.primary_ok.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    event = "capture.recovered",
                    request_id = %request_id,
                    attempts = entry.attempts + 1,
                    "deferred capture delivered"
                );
            }
            Err((ctx, error)) => {
                entry.ctx = ctx;
                entry.attempts += 1;
                if entry.attempts >= shared.config.retry_max_attempts {
                    shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        event = "capture.dropped.exhausted",
                        request_id = %request_id,
                        attempts = entry.attempts,
                        error = %error,
                        "deferred capture dropped after final retry"
                    );
                    continue;
                }
                entry.next_attempt = now + backoff(&shared.config, entry.attempts);
                let mut queue = shared.fallback.lock().await;
                queue.push_back(entry);
            }
        }
    }
}

/// Primary ingest under the short timeout; hands the context back on
/// failure so it can be re-queued.
async fn try_primary(
    shared: &Arc<Shared>,
    ctx: CaptureContext,
) -> Result<(), (CaptureContext, String)> {
    let attempt = ctx.clone();
    match tokio::time::timeout(shared.config.ingest_timeout, shared.ingest.ingest(attempt)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err((ctx, error.to_string())),
        Err(_) => Err((ctx, "ingest timeout".to_string())),
    }
}

/// Bounded push with drop-oldest overflow.
async fn enqueue_fallback(shared: &Arc<Shared>, ctx: CaptureContext) {
    let mut queue = shared.fallback.lock().await;
    while queue.len() >= shared.config.fallback_capacity {
        if let Some(evicted) = queue.pop_front() {
            shared.counters.overflow.fetch_add(1, Ordering::Relaxed);
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                event = "capture.fallback.overflow",
                request_id = %evicted.ctx.request_id,
                "fallback queue full; oldest deferred capture evicted"
            );
        } else {
            break;
        }
    }
    let now = Instant::now();
    queue.push_back(FallbackEntry {
        ctx,
        enqueued_at: now,
        attempts: 0,
        next_attempt: now + shared.config.retry_initial,
    });
}

fn backoff(config: &PipelineConfig, attempts: u32) -> Duration {
    let factor = config
        .retry_multiplier
        .saturating_pow(attempts.saturating_sub(1));
    config
        .retry_initial
        .saturating_mul(factor)
        .min(config.retry_cap)
}
