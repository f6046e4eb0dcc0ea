//! Per-provider circuit breakers over a sliding outcome window.
//!
//! The breaker opens when the failure rate over a full window crosses the
//! threshold; after a cooldown a single half-open probe is allowed, whose
//! outcome closes or re-opens the circuit. One short lock per read/update,
//! sharded per provider.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use codepromptu_types::Provider;
use codepromptu_types::limits::{BREAKER_COOLDOWN_SECS, BREAKER_FAILURE_RATE, BREAKER_WINDOW};

/// Verdict for one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    /// Circuit closed; call the provider.
    Allow,
    /// Circuit half-open; this caller carries the probe and must report
    /// back with `probe: true`.
    AllowProbe,
    /// Circuit open; short-circuit to the fallback controller.
    Open,
}

/// Health-endpoint view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Provider name.
    pub provider: &'static str,
    /// `closed`, `open` or `half_open`.
    pub state: &'static str,
    /// Failures over the current window.
    pub failure_rate: f64,
    /// Samples currently in the window.
    pub samples: usize,
}

#[derive(Debug, Default)]
struct BreakerState {
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }
}

/// Sharded breaker set, one state per provider.
pub struct CircuitBreakers {
    shards: [(Provider, Mutex<BreakerState>); 3],
    window: usize,
    failure_rate: f64,
    cooldown: Duration,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakers {
    /// Breakers with the normative window, rate and cooldown.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tuning(
            BREAKER_WINDOW,
            BREAKER_FAILURE_RATE,
            Duration::from_secs(BREAKER_COOLDOWN_SECS),
        )
    }

    /// Breakers with explicit tuning.
    #[must_use]
    pub fn with_tuning(window: usize, failure_rate: f64, cooldown: Duration) -> Self {
        CircuitBreakers {
            shards: [
                (Provider::Openai, Mutex::new(BreakerState::default())),
                (Provider::Anthropic, Mutex::new(BreakerState::default())),
                (Provider::GoogleAi, Mutex::new(BreakerState::default())),
            ],
            window: window.max(1),
            failure_rate,
            cooldown,
        }
    }

    /// Decide whether a call to `provider` may go out.
    pub fn check(&self, provider: Provider) -> BreakerDecision {
        let mut state = self.lock(provider);
        let Some(opened_at) = state.opened_at else {
            return BreakerDecision::Allow;
        };
        if opened_at.elapsed() < self.cooldown {
            return BreakerDecision::Open;
        }
        if state.probe_in_flight {
            return BreakerDecision::Open;
        }
        state.probe_in_flight = true;
        tracing::debug!(
            event = "breaker.half_open",
            provider = provider.as_str(),
            "circuit breaker half-open; probe dispatched"
        );
        BreakerDecision::AllowProbe
    }

    /// Record the outcome of a call. `probe` must be true when `check`
    /// returned `AllowProbe` for it.
    pub fn record(&self, provider: Provider, success: bool, probe: bool) {
        let mut state = self.lock(provider);
        if probe {
            state.probe_in_flight = false;
            if success {
                state.opened_at = None;
                state.window.clear();
                tracing::info!(
                    event = "breaker.closed",
                    provider = provider.as_str(),
                    "circuit breaker closed after successful probe"
                );
            } else {
                state.opened_at = Some(Instant::now());
                tracing::warn!(
                    event = "breaker.reopened",
                    provider = provider.as_str(),
                    "circuit breaker re-opened after failed probe"
                );
            }
            return;
        }
        if state.opened_at.is_some() {
            // Late completions from before the circuit opened.
            return;
        }
        state.window.push_back(success);
        while state.window.len() > self.window {
            state.window.pop_front();
        }
        if state.window.len() >= self.window && state.failure_rate() >= self.failure_rate {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                event = "breaker.opened",
                provider = provider.as_str(),
                failure_rate = state.failure_rate(),
                samples = state.window.len(),
                "circuit breaker opened"
            );
        }
    }

    /// Per-provider snapshots for the health document.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        self.shards
            .iter()
            .map(|(provider, shard)| {
                let state = shard
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let label = if state.opened_at.is_none() {
                    "closed"
                } else if state.probe_in_flight {
                    "half_open"
                } else {
                    "open"
                };
                BreakerSnapshot {
                    provider: provider.as_str(),
                    state: label,
                    failure_rate: state.failure_rate(),
                    samples: state.window.len(),
                }
            })
            .collect()
    }

    /// Force a provider's circuit open (tests and operator tooling).
    pub fn force_open(&self, provider: Provider) {
        let mut state = self.lock(provider);
        state.opened_at = Some(Instant::now());
        state.probe_in_flight = false;
    }

    fn lock(&self, provider: Provider) -> std::sync::MutexGuard<'_, BreakerState> {
        let shard = self
            .shards
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, shard)| shard)
            .unwrap_or(&self.shards[0].1);
        shard
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
