//! Per-endpoint circuit breaker shared across sessions.
//!
//! One process-wide registry maps endpoint circuit keys to breaker state.
//! Repeated connect failures open the breaker; an open breaker suppresses
//! retries until the reset period elapses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::time::Instant;

/// Breaker thresholds, taken from the session config.
#[derive(Debug, Clone, Copy)]
pub struct CircuitPolicy {
    /// Consecutive failures that open the breaker.
    pub threshold: u32,
    /// Cooldown before an open breaker admits retries again.
    pub reset_after: Duration,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_after: Duration::from_secs(60),
        }
    }
}

/// Breaker state for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    pub failure_count: u32,
    pub last_failure_at: Option<Instant>,
    pub breaker_open: bool,
    pub breaker_opened_at: Option<Instant>,
}

/// Registry of per-endpoint breaker state.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    entries: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry shared by sessions that do not supply
    /// their own.
    pub fn global() -> Arc<CircuitRegistry> {
        static GLOBAL: OnceLock<Arc<CircuitRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CircuitRegistry::new())))
    }

    /// Whether a retry against this endpoint is currently admitted.
    ///
    /// An open breaker whose reset period has elapsed is closed here, so
    /// retries resume on the next probe.
    pub fn should_retry(&self, key: &str, policy: &CircuitPolicy) -> bool {
        let mut entries = self.entries.lock().expect("circuit registry lock");
        let Some(entry) = entries.get_mut(key) else {
            return true;
        };
        if !entry.breaker_open {
            return true;
        }
        let opened_at = entry.breaker_opened_at.unwrap_or_else(Instant::now);
        if opened_at.elapsed() >= policy.reset_after {
            entry.breaker_open = false;
            entry.breaker_opened_at = None;
            tracing::debug!(endpoint = key, "circuit breaker reset period elapsed");
            return true;
        }
        false
    }

    /// Record a failed attempt, opening the breaker at the threshold.
    pub fn record_failure(&self, key: &str, policy: &CircuitPolicy) {
        let mut entries = self.entries.lock().expect("circuit registry lock");
        let entry = entries.entry(key.to_string()).or_default();
        entry.failure_count += 1;
        entry.last_failure_at = Some(Instant::now());
        if entry.failure_count >= policy.threshold && !entry.breaker_open {
            entry.breaker_open = true;
            entry.breaker_opened_at = Some(Instant::now());
            tracing::warn!(
                endpoint = key,
                failures = entry.failure_count,
                "circuit breaker opened"
            );
        }
    }

    /// Record a successful connect, clearing all breaker state.
    pub fn record_success(&self, key: &str) {
        let mut entries = self.entries.lock().expect("circuit registry lock");
        if let Some(entry) = entries.get_mut(key) {
            *entry = CircuitState::default();
        }
    }

    /// Operator-facing reset of one endpoint's breaker state.
    pub fn reset(&self, key: &str) {
        let mut entries = self.entries.lock().expect("circuit registry lock");
        entries.remove(key);
    }

    /// Snapshot of one endpoint's breaker state, if any failures were seen.
    pub fn state(&self, key: &str) -> Option<CircuitState> {
        let entries = self.entries.lock().expect("circuit registry lock");
        entries.get(key).cloned()
    }
}
