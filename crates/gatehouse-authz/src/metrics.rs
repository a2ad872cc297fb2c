//! Authorization counters
//!
//! Plain atomics; a host server exports them however it exports the rest of
//! its metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Counters maintained by the authorization engine
#[derive(Debug, Default)]
pub struct AuthzMetrics {
    decisions_total: AtomicU64,
    allowed_total: AtomicU64,
    denied_total: AtomicU64,
    cache_hits_total: AtomicU64,
    cache_misses_total: AtomicU64,
    rbac_calls_total: AtomicU64,
    rbac_errors_total: AtomicU64,
    token_failures_total: AtomicU64,
    evaluation_time_us_total: AtomicU64,
}

/// Point-in-time copy of [`AuthzMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Decisions made
    pub decisions: u64,
    /// Decisions that allowed the call
    pub allowed: u64,
    /// Decisions that denied the call
    pub denied: u64,
    /// Decision cache hits
    pub cache_hits: u64,
    /// Decision cache misses
    pub cache_misses: u64,
    /// Calls made to the RBAC service
    pub rbac_calls: u64,
    /// RBAC calls that failed or timed out
    pub rbac_errors: u64,
    /// Rejected or timed-out token validations
    pub token_failures: u64,
    /// Mean decision time in microseconds
    pub avg_evaluation_time_us: u64,
}

impl AuthzMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished decision
    pub fn record_decision(&self, allowed: bool, elapsed: Duration) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.allowed_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_total.fetch_add(1, Ordering::Relaxed);
        }
        self.evaluation_time_us_total
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a decision cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits_total
        } else {
            &self.cache_misses_total
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an RBAC service call and whether it failed
    pub fn record_rbac_call(&self, failed: bool) {
        self.rbac_calls_total.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.rbac_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a token validation failure
    pub fn record_token_failure(&self) {
        self.token_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Decisions made so far
    pub fn decisions(&self) -> u64 {
        self.decisions_total.load(Ordering::Relaxed)
    }

    /// Calls made to the RBAC service so far
    pub fn rbac_calls(&self) -> u64 {
        self.rbac_calls_total.load(Ordering::Relaxed)
    }

    /// Decision cache hit rate (0.0 to 1.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits_total.load(Ordering::Relaxed);
        let misses = self.cache_misses_total.load(Ordering::Relaxed);
        match hits + misses {
            0 => 0.0,
            total => hits as f64 / total as f64,
        }
    }

    /// Copy every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let decisions = self.decisions();
        let total_us = self.evaluation_time_us_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            decisions,
            allowed: self.allowed_total.load(Ordering::Relaxed),
            denied: self.denied_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits_total.load(Ordering::Relaxed),
            cache_misses: self.cache_misses_total.load(Ordering::Relaxed),
            rbac_calls: self.rbac_calls(),
            rbac_errors: self.rbac_errors_total.load(Ordering::Relaxed),
            token_failures: self.token_failures_total.load(Ordering::Relaxed),
            avg_evaluation_time_us: total_us.checked_div(decisions).unwrap_or(0),
        }
    }
}
