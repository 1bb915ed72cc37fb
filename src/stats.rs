//! Operating counters for the running agent.
//!
//! Counters are atomics so the HTTP health endpoint can read them from
//! another thread while the agent loop updates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current process.
#[derive(Debug)]
pub struct DetectorStats {
    /// Adaptor messages received
    events_received: AtomicU64,
    /// "On" events inside the night window
    events_in_window: AtomicU64,
    /// Metric samples buffered for delivery
    metric_samples: AtomicU64,
    /// Alerts delivered
    alerts_sent: AtomicU64,
    /// Wandering episodes counted
    wander_events: AtomicU64,
    /// Events dropped for configuration errors
    config_errors: AtomicU64,
    /// Messages that could not be delivered
    delivery_failures: AtomicU64,
    /// Rollup reports sent
    rollup_flushes: AtomicU64,
    /// Process start time
    started_at: DateTime<Utc>,
}

impl DetectorStats {
    pub fn new() -> Self {
        Self {
            events_received: AtomicU64::new(0),
            events_in_window: AtomicU64::new(0),
            metric_samples: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            wander_events: AtomicU64::new(0),
            config_errors: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            rollup_flushes: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_event(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_in_window(&self) {
        self.events_in_window.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metric_sample(&self) {
        self.metric_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wander_event(&self) {
        self.wander_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_config_error(&self) {
        self.config_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollup_flush(&self) {
        self.rollup_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_in_window: self.events_in_window.load(Ordering::Relaxed),
            metric_samples: self.metric_samples.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            wander_events: self.wander_events.load(Ordering::Relaxed),
            config_errors: self.config_errors.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            rollup_flushes: self.rollup_flushes.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Events received: {}\n\
             - Events inside night window: {}\n\
             - Metric samples recorded: {}\n\
             - Alerts sent: {}\n\
             - Wandering episodes counted: {}\n\
             - Events dropped (configuration): {}\n\
             - Delivery failures: {}\n\
             - Rollup reports: {}\n\
             - Uptime: {} seconds",
            stats.events_received,
            stats.events_in_window,
            stats.metric_samples,
            stats.alerts_sent,
            stats.wander_events,
            stats.config_errors,
            stats.delivery_failures,
            stats.rollup_flushes,
            stats.uptime_secs
        )
    }
}

impl Default for DetectorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_received: u64,
    pub events_in_window: u64,
    pub metric_samples: u64,
    pub alerts_sent: u64,
    pub wander_events: u64,
    pub config_errors: u64,
    pub delivery_failures: u64,
    pub rollup_flushes: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Thread-safe shared counters.
pub type SharedStats = Arc<DetectorStats>;

/// Create a new shared set of counters.
pub fn create_shared_stats() -> SharedStats {
    Arc::new(DetectorStats::new())
}
