//! Observability metrics for the enforcement engine.
//!
//! Counters are updated from the event-observation callback, so every update
//! is a relaxed atomic add; nothing here can block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking enforcement statistics.
///
/// Cloning is cheap and all clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Events delivered by the host, before any filtering
    events_seen: AtomicU64,
    /// Events dropped by the type filter
    events_filtered: AtomicU64,
    /// Events dropped by the rate limiter
    events_rate_limited: AtomicU64,
    /// Events dropped because another classification was in flight
    events_reentrant_dropped: AtomicU64,
    /// Redirects issued by the reactor
    interventions: AtomicU64,
    /// Advisory signals raised by the sentinel
    bypass_signals: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_seen(&self) {
        self.inner.events_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self) {
        self.inner.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limited(&self) {
        self.inner.events_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reentrant_drop(&self) {
        self.inner
            .events_reentrant_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_intervention(&self) {
        self.inner.interventions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bypass_signal(&self) {
        self.inner.bypass_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_seen(&self) -> u64 {
        self.inner.events_seen.load(Ordering::Relaxed)
    }

    pub fn events_filtered(&self) -> u64 {
        self.inner.events_filtered.load(Ordering::Relaxed)
    }

    pub fn events_rate_limited(&self) -> u64 {
        self.inner.events_rate_limited.load(Ordering::Relaxed)
    }

    pub fn events_reentrant_dropped(&self) -> u64 {
        self.inner.events_reentrant_dropped.load(Ordering::Relaxed)
    }

    pub fn interventions(&self) -> u64 {
        self.inner.interventions.load(Ordering::Relaxed)
    }

    pub fn bypass_signals(&self) -> u64 {
        self.inner.bypass_signals.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_seen: self.events_seen(),
            events_filtered: self.events_filtered(),
            events_rate_limited: self.events_rate_limited(),
            events_reentrant_dropped: self.events_reentrant_dropped(),
            interventions: self.interventions(),
            bypass_signals: self.bypass_signals(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.inner.events_seen.store(0, Ordering::Relaxed);
        self.inner.events_filtered.store(0, Ordering::Relaxed);
        self.inner.events_rate_limited.store(0, Ordering::Relaxed);
        self.inner.events_reentrant_dropped.store(0, Ordering::Relaxed);
        self.inner.interventions.store(0, Ordering::Relaxed);
        self.inner.bypass_signals.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_seen: u64,
    pub events_filtered: u64,
    pub events_rate_limited: u64,
    pub events_reentrant_dropped: u64,
    pub interventions: u64,
    pub bypass_signals: u64,
}

impl MetricsSnapshot {
    /// Share of type-eligible events dropped for liveness (0.0 to 1.0).
    ///
    /// Counts rate-limit and re-entrancy drops against events that passed the
    /// type filter. Returns 0.0 if nothing passed the filter.
    pub fn drop_rate(&self) -> f64 {
        let eligible = self.events_seen.saturating_sub(self.events_filtered);
        if eligible == 0 {
            return 0.0;
        }
        let dropped = self
            .events_rate_limited
            .saturating_add(self.events_reentrant_dropped);
        dropped as f64 / eligible as f64
    }
}
