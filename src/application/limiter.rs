//! Admission control for the event-observation callback.
//!
//! Two hard gates sit in front of classification:
//! - [`EventRateLimiter`]: a fixed bucket (50ms by default) admitting at most
//!   N events (10 by default); the rest of the bucket is dropped.
//! - [`ReentrancyGuard`]: a single in-flight classification; overlapping
//!   events are dropped, never queued.
//!
//! Both are built on atomics so the callback never blocks. Dropping events
//! degrades detection gracefully; processing all of them could starve the
//! host's UI thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Decision about whether an event may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Let the event through to classification
    Allow,
    /// Drop the event
    Suppress,
}

impl LimitDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, LimitDecision::Allow)
    }
}

/// Configuration for the bucket limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Width of one bucket
    pub bucket: Duration,
    /// Events admitted per bucket
    pub max_events: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            bucket: Duration::from_millis(50),
            max_events: 10,
        }
    }
}

const NO_WINDOW: u64 = u64::MAX;
const COUNT_BITS: u32 = 20;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;
const MAX_START_MILLIS: u64 = (u64::MAX >> COUNT_BITS) - 1;

/// Fixed-bucket event limiter.
///
/// The bucket start (milliseconds since `epoch`) and the event count are
/// packed into one atomic word so opening a bucket and counting into it are
/// a single compare-and-swap. Runs on monotonic time so a wall-clock
/// rollback cannot pin the limiter in an old bucket.
#[derive(Debug)]
pub struct EventRateLimiter {
    config: RateLimiterConfig,
    /// `window_start_millis << COUNT_BITS | event_count`, or `NO_WINDOW`
    state: AtomicU64,
    /// Reference epoch for timestamp calculations
    epoch: Instant,
}

impl EventRateLimiter {
    pub fn new(config: RateLimiterConfig, epoch: Instant) -> Self {
        Self {
            config,
            state: AtomicU64::new(NO_WINDOW),
            epoch,
        }
    }

    /// Register one event observed at `now` and decide whether it proceeds.
    pub fn check(&self, now: Instant) -> LimitDecision {
        let now_millis = u64::try_from(now.saturating_duration_since(self.epoch).as_millis())
            .unwrap_or(MAX_START_MILLIS)
            .min(MAX_START_MILLIS);
        let bucket_millis = u64::try_from(self.config.bucket.as_millis()).unwrap_or(u64::MAX);
        let max_events = u64::from(self.config.max_events);

        let mut admitted = false;
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let in_bucket = state != NO_WINDOW
                    && now_millis.saturating_sub(state >> COUNT_BITS) < bucket_millis;

                if in_bucket {
                    let count = ((state & COUNT_MASK) + 1).min(COUNT_MASK);
                    admitted = count <= max_events;
                    Some((state & !COUNT_MASK) | count)
                } else {
                    admitted = max_events >= 1;
                    Some((now_millis << COUNT_BITS) | 1)
                }
            });

        if admitted {
            LimitDecision::Allow
        } else {
            LimitDecision::Suppress
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Forget the current bucket.
    pub fn reset(&self) {
        self.state.store(NO_WINDOW, Ordering::Release);
    }
}

/// Single in-flight classification gate.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

/// Held while a classification runs; releases the guard on drop.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the permit is dropped"]
pub struct ReentrancyPermit<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the guarded section, or `None` if another caller is inside.
    pub fn try_enter(&self) -> Option<ReentrancyPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReentrancyPermit { guard: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for ReentrancyPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}
