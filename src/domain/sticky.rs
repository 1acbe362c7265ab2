//! Sticky protection window.
//!
//! After a detected circumvention attempt, every event from a monitored
//! surface is blocked unconditionally until the window closes. The window is
//! ephemeral: it lives only in memory and is re-armed on each detection.

/// Default length of a sticky window.
pub const DEFAULT_STICKY_MILLIS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StickyProtectionWindow {
    pub until_millis: u64,
    pub target_label: String,
}

impl StickyProtectionWindow {
    pub fn armed(now_millis: u64, duration_millis: u64, target_label: impl Into<String>) -> Self {
        Self {
            until_millis: now_millis.saturating_add(duration_millis),
            target_label: target_label.into(),
        }
    }

    /// Open while `now_millis` has not reached the deadline.
    pub fn is_open_at(&self, now_millis: u64) -> bool {
        now_millis < self.until_millis
    }
}
