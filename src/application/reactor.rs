//! Enforcement reactor.
//!
//! Turns a classifier verdict into platform side effects. The reactor never
//! opens the host application's own UI in response to a detection; it only
//! redirects the user away and reports telemetry to the listener.

use crate::application::commitment::CommitmentStateMachine;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, GuardListener, PlatformCapabilities};
use crate::application::registry::GuardState;
use crate::domain::heuristics::Surface;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default minimum time between two interventions on the same package.
pub const DEFAULT_MIN_INTERVENTION_INTERVAL: Duration = Duration::from_millis(1_000);

/// Why the classifier asked for an intervention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterventionReason {
    /// A blocked app reached the foreground.
    BlockedForeground,
    /// Heuristics matched an uninstall or disable flow naming a protected target.
    UninstallAttempt { surface: Surface, target: String },
    /// A monitored surface was opened while the sticky window was armed.
    StickyProtection { surface: Surface },
}

impl InterventionReason {
    pub fn name(&self) -> &'static str {
        match self {
            InterventionReason::BlockedForeground => "blocked_foreground",
            InterventionReason::UninstallAttempt { .. } => "uninstall_attempt",
            InterventionReason::StickyProtection { .. } => "sticky_protection",
        }
    }

    fn leaves_dialog(&self) -> bool {
        !matches!(self, InterventionReason::BlockedForeground)
    }
}

/// Performs redirects on behalf of the classifier.
#[derive(Debug)]
pub struct EnforcementReactor {
    state: Arc<GuardState>,
    commitment: Arc<CommitmentStateMachine>,
    platform: Arc<dyn PlatformCapabilities>,
    listener: Arc<dyn GuardListener>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    host_label: String,
    min_interval: Duration,
}

impl EnforcementReactor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<GuardState>,
        commitment: Arc<CommitmentStateMachine>,
        platform: Arc<dyn PlatformCapabilities>,
        listener: Arc<dyn GuardListener>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        host_label: impl Into<String>,
        min_interval: Duration,
    ) -> Self {
        Self {
            state,
            commitment,
            platform,
            listener,
            clock,
            metrics,
            host_label: host_label.into().to_lowercase(),
            min_interval,
        }
    }

    /// Redirect the user away from `package`.
    ///
    /// Returns `true` if a redirect was issued. Skips the action when the
    /// same package was redirected less than the minimum interval ago, or
    /// when the reason no longer holds at the time of acting.
    pub fn intervene_on(&self, package: &str, reason: &InterventionReason) -> bool {
        let now_millis = self.clock.wall_millis();
        if !self.still_applies(package, reason, now_millis) {
            debug!(package, reason = reason.name(), "intervention no longer applies");
            return false;
        }

        if !self
            .state
            .try_claim_intervention(package, self.clock.now(), self.min_interval)
        {
            trace!(package, "intervention suppressed by per-package interval");
            return false;
        }

        if reason.leaves_dialog() {
            if let Err(e) = self.platform.go_back() {
                warn!(error = %e, package, "go_back failed");
            }
        }
        if let Err(e) = self.platform.navigate_home() {
            warn!(error = %e, package, "navigate_home failed");
        }

        self.metrics.record_intervention();
        info!(package, reason = reason.name(), "intervened");

        if matches!(reason, InterventionReason::BlockedForeground) {
            self.listener.on_limited_app_launched(package);
        }
        true
    }

    /// Open or refresh the sticky protection window for `label`.
    pub fn arm_sticky_protection(&self, label: &str, duration: Duration) {
        let duration_millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let now_millis = self.clock.wall_millis();
        self.state.arm_sticky(now_millis, duration_millis, label);
        debug!(
            target_label = label,
            until_ms = now_millis.saturating_add(duration_millis),
            "sticky protection armed"
        );
    }

    /// Whether `label` is protected right now: a blocked app, or the host
    /// itself while a commitment is active.
    pub fn is_protected_target(&self, label: &str, now_millis: u64) -> bool {
        self.state.is_blocked_label(label, now_millis)
            || (label == self.host_label && self.commitment.is_active())
    }

    fn still_applies(&self, package: &str, reason: &InterventionReason, now_millis: u64) -> bool {
        match reason {
            InterventionReason::BlockedForeground => self.state.is_blocked(package, now_millis),
            InterventionReason::UninstallAttempt { target, .. } => {
                self.is_protected_target(target, now_millis)
            }
            InterventionReason::StickyProtection { .. } => self.state.is_sticky_open(now_millis),
        }
    }
}
