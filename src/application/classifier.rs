//! Event classifier.
//!
//! Runs every window event through a fixed sequence of gates. The cheap gates
//! come first so the dominant case (nothing blocked, no lock, no sticky
//! window) returns without looking at package names or text:
//!
//! 1. type filter
//! 2. bucket rate limiter
//! 3. re-entrancy guard
//! 4. own-package and idle fast path
//! 5. authentication-screen allowlist
//! 6. sticky protection on monitored surfaces
//! 7. surface-scoped keyword heuristics
//! 8. blocked foreground check (state changes only)

use crate::application::commitment::CommitmentStateMachine;
use crate::application::limiter::{EventRateLimiter, RateLimiterConfig, ReentrancyGuard};
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, GuardListener};
use crate::application::reactor::{EnforcementReactor, InterventionReason};
use crate::application::registry::GuardState;
use crate::domain::event::WindowEvent;
use crate::domain::heuristics::SurfaceMatcher;
use crate::domain::sticky::DEFAULT_STICKY_MILLIS;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Why an event never reached classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Filtered,
    RateLimited,
    Reentrant,
}

/// Outcome of classifying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Dropped before classification.
    Dropped(DropReason),
    /// Classified and left alone.
    Pass,
    /// Credential, biometric or lock prompt; never interfered with.
    AuthScreen,
    /// The event called for an intervention. `redirected` is false when the
    /// reactor skipped it because of its per-package interval.
    Intervene {
        reason: InterventionReason,
        redirected: bool,
    },
}

impl Verdict {
    pub fn is_intervention(&self) -> bool {
        matches!(self, Verdict::Intervene { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Verdict::Dropped(_))
    }
}

/// Static settings for the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub rate_limit: RateLimiterConfig,
    pub sticky_duration: Duration,
    /// Events from the host application itself are never classified.
    pub host_app_id: String,
    /// Lowercase label protected while a commitment is active.
    pub host_label: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimiterConfig::default(),
            sticky_duration: Duration::from_millis(DEFAULT_STICKY_MILLIS),
            host_app_id: String::new(),
            host_label: String::new(),
        }
    }
}

/// Classifies window events and hands interventions to the reactor.
///
/// Safe to call from any thread; `on_event` never blocks.
#[derive(Debug)]
pub struct EventClassifier {
    config: ClassifierConfig,
    matcher: SurfaceMatcher,
    limiter: EventRateLimiter,
    reentrancy: ReentrancyGuard,
    state: Arc<GuardState>,
    commitment: Arc<CommitmentStateMachine>,
    reactor: EnforcementReactor,
    listener: Arc<dyn GuardListener>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl EventClassifier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ClassifierConfig,
        matcher: SurfaceMatcher,
        state: Arc<GuardState>,
        commitment: Arc<CommitmentStateMachine>,
        reactor: EnforcementReactor,
        listener: Arc<dyn GuardListener>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        let limiter = EventRateLimiter::new(config.rate_limit, clock.now());
        let config = ClassifierConfig {
            host_label: config.host_label.to_lowercase(),
            ..config
        };
        Self {
            config,
            matcher,
            limiter,
            reentrancy: ReentrancyGuard::new(),
            state,
            commitment,
            reactor,
            listener,
            clock,
            metrics,
        }
    }

    /// Classify one event and act on it.
    pub fn on_event(&self, event: &WindowEvent) -> Verdict {
        self.metrics.record_seen();

        if !event.kind.is_classified() {
            self.metrics.record_filtered();
            return Verdict::Dropped(DropReason::Filtered);
        }

        if !self.limiter.check(self.clock.now()).is_allow() {
            self.metrics.record_rate_limited();
            trace!(package = %event.source_package, "event dropped by rate limiter");
            return Verdict::Dropped(DropReason::RateLimited);
        }

        let Some(_permit) = self.reentrancy.try_enter() else {
            self.metrics.record_reentrant_drop();
            trace!(package = %event.source_package, "event dropped, classification in flight");
            return Verdict::Dropped(DropReason::Reentrant);
        };

        self.classify(event)
    }

    fn classify(&self, event: &WindowEvent) -> Verdict {
        let package = event.source_package.as_ref();
        if package == self.config.host_app_id {
            return Verdict::Pass;
        }

        let now_millis = self.clock.wall_millis();
        let lock_active = self.commitment.is_active();
        let sticky_open = self.state.is_sticky_open(now_millis);
        if !lock_active && !sticky_open && !self.state.has_blocked_apps() {
            return Verdict::Pass;
        }

        if let Some(surface) = self.matcher.surface_of(package) {
            if self.matcher.is_auth_screen(&event.class_name) {
                trace!(package, class = %event.class_name, "authentication screen allowed");
                return Verdict::AuthScreen;
            }

            if sticky_open {
                return self.intervene(package, InterventionReason::StickyProtection { surface });
            }

            let targets = self.protected_targets(now_millis, lock_active);
            if let Some(hit) =
                self.matcher
                    .match_attempt(surface, &event.class_name, &event.text, &targets)
            {
                self.reactor
                    .arm_sticky_protection(&hit.target, self.config.sticky_duration);
                return self.intervene(
                    package,
                    InterventionReason::UninstallAttempt {
                        surface: hit.surface,
                        target: hit.target,
                    },
                );
            }
        }

        if event.is_state_change() {
            if self.state.note_foreground(package) {
                self.listener.on_app_launched(package);
            }
            if self.state.is_blocked(package, now_millis) {
                return self.intervene(package, InterventionReason::BlockedForeground);
            }
        }

        Verdict::Pass
    }

    fn intervene(&self, package: &str, reason: InterventionReason) -> Verdict {
        let redirected = self.reactor.intervene_on(package, &reason);
        Verdict::Intervene { reason, redirected }
    }

    fn protected_targets(&self, now_millis: u64, lock_active: bool) -> Vec<String> {
        let mut targets = self.state.blocked_labels(now_millis);
        if lock_active && !self.config.host_label.is_empty() {
            targets.push(self.config.host_label.clone());
        }
        targets
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn state(&self) -> &Arc<GuardState> {
        &self.state
    }

    pub fn reactor(&self) -> &EnforcementReactor {
        &self.reactor
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}
