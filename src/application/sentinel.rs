//! Bypass sentinel.
//!
//! A low-frequency polling loop that samples device and platform signals,
//! prunes expired blocking sessions and finishes expired commitments. The
//! sentinel is advisory: signals are logged and counted, and the only one
//! that may interrupt the user is a revoked event-observation capability
//! while a block is active.

use crate::application::commitment::CommitmentStateMachine;
use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, DeviceProbe, LockStore, PlatformCapabilities};
use crate::application::registry::GuardState;
use crate::domain::lock::FingerprintCheck;
use crate::domain::signal::BypassSignal;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[cfg(feature = "async")]
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};

/// Error returned when sentinel configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SentinelConfigError {
    #[error("sentinel interval must be greater than 0")]
    ZeroInterval,
}

/// Configuration for the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelConfig {
    /// Time between two cycles
    pub interval: Duration,
    /// Wall-clock drift relative to monotonic time that counts as a jump
    pub clock_jump_threshold: Duration,
    /// Minimum time between two user-facing alerts
    pub alert_cooldown: Duration,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            clock_jump_threshold: Duration::from_millis(120_000),
            alert_cooldown: Duration::from_secs(5 * 60),
        }
    }
}

impl SentinelConfig {
    /// # Errors
    /// Returns `SentinelConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, SentinelConfigError> {
        if interval.is_zero() {
            return Err(SentinelConfigError::ZeroInterval);
        }
        Ok(Self {
            interval,
            ..Self::default()
        })
    }

    pub fn with_clock_jump_threshold(mut self, threshold: Duration) -> Self {
        self.clock_jump_threshold = threshold;
        self
    }

    pub fn with_alert_cooldown(mut self, cooldown: Duration) -> Self {
        self.alert_cooldown = cooldown;
        self
    }
}

/// What one cycle observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentinelReport {
    pub signals: Vec<BypassSignal>,
    /// A critical alert was surfaced to the user
    pub alerted: bool,
    /// Blocking sessions removed because their deadline passed
    pub pruned: Vec<String>,
    /// The commitment expired and was cleared during this cycle
    pub commitment_cleared: bool,
    /// The cycle panicked and was abandoned
    pub aborted: bool,
}

#[derive(Debug, Default)]
struct SentinelMemory {
    /// Monotonic and wall readings at the end of the previous cycle
    baseline: Option<(Instant, u64)>,
    last_alert: Option<Instant>,
    /// Signal names raised by the previous cycle
    previous: Vec<&'static str>,
}

/// Background sampler of bypass signals.
#[derive(Debug)]
pub struct BypassSentinel {
    config: SentinelConfig,
    commitment: Arc<CommitmentStateMachine>,
    state: Arc<GuardState>,
    store: Arc<dyn LockStore>,
    platform: Arc<dyn PlatformCapabilities>,
    probe: Arc<dyn DeviceProbe>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    memory: Mutex<SentinelMemory>,
}

impl BypassSentinel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SentinelConfig,
        commitment: Arc<CommitmentStateMachine>,
        state: Arc<GuardState>,
        store: Arc<dyn LockStore>,
        platform: Arc<dyn PlatformCapabilities>,
        probe: Arc<dyn DeviceProbe>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            commitment,
            state,
            store,
            platform,
            probe,
            clock,
            metrics,
            memory: Mutex::new(SentinelMemory::default()),
        }
    }

    /// Run one cycle. A panic inside the cycle is caught and reported so the
    /// next cycle still runs.
    pub fn run_cycle(&self) -> SentinelReport {
        match catch_unwind(AssertUnwindSafe(|| self.cycle())) {
            Ok(report) => report,
            Err(_) => {
                error!("sentinel cycle panicked; continuing with next cycle");
                SentinelReport {
                    aborted: true,
                    ..SentinelReport::default()
                }
            }
        }
    }

    /// Signals are advisory, so expiry is judged on the wall clock even in a
    /// cycle that reports [`BypassSignal::ClockJump`]: moving the clock
    /// forward past the deadline ends the commitment early. Moving it back
    /// only ever extends it.
    fn cycle(&self) -> SentinelReport {
        let now_millis = self.clock.wall_millis();
        let mut report = SentinelReport {
            pruned: self.prune_sessions(now_millis),
            ..SentinelReport::default()
        };

        let block_active = self.commitment.is_active()
            || self
                .state
                .blocked_apps()
                .iter()
                .any(|app| app.is_blocked_at(now_millis));

        report.signals = self.collect_signals(block_active);
        self.log_signals(&report.signals);

        if block_active
            && report
                .signals
                .iter()
                .any(|signal| signal.is_critical())
        {
            report.alerted = self.surface_alert();
        }

        report.commitment_cleared = self.commitment.clear_if_expired();
        report
    }

    fn collect_signals(&self, block_active: bool) -> Vec<BypassSignal> {
        let mut signals = Vec::new();

        if let Some(skew_millis) = self.clock_skew() {
            signals.push(BypassSignal::ClockJump { skew_millis });
        }

        if let FingerprintCheck::Mismatch { .. } = self.commitment.validate() {
            signals.push(BypassSignal::FingerprintMismatch);
        }

        let status = self.platform.capability_status();
        if !status.battery_exempt {
            signals.push(BypassSignal::BatteryOptimized);
            if block_active {
                if let Err(e) = self.platform.request_battery_exemption() {
                    warn!(error = %e, "battery exemption request failed");
                }
            }
        }
        if !status.notifications_permitted {
            signals.push(BypassSignal::NotificationsDenied);
        }
        if status.secondary_user {
            signals.push(BypassSignal::SecondaryUser);
        }
        if !status.observation_enabled {
            signals.push(BypassSignal::ObservationRevoked);
        }

        if self.probe.is_rooted() {
            signals.push(BypassSignal::Rooted);
        }
        if self.probe.is_emulator() {
            signals.push(BypassSignal::Emulator);
        }
        if self.probe.is_debuggable() {
            signals.push(BypassSignal::Debuggable);
        }
        signals.extend(
            self.probe
                .hook_frameworks()
                .into_iter()
                .map(|name| BypassSignal::HookFramework { name }),
        );

        signals
    }

    /// Wall-clock drift against monotonic time since the previous cycle.
    fn clock_skew(&self) -> Option<i64> {
        let mono = self.clock.now();
        let wall = self.clock.wall_millis();
        let previous = self.memory().baseline.replace((mono, wall));
        let (prev_mono, prev_wall) = previous?;

        let mono_delta = i64::try_from(mono.saturating_duration_since(prev_mono).as_millis())
            .unwrap_or(i64::MAX);
        let wall_delta = i64::try_from(wall)
            .unwrap_or(i64::MAX)
            .saturating_sub(i64::try_from(prev_wall).unwrap_or(i64::MAX));
        let skew = wall_delta.saturating_sub(mono_delta);

        let threshold = i64::try_from(self.config.clock_jump_threshold.as_millis())
            .unwrap_or(i64::MAX);
        (skew.unsigned_abs() > threshold.unsigned_abs()).then_some(skew)
    }

    /// Signals are re-evaluated every cycle but only logged when they appear.
    fn log_signals(&self, signals: &[BypassSignal]) {
        let names: Vec<&'static str> = signals.iter().map(BypassSignal::name).collect();
        let mut memory = self.memory();
        for signal in signals {
            if !memory.previous.contains(&signal.name()) {
                self.metrics.record_bypass_signal();
                warn!(signal = %signal, "bypass signal raised");
            }
        }
        for name in &memory.previous {
            if !names.contains(name) {
                debug!(signal = name, "bypass signal cleared");
            }
        }
        memory.previous = names;
    }

    fn surface_alert(&self) -> bool {
        let now = self.clock.now();
        {
            let mut memory = self.memory();
            if let Some(last) = memory.last_alert {
                if now.saturating_duration_since(last) < self.config.alert_cooldown {
                    debug!("critical alert suppressed by cooldown");
                    return false;
                }
            }
            memory.last_alert = Some(now);
        }

        match self
            .platform
            .surface_alert("event observation was disabled while a block is active")
        {
            Ok(()) => {
                info!("critical alert surfaced");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to surface critical alert");
                false
            }
        }
    }

    fn prune_sessions(&self, now_millis: u64) -> Vec<String> {
        let mut pruned = self.state.prune_expired(now_millis);

        match self.store.blocked_sessions() {
            Ok(sessions) => {
                for (package, end) in sessions {
                    if end <= now_millis && !pruned.contains(&package) {
                        pruned.push(package);
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not read blocking sessions"),
        }

        for package in &pruned {
            if let Err(e) = self.store.remove_blocked_session(package) {
                error!(error = %e, package = %package, "failed to remove expired blocking session");
            }
        }
        if !pruned.is_empty() {
            info!(count = pruned.len(), "expired blocking sessions pruned");
        }
        pruned
    }

    fn memory(&self) -> MutexGuard<'_, SentinelMemory> {
        // A panicked cycle leaves plain data behind; keep using it
        self.memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Start running cycles periodically on the tokio runtime.
    ///
    /// The first cycle runs immediately. `on_report` receives every report.
    #[cfg(feature = "async")]
    pub fn start<F>(self: Arc<Self>, mut on_report: F) -> SentinelHandle
    where
        F: FnMut(SentinelReport) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let report = self.run_cycle();
                        on_report(report);
                    }
                }
            }
            debug!("sentinel loop stopped");
        });

        SentinelHandle {
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        }
    }
}

/// Error returned when the sentinel task did not stop cleanly.
#[cfg(feature = "async")]
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("sentinel task panicked")]
    TaskPanicked,
    #[error("sentinel task was cancelled")]
    TaskCancelled,
}

/// Handle to a running sentinel loop.
///
/// Dropping the handle stops the loop.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct SentinelHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

#[cfg(feature = "async")]
impl SentinelHandle {
    /// Stop the loop without waiting for it. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }

    /// Signal the loop to stop and wait for the task to finish.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.join.take() {
            Some(join) => join.await.map_err(|e| {
                if e.is_panic() {
                    ShutdownError::TaskPanicked
                } else {
                    ShutdownError::TaskCancelled
                }
            }),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }
}

#[cfg(feature = "async")]
impl Drop for SentinelHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::CapabilityStatus;
    use crate::application::registry::BlockedApp;
    use crate::infrastructure::crypto::AesGcmSealer;
    use crate::infrastructure::mocks::{
        MemoryBackup, MockClock, MockPlatform, MockProbe, PlatformCall, StaticIdentity,
    };
    use crate::infrastructure::storage::MemoryLockStore;

    struct Rig {
        clock: Arc<MockClock>,
        platform: Arc<MockPlatform>,
        probe: Arc<MockProbe>,
        store: Arc<MemoryLockStore>,
        state: Arc<GuardState>,
        commitment: Arc<CommitmentStateMachine>,
        metrics: Metrics,
        sentinel: BypassSentinel,
    }

    fn rig() -> Rig {
        let clock = Arc::new(MockClock::at_wall(10_000_000));
        let platform = Arc::new(MockPlatform::new());
        let probe = Arc::new(MockProbe::new());
        let store = Arc::new(MemoryLockStore::new());
        let state = Arc::new(GuardState::new());
        let metrics = Metrics::new();
        let commitment = Arc::new(CommitmentStateMachine::new(
            store.clone(),
            Arc::new(MemoryBackup::new()),
            Arc::new(AesGcmSealer::from_key([9u8; 32])),
            Arc::new(StaticIdentity::new("device")),
            platform.clone(),
            clock.clone(),
            "com.example.guard",
        ));
        let sentinel = BypassSentinel::new(
            SentinelConfig::default(),
            commitment.clone(),
            state.clone(),
            store.clone(),
            platform.clone(),
            probe.clone(),
            clock.clone(),
            metrics.clone(),
        );
        Rig {
            clock,
            platform,
            probe,
            store,
            state,
            commitment,
            metrics,
            sentinel,
        }
    }

    #[test]
    fn test_quiet_device_raises_nothing() {
        let rig = rig();
        let report = rig.sentinel.run_cycle();
        assert!(report.signals.is_empty());
        assert!(!report.alerted);
        assert!(!report.commitment_cleared);
    }

    #[test]
    fn test_clock_rollback_is_detected() {
        let rig = rig();
        rig.sentinel.run_cycle();

        rig.clock.advance(Duration::from_secs(30));
        rig.clock.set_wall(rig.clock.wall_millis() - 3_600_000);

        let report = rig.sentinel.run_cycle();
        assert_eq!(
            report.signals,
            vec![BypassSignal::ClockJump {
                skew_millis: -3_600_000
            }]
        );
    }

    #[test]
    fn test_small_drift_is_tolerated() {
        let rig = rig();
        rig.sentinel.run_cycle();
        rig.clock.advance(Duration::from_secs(30));
        rig.clock.set_wall(rig.clock.wall_millis() + 5_000);

        assert!(rig.sentinel.run_cycle().signals.is_empty());
    }

    #[test]
    fn test_probe_signals_counted_once_while_present() {
        let rig = rig();
        rig.probe.set_rooted(true);
        rig.probe.add_hook_framework("xposed");

        let first = rig.sentinel.run_cycle();
        assert!(first.signals.contains(&BypassSignal::Rooted));
        assert!(first.signals.contains(&BypassSignal::HookFramework {
            name: "xposed".into()
        }));
        assert_eq!(rig.metrics.bypass_signals(), 2);

        rig.sentinel.run_cycle();
        assert_eq!(rig.metrics.bypass_signals(), 2);
    }

    #[test]
    fn test_battery_exemption_requested_while_blocking() {
        let rig = rig();
        rig.platform.set_status(CapabilityStatus {
            battery_exempt: false,
            ..CapabilityStatus::default()
        });

        rig.sentinel.run_cycle();
        assert!(!rig
            .platform
            .calls()
            .contains(&PlatformCall::RequestBatteryExemption));

        rig.commitment.start(1).unwrap();
        let report = rig.sentinel.run_cycle();
        assert!(report.signals.contains(&BypassSignal::BatteryOptimized));
        assert!(rig
            .platform
            .calls()
            .contains(&PlatformCall::RequestBatteryExemption));
    }

    #[test]
    fn test_observation_revoked_alert_respects_cooldown() {
        let rig = rig();
        rig.commitment.start(1).unwrap();
        rig.platform.set_status(CapabilityStatus {
            observation_enabled: false,
            ..CapabilityStatus::default()
        });

        assert!(rig.sentinel.run_cycle().alerted);
        rig.clock.advance(Duration::from_secs(30));
        assert!(!rig.sentinel.run_cycle().alerted);
        rig.clock.advance(Duration::from_secs(5 * 60));
        assert!(rig.sentinel.run_cycle().alerted);
        assert_eq!(rig.platform.alerts().len(), 2);
    }

    #[test]
    fn test_observation_revoked_without_block_is_silent() {
        let rig = rig();
        rig.platform.set_status(CapabilityStatus {
            observation_enabled: false,
            ..CapabilityStatus::default()
        });

        let report = rig.sentinel.run_cycle();
        assert!(report.signals.contains(&BypassSignal::ObservationRevoked));
        assert!(!report.alerted);
        assert!(rig.platform.alerts().is_empty());
    }

    #[test]
    fn test_expired_sessions_pruned_from_memory_and_store() {
        let rig = rig();
        let now = rig.clock.wall_millis();
        rig.state
            .insert_blocked(BlockedApp::new("com.example.game", None, now + 1_000));
        rig.store
            .put_blocked_session("com.example.game", now + 1_000)
            .unwrap();
        rig.store
            .put_blocked_session("com.example.stale", now - 1)
            .unwrap();

        rig.clock.advance(Duration::from_millis(1_000));
        let mut pruned = rig.sentinel.run_cycle().pruned;
        pruned.sort();

        assert_eq!(pruned, vec!["com.example.game", "com.example.stale"]);
        assert!(rig.store.blocked_sessions().unwrap().is_empty());
        assert_eq!(rig.state.blocked_count(), 0);
    }

    #[test]
    fn test_cycle_clears_expired_commitment() {
        let rig = rig();
        rig.commitment.start(0).unwrap();

        assert!(!rig.sentinel.run_cycle().commitment_cleared);
        rig.clock.advance(Duration::from_millis(300_000));
        assert!(rig.sentinel.run_cycle().commitment_cleared);
        assert!(!rig.sentinel.run_cycle().commitment_cleared);
    }

    #[test]
    fn test_panicking_probe_does_not_stop_cycles() {
        let rig = rig();
        rig.probe.panic_next();

        assert!(rig.sentinel.run_cycle().aborted);
        assert!(!rig.sentinel.run_cycle().aborted);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert_eq!(
            SentinelConfig::new(Duration::ZERO),
            Err(SentinelConfigError::ZeroInterval)
        );
    }

    #[cfg(feature = "async")]
    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_until_shutdown() {
        let rig = rig();
        let sentinel = Arc::new(BypassSentinel::new(
            SentinelConfig::new(Duration::from_millis(100)).unwrap(),
            rig.commitment.clone(),
            rig.state.clone(),
            rig.store.clone(),
            rig.platform.clone(),
            rig.probe.clone(),
            rig.clock.clone(),
            rig.metrics.clone(),
        ));

        let reports = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&reports);
        let handle = sentinel.start(move |_| *counter.lock().unwrap() += 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.shutdown().await.unwrap();

        let seen = *reports.lock().unwrap();
        assert!(seen >= 3, "expected at least 3 cycles, saw {}", seen);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*reports.lock().unwrap(), seen);
    }
}
