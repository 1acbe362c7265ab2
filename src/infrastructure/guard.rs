//! The public facade wiring every component together.
//!
//! [`CommitmentGuard`] owns the shared state and hands the same `Arc`s to the
//! state machine, the classifier, the reactor, the sentinel and the
//! supervisor, so there is exactly one blocked set and one commitment per
//! guard.

use crate::application::classifier::{EventClassifier, Verdict};
use crate::application::commitment::{CommitmentError, CommitmentStateMachine};
use crate::application::metrics::Metrics;
use crate::application::ports::{
    Clock, DeviceIdentity, DeviceProbe, GuardListener, LockStore, NoopListener,
    PlatformCapabilities, SealError, Sealer, SecondaryBackup, StoreError,
};
use crate::application::reactor::EnforcementReactor;
use crate::application::registry::{BlockedApp, GuardState};
use crate::application::sentinel::{
    BypassSentinel, SentinelConfig, SentinelConfigError, SentinelReport,
};
use crate::application::supervisor::{ColdStartReport, PackageReplaced, Supervisor};
use crate::domain::event::WindowEvent;
use crate::domain::heuristics::SurfaceMatcher;
use crate::domain::lock::{CommitmentStatus, LockState};
use crate::infrastructure::backup::{FileBackup, MemoryBackup};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::config::GuardConfig;
use crate::infrastructure::crypto::AesGcmSealer;
use crate::infrastructure::identity::HostIdentity;
use crate::infrastructure::probe::HostProbe;
use crate::infrastructure::storage::{JsonFileLockStore, MemoryLockStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[cfg(feature = "async")]
use crate::application::feed::EventFeed;
#[cfg(feature = "async")]
use crate::application::supervisor::EngineHandle;
#[cfg(feature = "async")]
use std::sync::{Mutex, MutexGuard};

/// Error returned when building a [`CommitmentGuard`] fails.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("rate limiter bucket width must be greater than 0")]
    ZeroBucketWidth,
    #[error("rate limiter capacity must be greater than 0")]
    ZeroCapacity,
    #[error("host application id must not be empty")]
    EmptyHostId,
    /// No platform capability provider was supplied
    #[error("a platform capability provider is required")]
    MissingPlatform,
    #[error("sentinel configuration error: {0}")]
    Sentinel(#[from] SentinelConfigError),
    #[error("sealing key unavailable: {0}")]
    Key(#[from] SealError),
}

/// Builder for constructing a [`CommitmentGuard`].
///
/// Only the platform provider is required. Every other collaborator falls
/// back to a default picked from the configuration: file-backed storage when
/// the config names a path, in-memory otherwise.
#[derive(Debug, Default)]
pub struct CommitmentGuardBuilder {
    config: GuardConfig,
    clock: Option<Arc<dyn Clock>>,
    platform: Option<Arc<dyn PlatformCapabilities>>,
    probe: Option<Arc<dyn DeviceProbe>>,
    listener: Option<Arc<dyn GuardListener>>,
    store: Option<Arc<dyn LockStore>>,
    backup: Option<Arc<dyn SecondaryBackup>>,
    sealer: Option<Arc<dyn Sealer>>,
    identity: Option<Arc<dyn DeviceIdentity>>,
}

impl CommitmentGuardBuilder {
    pub fn with_config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom clock (mainly for tests).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn PlatformCapabilities>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn GuardListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn LockStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_backup(mut self, backup: Arc<dyn SecondaryBackup>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_sealer(mut self, sealer: Arc<dyn Sealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn DeviceIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Build the guard.
    ///
    /// Construction runs backup recovery once, so a guard built on storage
    /// that was cleared comes up with the commitment already restored. It
    /// does not rehydrate the blocked set; call
    /// [`CommitmentGuard::cold_start`] (or start the engine) for that.
    ///
    /// # Errors
    ///
    /// Returns `BuildError` if the configuration is invalid, no platform
    /// provider was set, or the configured key file cannot be used.
    pub fn build(self) -> Result<CommitmentGuard, BuildError> {
        let config = self.config;
        if config.rate_limit_bucket_millis == 0 {
            return Err(BuildError::ZeroBucketWidth);
        }
        if config.rate_limit_capacity == 0 {
            return Err(BuildError::ZeroCapacity);
        }
        if config.host_app_id.trim().is_empty() {
            return Err(BuildError::EmptyHostId);
        }
        let platform = self.platform.ok_or(BuildError::MissingPlatform)?;
        let sentinel_config =
            SentinelConfig::new(Duration::from_millis(config.sentinel_interval_millis))?
                .with_clock_jump_threshold(Duration::from_millis(
                    config.clock_jump_threshold_millis,
                ))
                .with_alert_cooldown(Duration::from_millis(config.alert_cooldown_millis));

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
        let store = self.store.unwrap_or_else(|| match &config.state_path {
            Some(path) => Arc::new(JsonFileLockStore::new(path)) as Arc<dyn LockStore>,
            None => Arc::new(MemoryLockStore::new()),
        });
        let backup = self.backup.unwrap_or_else(|| match &config.backup_path {
            Some(path) => Arc::new(FileBackup::new(path)) as Arc<dyn SecondaryBackup>,
            None => Arc::new(MemoryBackup::new()),
        });
        let sealer: Arc<dyn Sealer> = match self.sealer {
            Some(sealer) => sealer,
            None => match &config.key_path {
                Some(path) => Arc::new(AesGcmSealer::load_or_create(path)?),
                None => {
                    warn!("no key path configured, backups will not survive a restart");
                    Arc::new(AesGcmSealer::ephemeral())
                }
            },
        };
        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(HostIdentity::detect()) as Arc<dyn DeviceIdentity>);
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(HostProbe::new()) as Arc<dyn DeviceProbe>);
        let listener = self
            .listener
            .unwrap_or_else(|| Arc::new(NoopListener) as Arc<dyn GuardListener>);

        let metrics = Metrics::new();
        let state = Arc::new(GuardState::new());
        let commitment = Arc::new(CommitmentStateMachine::new(
            Arc::clone(&store),
            backup,
            sealer,
            identity,
            Arc::clone(&platform),
            Arc::clone(&clock),
            config.host_app_id.clone(),
        ));
        let reactor = EnforcementReactor::new(
            Arc::clone(&state),
            Arc::clone(&commitment),
            Arc::clone(&platform),
            Arc::clone(&listener),
            Arc::clone(&clock),
            metrics.clone(),
            config.host_label.clone(),
            config.min_intervention_interval(),
        );
        let classifier = Arc::new(EventClassifier::new(
            config.classifier(),
            SurfaceMatcher::new(&config.keywords),
            Arc::clone(&state),
            Arc::clone(&commitment),
            reactor,
            Arc::clone(&listener),
            Arc::clone(&clock),
            metrics.clone(),
        ));
        let sentinel = Arc::new(BypassSentinel::new(
            sentinel_config,
            Arc::clone(&commitment),
            Arc::clone(&state),
            Arc::clone(&store),
            platform,
            probe,
            Arc::clone(&clock),
            metrics.clone(),
        ));
        let supervisor = Supervisor::new(
            Arc::clone(&commitment),
            Arc::clone(&state),
            Arc::clone(&store),
            Arc::clone(&classifier),
            listener,
            Arc::clone(&clock),
        );

        info!(
            host_app_id = %config.host_app_id,
            commitment_active = commitment.is_active(),
            "commitment guard built"
        );

        Ok(CommitmentGuard {
            config,
            clock,
            store,
            state,
            commitment,
            classifier,
            sentinel,
            supervisor,
            metrics,
            #[cfg(feature = "async")]
            feed: EventFeed::new(),
            #[cfg(feature = "async")]
            engine: Mutex::new(None),
        })
    }
}

/// Entry point for the configuration layer and the event-observation host.
///
/// # Example
///
/// ```
/// use commitment_guard::infrastructure::mocks::MockPlatform;
/// use commitment_guard::{CommitmentGuard, Verdict, WindowEvent};
/// use std::sync::Arc;
///
/// let guard = CommitmentGuard::builder()
///     .with_platform(Arc::new(MockPlatform::new()))
///     .build()
///     .unwrap();
///
/// guard.add_blocked_app("com.example.game", u64::MAX).unwrap();
/// let verdict = guard.on_event(&WindowEvent::state_changed("com.example.game"));
/// assert!(verdict.is_intervention());
/// ```
#[derive(Debug)]
pub struct CommitmentGuard {
    config: GuardConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn LockStore>,
    state: Arc<GuardState>,
    commitment: Arc<CommitmentStateMachine>,
    classifier: Arc<EventClassifier>,
    sentinel: Arc<BypassSentinel>,
    supervisor: Supervisor,
    metrics: Metrics,
    #[cfg(feature = "async")]
    feed: EventFeed,
    #[cfg(feature = "async")]
    engine: Mutex<Option<EngineHandle>>,
}

impl CommitmentGuard {
    pub fn builder() -> CommitmentGuardBuilder {
        CommitmentGuardBuilder::default()
    }

    /// Start a commitment lasting `duration_hours` (zero is the five-minute
    /// test duration). Returns `false` when nothing was started; the cause
    /// is logged.
    pub fn start_commitment(&self, duration_hours: u32) -> bool {
        self.try_start_commitment(duration_hours).is_ok()
    }

    /// Like [`start_commitment`](Self::start_commitment), with the new
    /// deadline or the reason for failure.
    pub fn try_start_commitment(&self, duration_hours: u32) -> Result<u64, CommitmentError> {
        self.commitment.start(duration_hours)
    }

    pub fn is_commitment_active(&self) -> bool {
        self.commitment.is_active()
    }

    pub fn get_commitment_status(&self) -> CommitmentStatus {
        self.commitment.status()
    }

    pub fn lock_state(&self) -> LockState {
        self.commitment.state()
    }

    /// Block `package` until `end_time_millis`.
    ///
    /// The name the heuristics look for on system surfaces is derived from
    /// the package id, which misses apps whose id differs from their label.
    /// Use [`Self::add_blocked_app_labeled`] when the label is known.
    ///
    /// The in-memory block takes effect even when persisting it fails; the
    /// error is returned so the caller can report that it will not survive
    /// a restart.
    pub fn add_blocked_app(&self, package: &str, end_time_millis: u64) -> Result<(), StoreError> {
        self.insert_blocked(BlockedApp::new(package, None, end_time_millis))
    }

    /// Block `package` under an explicit display name, used by the
    /// heuristics to recognise it on system surfaces.
    pub fn add_blocked_app_labeled(
        &self,
        package: &str,
        display_name: &str,
        end_time_millis: u64,
    ) -> Result<(), StoreError> {
        self.insert_blocked(BlockedApp::new(package, Some(display_name), end_time_millis))
    }

    fn insert_blocked(&self, app: BlockedApp) -> Result<(), StoreError> {
        let package = app.package.clone();
        let end_time_millis = app.end_time_millis;
        self.state.insert_blocked(app);
        info!(package = %package, end_time_ms = end_time_millis, "app blocked");

        self.store
            .put_blocked_session(&package, end_time_millis)
            .map_err(|e| {
                error!(package = %package, error = %e, "failed to persist blocking session");
                e
            })
    }

    /// Stop blocking `package`. Returns whether it was blocked.
    pub fn remove_blocked_app(&self, package: &str) -> Result<bool, StoreError> {
        let removed = self.state.remove_blocked(package).is_some();
        if removed {
            info!(package = %package, "app unblocked");
        }
        self.store.remove_blocked_session(package).map_err(|e| {
            error!(package = %package, error = %e, "failed to remove blocking session");
            e
        })?;
        Ok(removed)
    }

    pub fn is_app_blocked(&self, package: &str) -> bool {
        self.state.is_blocked(package, self.clock.wall_millis())
    }

    /// Classify one window event synchronously on the caller's thread.
    pub fn on_event(&self, event: &WindowEvent) -> Verdict {
        self.classifier.on_event(event)
    }

    /// Restore state from durable storage. Idempotent.
    pub fn cold_start(&self) -> ColdStartReport {
        self.supervisor.cold_start()
    }

    pub fn handle_package_replaced(&self, package: &str) -> PackageReplaced {
        self.supervisor.handle_package_replaced(package)
    }

    /// Run one sentinel cycle on the caller's thread.
    pub fn run_sentinel_cycle(&self) -> SentinelReport {
        self.sentinel.run_cycle()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn state(&self) -> &Arc<GuardState> {
        &self.state
    }

    pub fn commitment(&self) -> &Arc<CommitmentStateMachine> {
        &self.commitment
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

#[cfg(feature = "async")]
impl CommitmentGuard {
    /// Hand an event to the running engine without blocking.
    ///
    /// Only the newest unprocessed event is kept.
    pub fn publish(&self, event: WindowEvent) {
        self.feed.publish(event);
    }

    /// Run the cold start and start the engine on the current tokio runtime.
    ///
    /// A running engine is stopped first, so calling this again restarts
    /// from persisted state.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_engine(&self) -> ColdStartReport {
        let mut engine = self.engine_slot();
        if let Some(mut running) = engine.take() {
            running.stop();
        }
        let (report, handle) = self.supervisor.boot(&self.feed, Arc::clone(&self.sentinel));
        *engine = Some(handle);
        report
    }

    /// Stop the engine. Idempotent.
    pub fn stop_engine(&self) {
        if let Some(mut running) = self.engine_slot().take() {
            running.stop();
        }
    }

    pub fn is_engine_running(&self) -> bool {
        self.engine_slot()
            .as_ref()
            .is_some_and(EngineHandle::is_running)
    }

    fn engine_slot(&self) -> MutexGuard<'_, Option<EngineHandle>> {
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
