//! Lifecycle supervisor.
//!
//! Re-establishes every subsystem from persisted state on each cold start and
//! reconciles package reinstalls. The restore order is fixed: the uninstall
//! block goes back first so the host cannot be removed during the rest of the
//! restoration, then the lock is recovered, then the blocked set is rebuilt,
//! and only then does the engine start consuming events.

use crate::application::classifier::EventClassifier;
use crate::application::commitment::{CommitmentStateMachine, RecoveryOutcome};
use crate::application::ports::{Clock, GuardListener, LockStore};
use crate::application::registry::{BlockedApp, GuardState};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(feature = "async")]
use crate::application::feed::EventFeed;
#[cfg(feature = "async")]
use crate::application::sentinel::{BypassSentinel, SentinelHandle};
#[cfg(feature = "async")]
use tokio::{sync::oneshot, task::JoinHandle};
#[cfg(feature = "async")]
use tracing::debug;

const MILLIS_PER_MINUTE: u64 = 60_000;

/// Result of [`Supervisor::cold_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColdStartReport {
    /// The uninstall block was re-requested before anything else
    pub uninstall_block_reapplied: bool,
    pub recovery: RecoveryOutcome,
    /// Blocked apps restored from the durable map
    pub rehydrated: usize,
}

/// Result of [`Supervisor::handle_package_replaced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageReplaced {
    pub was_blocked: bool,
    pub remaining_minutes: u64,
}

/// Explicit owner of subsystem start-up and reconciliation.
#[derive(Debug)]
pub struct Supervisor {
    commitment: Arc<CommitmentStateMachine>,
    state: Arc<GuardState>,
    store: Arc<dyn LockStore>,
    classifier: Arc<EventClassifier>,
    listener: Arc<dyn GuardListener>,
    clock: Arc<dyn Clock>,
}

impl Supervisor {
    pub fn new(
        commitment: Arc<CommitmentStateMachine>,
        state: Arc<GuardState>,
        store: Arc<dyn LockStore>,
        classifier: Arc<EventClassifier>,
        listener: Arc<dyn GuardListener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            commitment,
            state,
            store,
            classifier,
            listener,
            clock,
        }
    }

    /// Restore all state from durable storage. Idempotent.
    pub fn cold_start(&self) -> ColdStartReport {
        let uninstall_block_reapplied = self.commitment.has_lock_evidence();
        if uninstall_block_reapplied {
            self.commitment.reapply_uninstall_block();
        }

        let recovery = self.commitment.recover_from_backup();
        let rehydrated = self.rehydrate();

        info!(
            ?recovery,
            rehydrated,
            commitment_active = self.commitment.is_active(),
            "cold start complete"
        );
        ColdStartReport {
            uninstall_block_reapplied,
            recovery,
            rehydrated,
        }
    }

    /// Rebuild the in-memory blocked set from the durable session map.
    ///
    /// Sessions whose deadline already passed are skipped; the sentinel
    /// removes them from the store on its next cycle.
    pub fn rehydrate(&self) -> usize {
        let sessions = match self.store.blocked_sessions() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "could not read blocking sessions; keeping current set");
                return self.state.blocked_count();
            }
        };

        let now_millis = self.clock.wall_millis();
        self.state.clear();
        let mut restored = 0;
        for (package, end_time_millis) in sessions {
            if end_time_millis > now_millis {
                self.state
                    .insert_blocked(BlockedApp::new(package, None, end_time_millis));
                restored += 1;
            }
        }
        restored
    }

    /// Reconcile a reinstalled package and notify the listener.
    ///
    /// A reinstalled target is blocked again if its durable session is still
    /// running. A reinstall of the host itself re-runs the full cold start.
    pub fn handle_package_replaced(&self, package: &str) -> PackageReplaced {
        if package == self.commitment.host_app_id() {
            self.cold_start();
        }

        let now_millis = self.clock.wall_millis();
        let session_end = match self.store.blocked_sessions() {
            Ok(sessions) => sessions.get(package).copied(),
            Err(e) => {
                warn!(error = %e, package, "could not read blocking sessions");
                self.state.blocked_app(package).map(|app| app.end_time_millis)
            }
        };

        let outcome = match session_end {
            Some(end) if end > now_millis => {
                if !self.state.is_blocked(package, now_millis) {
                    self.state.insert_blocked(BlockedApp::new(package, None, end));
                }
                PackageReplaced {
                    was_blocked: true,
                    remaining_minutes: (end - now_millis).div_ceil(MILLIS_PER_MINUTE),
                }
            }
            _ => PackageReplaced {
                was_blocked: false,
                remaining_minutes: 0,
            },
        };

        info!(
            package,
            was_blocked = outcome.was_blocked,
            remaining_minutes = outcome.remaining_minutes,
            "package reinstalled"
        );
        self.listener
            .on_package_reinstalled(package, outcome.was_blocked, outcome.remaining_minutes);
        outcome
    }

    pub fn classifier(&self) -> &Arc<EventClassifier> {
        &self.classifier
    }

    /// Start the classification task and the sentinel loop.
    ///
    /// Call after [`Supervisor::cold_start`]; the engine never sees events
    /// before the blocked set is restored.
    #[cfg(feature = "async")]
    pub fn start_engine(&self, feed: &EventFeed, sentinel: Arc<BypassSentinel>) -> EngineHandle {
        let mut subscription = feed.subscribe();
        let classifier = Arc::clone(&self.classifier);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = subscription.next() => match event {
                        Some(event) => {
                            classifier.on_event(&event);
                        }
                        None => break,
                    },
                }
            }
            debug!("classification task stopped");
        });

        let sentinel = sentinel.start(|report| {
            if report.commitment_cleared {
                info!("commitment cleared by sentinel");
            }
        });

        info!("enforcement engine started");
        EngineHandle {
            shutdown_tx: Some(shutdown_tx),
            classifier: Some(join),
            sentinel: Some(sentinel),
        }
    }

    /// Cold start followed by engine start, in that order.
    #[cfg(feature = "async")]
    pub fn boot(
        &self,
        feed: &EventFeed,
        sentinel: Arc<BypassSentinel>,
    ) -> (ColdStartReport, EngineHandle) {
        let report = self.cold_start();
        let engine = self.start_engine(feed, sentinel);
        (report, engine)
    }
}

/// Handle to the running enforcement engine.
///
/// Stopping releases the event subscription and the sentinel timer. It is
/// idempotent and also runs when the handle is dropped.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct EngineHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    classifier: Option<JoinHandle<()>>,
    sentinel: Option<SentinelHandle>,
}

#[cfg(feature = "async")]
impl EngineHandle {
    pub fn stop(&mut self) {
        let was_running = self.classifier.is_some() || self.sentinel.is_some();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.classifier.take() {
            join.abort();
        }
        if let Some(mut sentinel) = self.sentinel.take() {
            sentinel.stop();
        }

        if was_running {
            info!("enforcement engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.classifier
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }
}

#[cfg(feature = "async")]
impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
