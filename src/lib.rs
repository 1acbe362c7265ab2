//! # commitment-guard
//!
//! Tamper-resistant app blocking with a timed commitment lock.
//!
//! A user picks apps to block and may start a *commitment*: a deadline before
//! which blocking cannot be turned off, the guard cannot be uninstalled, and
//! clearing the guard's storage does not help. Window events from the host's
//! event-observation layer are classified on the caller's thread; blocked
//! apps and circumvention attempts on system surfaces (settings, installer,
//! launcher, store) are answered with a redirect to the home screen.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use commitment_guard::{CommitmentGuard, GuardConfig, WindowEvent};
//! # use commitment_guard::infrastructure::mocks::MockPlatform;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # let platform = Arc::new(MockPlatform::new());
//! let config = GuardConfig::default().with_data_dir(Path::new("/var/lib/guard"));
//!
//! let guard = CommitmentGuard::builder()
//!     .with_config(config)
//!     .with_platform(platform) // your PlatformCapabilities implementation
//!     .build()
//!     .unwrap();
//!
//! // Restore state, then start handling events
//! guard.cold_start();
//! guard.add_blocked_app("com.example.game", 1_900_000_000_000).unwrap();
//! guard.start_commitment(24);
//!
//! let verdict = guard.on_event(&WindowEvent::state_changed("com.example.game"));
//! ```
//!
//! ## The Commitment Lock
//!
//! [`CommitmentGuard::start_commitment`] writes the deadline, the owner
//! fingerprint of this device and a sealed backup blob in one atomic store
//! write, then copies the blob to a secondary file and blocks uninstalling
//! the host. The deadline only moves forward:
//!
//! - A new commitment may extend an active one but never shorten it
//! - Only the sentinel's expiry check clears a lock, and only after the
//!   deadline has passed
//! - A backup that fails to decrypt, names another device or has expired is
//!   treated as absent; it never activates a lock
//!
//! Wiping the primary storage is undone on the next start: the state machine
//! recovers the deadline from the stored blob or the secondary file.
//!
//! ## Event Classification
//!
//! Each event passes, in order: a type filter, a fixed-window rate limiter
//! (10 events per 50 ms bucket by default), a re-entrancy guard, and the
//! surface heuristics. Authentication screens are never blocked. A detected
//! uninstall or force-stop attempt arms a *sticky protection* window during
//! which every event on a monitored surface is redirected:
//!
//! ```rust
//! # use commitment_guard::infrastructure::mocks::MockPlatform;
//! # use commitment_guard::{CommitmentGuard, EventKind, Verdict, WindowEvent};
//! # use std::sync::Arc;
//! # let guard = CommitmentGuard::builder()
//! #     .with_platform(Arc::new(MockPlatform::new()))
//! #     .build()
//! #     .unwrap();
//! guard
//!     .add_blocked_app_labeled("com.example.game", "Example Game", u64::MAX)
//!     .unwrap();
//!
//! let attempt = WindowEvent::new(
//!     EventKind::WindowContentChanged,
//!     "com.android.settings",
//!     "com.android.settings.applications.InstalledAppDetails",
//!     "Example Game  Uninstall  Force stop",
//! );
//! assert!(guard.on_event(&attempt).is_intervention());
//!
//! // No keywords at all, still redirected while the window is open
//! let follow_up = WindowEvent::new(
//!     EventKind::WindowContentChanged,
//!     "com.android.settings",
//!     "android.widget.FrameLayout",
//!     "Storage",
//! );
//! assert!(matches!(
//!     guard.on_event(&follow_up),
//!     Verdict::Intervene { .. }
//! ));
//! ```
//!
//! Dropped events are counted, never queued: the event path favors liveness
//! over completeness.
//!
//! ## Bypass Sentinel
//!
//! A periodic loop samples advisory signals (clock jumps, fingerprint
//! mismatch, battery optimization, root, emulator, debuggable build, hook
//! frameworks) and logs each one at `warn` when it first appears. Only a
//! revoked event-observation capability during an active block interrupts
//! the user, subject to a cooldown. The same loop clears expired
//! commitments and prunes expired blocking sessions. A panic inside one
//! cycle is caught so the next cycle still runs.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use commitment_guard::infrastructure::mocks::MockPlatform;
//! # use commitment_guard::CommitmentGuard;
//! # use std::sync::Arc;
//! # let guard = CommitmentGuard::builder()
//! #     .with_platform(Arc::new(MockPlatform::new()))
//! #     .build()
//! #     .unwrap();
//! let metrics = guard.metrics();
//! println!("Events seen: {}", metrics.events_seen());
//! println!("Interventions: {}", metrics.interventions());
//!
//! let snapshot = metrics.snapshot();
//! println!("Drop rate: {:.2}%", snapshot.drop_rate() * 100.0);
//! ```
//!
//! ## Engine Lifecycle
//!
//! With the `async` feature (enabled by default), the guard can run its own
//! classification task and sentinel loop on a tokio runtime. Events published
//! with [`CommitmentGuard::publish`] go through a single-slot feed: the
//! producer never waits and only the newest pending event is kept.
//!
//! ```rust,no_run
//! # use commitment_guard::infrastructure::mocks::MockPlatform;
//! # use commitment_guard::{CommitmentGuard, WindowEvent};
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() {
//! # let guard = CommitmentGuard::builder()
//! #     .with_platform(Arc::new(MockPlatform::new()))
//! #     .build()
//! #     .unwrap();
//! let report = guard.start_engine();
//! println!("restored {} blocked apps", report.rehydrated);
//!
//! guard.publish(WindowEvent::state_changed("com.example.game"));
//!
//! // Idempotent; also runs when the guard is dropped
//! guard.stop_engine();
//! # }
//! ```
//!
//! ## Fail-Safe Operation
//!
//! Nothing in the guard is fatal to the host process. Platform failures are
//! logged and treated as no-ops, persistence failures are logged and
//! reported to the caller, and a failed start leaves nothing active.

// Domain layer - pure types and rules
pub mod domain;

// Application layer - orchestration and ports
pub mod application;

// Infrastructure layer - adapters and the public facade
pub mod infrastructure;

pub use domain::{
    event::{EventKind, WindowEvent},
    heuristics::{KeywordRules, Surface, SurfaceMatcher},
    lock::{CommitmentLock, CommitmentStatus, FingerprintCheck, LockState},
    signal::BypassSignal,
    sticky::StickyProtectionWindow,
};

pub use application::{
    classifier::{ClassifierConfig, DropReason, Verdict},
    commitment::{
        BackupSource, CommitmentError, CommitmentStateMachine, RecoveryOutcome, RejectReason,
    },
    metrics::{Metrics, MetricsSnapshot},
    ports::{
        BackupError, CapabilityStatus, Clock, DeviceIdentity, DeviceProbe, GuardListener,
        LockStore, NoopListener, PlatformCapabilities, PlatformError, SealError, Sealer,
        SecondaryBackup, StoreError,
    },
    reactor::InterventionReason,
    sentinel::{SentinelConfig, SentinelConfigError, SentinelReport},
    supervisor::{ColdStartReport, PackageReplaced},
};

#[cfg(feature = "async")]
pub use application::{
    feed::EventFeed,
    sentinel::{SentinelHandle, ShutdownError},
    supervisor::EngineHandle,
};

pub use infrastructure::{
    backup::FileBackup,
    clock::SystemClock,
    config::{ConfigError, GuardConfig},
    crypto::AesGcmSealer,
    guard::{BuildError, CommitmentGuard, CommitmentGuardBuilder},
    identity::HostIdentity,
    probe::HostProbe,
    storage::{JsonFileLockStore, MemoryLockStore},
};

#[cfg(feature = "async")]
pub use infrastructure::notifier::{ChannelListener, GuardNotification};
