//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports; test doubles
//! live in `crate::infrastructure::mocks`.

use crate::domain::lock::CommitmentLock;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Instant;
use thiserror::Error;

/// Port for obtaining current time.
///
/// Two readings are needed: a monotonic instant for rate limiting and jump
/// detection, and a wall-clock reading for deadlines that must survive
/// process restarts.
pub trait Clock: Send + Sync + Debug {
    /// Get the current monotonic instant.
    fn now(&self) -> Instant;

    /// Get the current wall-clock time in milliseconds since the Unix epoch.
    fn wall_millis(&self) -> u64;
}

/// Errors raised by durable storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Port for the primary durable key/value storage.
///
/// Holds two keyed maps: the commitment lock and the blocking sessions
/// (`package -> end_time_millis`). Every write must be atomic from the
/// caller's point of view.
pub trait LockStore: Send + Sync + Debug {
    fn load_lock(&self) -> Result<Option<CommitmentLock>, StoreError>;

    fn save_lock(&self, lock: &CommitmentLock) -> Result<(), StoreError>;

    fn clear_lock(&self) -> Result<(), StoreError>;

    fn blocked_sessions(&self) -> Result<BTreeMap<String, u64>, StoreError>;

    fn put_blocked_session(&self, package: &str, end_time_millis: u64) -> Result<(), StoreError>;

    fn remove_blocked_session(&self, package: &str) -> Result<(), StoreError>;
}

/// Errors raised by the secondary backup location.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("secondary backup io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the secondary backup copy kept outside the primary store.
///
/// Content format is `base64(iv[12] || ciphertext)`.
pub trait SecondaryBackup: Send + Sync + Debug {
    fn read(&self) -> Result<Option<String>, BackupError>;

    fn write(&self, encoded: &str) -> Result<(), BackupError>;

    fn delete(&self) -> Result<(), BackupError>;

    fn exists(&self) -> bool {
        matches!(self.read(), Ok(Some(_)))
    }
}

/// Errors raised while sealing or opening a backup.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("sealing key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("encryption failed")]
    Encrypt,
    /// Corrupt, truncated or foreign ciphertext. Always treated as "no backup".
    #[error("backup failed integrity check")]
    Integrity,
}

/// Port for authenticated symmetric encryption with a locally sealed key.
///
/// `seal` returns `iv || ciphertext` with a fresh random iv per call.
/// The key never leaves the implementation.
pub trait Sealer: Send + Sync + Debug {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError>;

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError>;
}

/// Port for the device-derived owner fingerprint.
pub trait DeviceIdentity: Send + Sync + Debug {
    fn fingerprint(&self) -> String;
}

/// Errors raised by the platform capability provider.
///
/// All of these are transient: callers log them and continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("capability not granted: {0}")]
    NotGranted(&'static str),
    #[error("action could not be resolved: {0}")]
    Unresolved(String),
    #[error("platform call failed: {0}")]
    Failed(String),
}

/// Current state of host-level capabilities polled by the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityStatus {
    pub battery_exempt: bool,
    pub notifications_permitted: bool,
    pub secondary_user: bool,
    pub observation_enabled: bool,
}

impl Default for CapabilityStatus {
    fn default() -> Self {
        Self {
            battery_exempt: true,
            notifications_permitted: true,
            secondary_user: false,
            observation_enabled: true,
        }
    }
}

/// Port for the host platform's capabilities and actions.
///
/// Every call is best-effort. Failures are caught and logged by the caller
/// and never treated as fatal.
pub trait PlatformCapabilities: Send + Sync + Debug {
    fn set_uninstall_blocked(&self, app_id: &str, blocked: bool) -> Result<(), PlatformError>;

    fn request_battery_exemption(&self) -> Result<(), PlatformError>;

    fn navigate_home(&self) -> Result<(), PlatformError>;

    fn go_back(&self) -> Result<(), PlatformError>;

    /// Interrupt the user with the host application's own alert.
    ///
    /// Only used when event observation is revoked during an active block.
    fn surface_alert(&self, reason: &str) -> Result<(), PlatformError>;

    /// Tear down services that only exist while a commitment is active.
    fn stop_protection_services(&self) -> Result<(), PlatformError>;

    fn capability_status(&self) -> CapabilityStatus;
}

/// Port for read-only device integrity probes.
pub trait DeviceProbe: Send + Sync + Debug {
    fn is_rooted(&self) -> bool;

    fn is_emulator(&self) -> bool;

    fn is_debuggable(&self) -> bool;

    /// Names of hook frameworks whose markers are present.
    fn hook_frameworks(&self) -> Vec<String>;
}

/// Port for notifications sent back to the configuration layer.
///
/// Fire-and-forget: implementations must not block and no acknowledgement
/// is expected.
pub trait GuardListener: Send + Sync + Debug {
    fn on_app_launched(&self, package: &str);

    fn on_limited_app_launched(&self, package: &str);

    fn on_package_reinstalled(&self, package: &str, was_blocked: bool, remaining_minutes: u64);
}

/// Listener that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl GuardListener for NoopListener {
    fn on_app_launched(&self, _package: &str) {}

    fn on_limited_app_launched(&self, _package: &str) {}

    fn on_package_reinstalled(&self, _package: &str, _was_blocked: bool, _remaining_minutes: u64) {}
}
