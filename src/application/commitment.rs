//! Commitment state machine.
//!
//! Owns the lock lifecycle: start, query, validate, recover and expire. The
//! deadline is cached in an atomic so `is_active` can be called from any
//! thread without touching storage.
//!
//! Only the sentinel loop calls [`CommitmentStateMachine::clear_if_expired`],
//! so the `Active -> Inactive` transition has a single writer.

use crate::application::ports::{
    Clock, DeviceIdentity, LockStore, PlatformCapabilities, SealError, Sealer, SecondaryBackup,
    StoreError,
};
use crate::domain::lock::{
    duration_millis_for_hours, BackupPayload, CommitmentLock, CommitmentStatus, FingerprintCheck,
    LockState,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors returned by [`CommitmentStateMachine::start`].
#[derive(Debug, Error)]
pub enum CommitmentError {
    #[error("failed to seal commitment backup: {0}")]
    Seal(#[from] SealError),
    #[error("failed to persist commitment: {0}")]
    Store(#[from] StoreError),
    /// An active commitment may only be kept or extended.
    #[error("an active commitment ends at {current_end_millis}; a new one may not end earlier ({requested_end_millis})")]
    WouldShorten {
        current_end_millis: u64,
        requested_end_millis: u64,
    },
}

/// Which copy a recovered deadline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupSource {
    /// Encrypted blob stored next to the primary record
    PrimaryBlob,
    /// File at the secondary location
    SecondaryFile,
}

/// Why a backup was not restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Expired,
    ForeignDevice,
}

/// Outcome of [`CommitmentStateMachine::recover_from_backup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Primary record present and still in the future; nothing to do.
    PrimaryIntact { end_time_millis: u64 },
    /// Primary record was missing or expired and a backup restored it.
    Restored {
        end_time_millis: u64,
        source: BackupSource,
    },
    /// A backup decrypted but was not eligible for restore.
    Rejected(RejectReason),
    /// No copy could be read or decrypted.
    NoBackup,
}

impl RecoveryOutcome {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::PrimaryIntact { .. } | RecoveryOutcome::Restored { .. }
        )
    }
}

/// Persistent, time-bound commitment lock.
#[derive(Debug)]
pub struct CommitmentStateMachine {
    store: Arc<dyn LockStore>,
    backup: Arc<dyn SecondaryBackup>,
    sealer: Arc<dyn Sealer>,
    identity: Arc<dyn DeviceIdentity>,
    platform: Arc<dyn PlatformCapabilities>,
    clock: Arc<dyn Clock>,
    host_app_id: String,
    /// Cached deadline, zero when no lock is known
    end_time_millis: AtomicU64,
}

impl CommitmentStateMachine {
    /// Create the state machine and immediately run backup recovery.
    pub fn new(
        store: Arc<dyn LockStore>,
        backup: Arc<dyn SecondaryBackup>,
        sealer: Arc<dyn Sealer>,
        identity: Arc<dyn DeviceIdentity>,
        platform: Arc<dyn PlatformCapabilities>,
        clock: Arc<dyn Clock>,
        host_app_id: impl Into<String>,
    ) -> Self {
        let machine = Self {
            store,
            backup,
            sealer,
            identity,
            platform,
            clock,
            host_app_id: host_app_id.into(),
            end_time_millis: AtomicU64::new(0),
        };
        let outcome = machine.recover_from_backup();
        debug!(?outcome, "commitment recovery at construction");
        machine
    }

    /// Start (or extend) a commitment lasting `duration_hours`.
    ///
    /// Zero hours is the reserved test duration of five minutes. The primary
    /// record and its encrypted blob are written in one atomic store write;
    /// the secondary copy and the uninstall block follow and are best-effort.
    /// On any error nothing new is left active.
    pub fn start(&self, duration_hours: u32) -> Result<u64, CommitmentError> {
        let now = self.clock.wall_millis();
        let end_time_millis = now.saturating_add(duration_millis_for_hours(duration_hours));

        let current = self.end_time_millis.load(Ordering::Acquire);
        if current > now && end_time_millis < current {
            warn!(
                current_end_millis = current,
                requested_end_millis = end_time_millis,
                "refusing to shorten an active commitment"
            );
            return Err(CommitmentError::WouldShorten {
                current_end_millis: current,
                requested_end_millis: end_time_millis,
            });
        }

        let owner_fingerprint = self.identity.fingerprint();
        let payload = BackupPayload::new(end_time_millis, owner_fingerprint.clone());
        let sealed = self.sealer.seal(&payload.encode())?;
        let encoded = BASE64.encode(sealed);

        let lock = CommitmentLock {
            end_time_millis,
            owner_fingerprint,
            encrypted_backup: encoded.clone(),
        };
        if let Err(e) = self.store.save_lock(&lock) {
            error!(error = %e, "failed to persist commitment lock");
            return Err(e.into());
        }

        if let Err(e) = self.backup.write(&encoded) {
            warn!(error = %e, "failed to write secondary commitment backup");
        }

        self.end_time_millis.store(end_time_millis, Ordering::Release);
        self.apply_uninstall_block(true);

        info!(
            end_time_ms = end_time_millis,
            duration_hours, "commitment started"
        );
        Ok(end_time_millis)
    }

    /// Whether the deadline is in the future. Pure; callable from any thread.
    pub fn is_active(&self) -> bool {
        self.end_time_millis.load(Ordering::Acquire) > self.clock.wall_millis()
    }

    /// Cached deadline in wall-clock milliseconds, zero when no lock is known.
    pub fn end_time_millis(&self) -> u64 {
        self.end_time_millis.load(Ordering::Acquire)
    }

    pub fn status(&self) -> CommitmentStatus {
        match self.end_time_millis.load(Ordering::Acquire) {
            0 => CommitmentStatus::inactive(),
            end => CommitmentStatus::at(end, self.clock.wall_millis()),
        }
    }

    /// Compare the stored owner fingerprint with this device.
    ///
    /// A mismatch is tamper evidence for the sentinel; it never revokes the lock.
    pub fn validate(&self) -> FingerprintCheck {
        let stored = match self.store.load_lock() {
            Ok(Some(lock)) => lock.owner_fingerprint,
            Ok(None) => return FingerprintCheck::NoLock,
            Err(e) => {
                warn!(error = %e, "could not read commitment lock for validation");
                return FingerprintCheck::NoLock;
            }
        };

        let current = self.identity.fingerprint();
        if stored == current {
            FingerprintCheck::Match
        } else {
            warn!("commitment owner fingerprint does not match this device");
            FingerprintCheck::Mismatch { stored, current }
        }
    }

    pub fn state(&self) -> LockState {
        let end = self.end_time_millis.load(Ordering::Acquire);
        if end == 0 {
            return LockState::Inactive;
        }
        if end <= self.clock.wall_millis() {
            return LockState::Expired;
        }
        match self.validate() {
            FingerprintCheck::Mismatch { .. } => LockState::Tampered,
            FingerprintCheck::Match | FingerprintCheck::NoLock => LockState::Active,
        }
    }

    /// Restore the lock from a backup copy if the primary record is gone.
    ///
    /// Each available copy is tried once, primary blob first. A copy is
    /// restored only if it decrypts, its deadline is still in the future and
    /// its fingerprint matches this device. Anything that fails to decrypt
    /// counts as absent. An intact primary record re-creates a missing
    /// secondary copy. An expired copy owned by this device leaves its
    /// deadline cached so the next [`Self::clear_if_expired`] removes it.
    pub fn recover_from_backup(&self) -> RecoveryOutcome {
        let now = self.clock.wall_millis();

        let primary = match self.store.load_lock() {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "primary commitment record unreadable, trying backups");
                None
            }
        };

        if let Some(lock) = &primary {
            if lock.is_active_at(now) {
                self.end_time_millis
                    .store(lock.end_time_millis, Ordering::Release);
                if !lock.encrypted_backup.is_empty() && !self.backup.exists() {
                    match self.backup.write(&lock.encrypted_backup) {
                        Ok(()) => info!("secondary commitment backup re-created"),
                        Err(e) => {
                            warn!(error = %e, "failed to re-create secondary commitment backup")
                        }
                    }
                }
                return RecoveryOutcome::PrimaryIntact {
                    end_time_millis: lock.end_time_millis,
                };
            }
            // Keep the expired deadline visible so clear_if_expired can finish the transition
            self.end_time_millis
                .store(lock.end_time_millis, Ordering::Release);
        }

        let mut candidates: Vec<(BackupSource, String)> = Vec::with_capacity(2);
        if let Some(lock) = &primary {
            if !lock.encrypted_backup.is_empty() {
                candidates.push((BackupSource::PrimaryBlob, lock.encrypted_backup.clone()));
            }
        }
        match self.backup.read() {
            Ok(Some(encoded)) => candidates.push((BackupSource::SecondaryFile, encoded)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "secondary commitment backup unreadable"),
        }

        let current_fingerprint = self.identity.fingerprint();
        let mut rejection = None;

        for (source, encoded) in candidates {
            let Some(payload) = self.open_backup(&encoded) else {
                debug!(?source, "commitment backup failed to decrypt, treating as absent");
                continue;
            };

            if payload.owner_fingerprint != current_fingerprint {
                warn!(?source, "commitment backup belongs to another device");
                rejection = Some(RejectReason::ForeignDevice);
                continue;
            }
            if payload.end_time_millis <= now {
                // Leave the deadline for clear_if_expired to finish the transition
                self.end_time_millis
                    .fetch_max(payload.end_time_millis, Ordering::AcqRel);
                rejection.get_or_insert(RejectReason::Expired);
                continue;
            }

            let lock = CommitmentLock {
                end_time_millis: payload.end_time_millis,
                owner_fingerprint: payload.owner_fingerprint,
                encrypted_backup: encoded.clone(),
            };
            if let Err(e) = self.store.save_lock(&lock) {
                error!(error = %e, "failed to rewrite primary record from backup");
            }
            if source == BackupSource::PrimaryBlob || !self.backup.exists() {
                if let Err(e) = self.backup.write(&encoded) {
                    warn!(error = %e, "failed to rewrite secondary commitment backup");
                }
            }

            self.end_time_millis
                .store(lock.end_time_millis, Ordering::Release);
            self.apply_uninstall_block(true);
            info!(
                end_time_ms = lock.end_time_millis,
                ?source,
                "commitment restored from backup"
            );
            return RecoveryOutcome::Restored {
                end_time_millis: lock.end_time_millis,
                source,
            };
        }

        match rejection {
            Some(reason) => RecoveryOutcome::Rejected(reason),
            None => RecoveryOutcome::NoBackup,
        }
    }

    /// Finish an expired commitment.
    ///
    /// Only transitions when the deadline has passed: removes the uninstall
    /// block, tears down dependent services and deletes both copies.
    /// Returns `true` if this call performed the transition; a second call
    /// is a no-op.
    pub fn clear_if_expired(&self) -> bool {
        let now = self.clock.wall_millis();
        let mut end = self.end_time_millis.load(Ordering::Acquire);

        if end == 0 {
            // Cache may be cold; a stale record or backup still needs clearing
            end = match self.persisted_deadline() {
                Some(end) => end,
                None => return false,
            };
        }
        if end > now {
            return false;
        }

        // An expired record is never restored, so a failed clear must not
        // keep the uninstall block in place
        if let Err(e) = self.store.clear_lock() {
            error!(error = %e, "failed to clear expired commitment record");
        }
        if let Err(e) = self.backup.delete() {
            warn!(error = %e, "failed to delete secondary commitment backup");
        }
        self.end_time_millis.store(0, Ordering::Release);

        self.apply_uninstall_block(false);
        if let Err(e) = self.platform.stop_protection_services() {
            warn!(error = %e, "failed to stop protection services");
        }

        info!(end_time_ms = end, "commitment expired and cleared");
        true
    }

    /// Whether durable storage holds a deadline that is still in the future.
    ///
    /// An unexpired primary record counts whatever its fingerprint; a backup
    /// copy counts only if it opens and belongs to this device.
    pub fn has_lock_evidence(&self) -> bool {
        let now = self.clock.wall_millis();
        if let Ok(Some(lock)) = self.store.load_lock() {
            if lock.is_active_at(now) {
                return true;
            }
        }
        self.own_backup_deadline().is_some_and(|end| end > now)
    }

    /// Re-request the uninstall block for the host application.
    pub fn reapply_uninstall_block(&self) {
        self.apply_uninstall_block(true);
    }

    pub fn host_app_id(&self) -> &str {
        &self.host_app_id
    }

    fn apply_uninstall_block(&self, blocked: bool) {
        if let Err(e) = self.platform.set_uninstall_blocked(&self.host_app_id, blocked) {
            warn!(error = %e, blocked, "failed to change uninstall block");
        }
    }

    /// Deadline from the primary record, else from this device's backup copy.
    fn persisted_deadline(&self) -> Option<u64> {
        match self.store.load_lock() {
            Ok(Some(lock)) => Some(lock.end_time_millis),
            Ok(None) => self.own_backup_deadline(),
            Err(e) => {
                debug!(error = %e, "primary record unreadable, checking backup deadline");
                self.own_backup_deadline()
            }
        }
    }

    fn own_backup_deadline(&self) -> Option<u64> {
        let encoded = self.backup.read().ok().flatten()?;
        let payload = self.open_backup(&encoded)?;
        (payload.owner_fingerprint == self.identity.fingerprint())
            .then_some(payload.end_time_millis)
    }

    fn open_backup(&self, encoded: &str) -> Option<BackupPayload> {
        let sealed = BASE64.decode(encoded.trim().as_bytes()).ok()?;
        let plaintext = self.sealer.open(&sealed).ok()?;
        BackupPayload::decode(&plaintext)
    }
}
