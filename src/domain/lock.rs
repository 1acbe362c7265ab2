//! Commitment lock record and lifecycle states.
//!
//! A commitment lock binds a wall-clock deadline to the device that created
//! it. The deadline only moves through an explicit start; every other
//! operation either leaves it untouched or clears it after it has passed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Duration used when a commitment is started with zero hours.
///
/// Zero is reserved for testing and maps to five minutes, never to an
/// already-expired lock.
pub const TEST_DURATION_MILLIS: u64 = 5 * 60 * 1000;

const MILLIS_PER_HOUR: u64 = 60 * 60 * 1000;

/// Convert a requested duration in hours into milliseconds.
pub fn duration_millis_for_hours(hours: u32) -> u64 {
    if hours == 0 {
        TEST_DURATION_MILLIS
    } else {
        u64::from(hours).saturating_mul(MILLIS_PER_HOUR)
    }
}

/// Durable commitment lock as written to the primary lock store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentLock {
    /// Wall-clock deadline in milliseconds since the Unix epoch.
    pub end_time_millis: u64,
    /// Fingerprint of the device that started the commitment.
    pub owner_fingerprint: String,
    /// `base64(iv || ciphertext)` of the [`BackupPayload`].
    pub encrypted_backup: String,
}

impl CommitmentLock {
    /// Whether the deadline is still in the future at `now_millis`.
    pub fn is_active_at(&self, now_millis: u64) -> bool {
        self.end_time_millis > now_millis
    }

    /// Milliseconds left until the deadline, zero once it has passed.
    pub fn remaining_at(&self, now_millis: u64) -> u64 {
        self.end_time_millis.saturating_sub(now_millis)
    }
}

impl fmt::Debug for CommitmentLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitmentLock")
            .field("end_time_millis", &self.end_time_millis)
            .field("owner_fingerprint", &self.owner_fingerprint)
            .field("encrypted_backup", &format_args!("<{} bytes>", self.encrypted_backup.len()))
            .finish()
    }
}

/// Plaintext sealed into the encrypted backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPayload {
    pub end_time_millis: u64,
    pub owner_fingerprint: String,
}

impl BackupPayload {
    pub fn new(end_time_millis: u64, owner_fingerprint: impl Into<String>) -> Self {
        Self {
            end_time_millis,
            owner_fingerprint: owner_fingerprint.into(),
        }
    }

    /// Encode as `"<end_time_millis>:<owner_fingerprint>"`.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}:{}", self.end_time_millis, self.owner_fingerprint).into_bytes()
    }

    /// Decode a plaintext produced by [`BackupPayload::encode`].
    ///
    /// Returns `None` for anything malformed; a malformed backup is treated
    /// the same as a missing one.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let (end, fingerprint) = text.split_once(':')?;
        let end_time_millis = end.parse::<u64>().ok()?;
        if end_time_millis == 0 || fingerprint.is_empty() {
            return None;
        }
        Some(Self::new(end_time_millis, fingerprint))
    }
}

/// Lifecycle state of the commitment.
///
/// `Inactive -> Active -> (Expired | Tampered) -> Inactive`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock recorded.
    Inactive,
    /// Deadline in the future and fingerprint matches this device.
    Active,
    /// Deadline has passed; awaiting `clear_if_expired`.
    Expired,
    /// Deadline in the future but the stored fingerprint belongs to another device.
    Tampered,
}

impl LockState {
    /// Whether enforcement is mandatory in this state.
    ///
    /// A tampered lock keeps enforcing: tamper evidence is advisory and never
    /// revokes the commitment on its own.
    pub fn enforces(&self) -> bool {
        matches!(self, LockState::Active | LockState::Tampered)
    }
}

/// Snapshot returned to the configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitmentStatus {
    pub active: bool,
    pub end_time_millis: u64,
    pub remaining_millis: u64,
}

impl CommitmentStatus {
    pub fn inactive() -> Self {
        Self {
            active: false,
            end_time_millis: 0,
            remaining_millis: 0,
        }
    }

    pub fn at(end_time_millis: u64, now_millis: u64) -> Self {
        let remaining_millis = end_time_millis.saturating_sub(now_millis);
        Self {
            active: remaining_millis > 0,
            end_time_millis,
            remaining_millis,
        }
    }
}

/// Result of comparing the stored owner fingerprint with this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintCheck {
    NoLock,
    Match,
    Mismatch { stored: String, current: String },
}
