//! Advisory bypass signals raised by the sentinel.

use serde::Serialize;
use std::fmt;

/// A single observation that the block may be under attack or degraded.
///
/// Signals are advisory: they are logged and may trigger a remedial action,
/// but only [`BypassSignal::ObservationRevoked`] may interrupt the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BypassSignal {
    /// Wall clock moved by a different amount than monotonic time.
    ClockJump { skew_millis: i64 },
    /// Stored owner fingerprint does not match this device.
    FingerprintMismatch,
    BatteryOptimized,
    NotificationsDenied,
    SecondaryUser,
    Rooted,
    Emulator,
    Debuggable,
    HookFramework { name: String },
    /// The event-observation capability was revoked while a block is active.
    ObservationRevoked,
}

impl BypassSignal {
    /// The one signal allowed to surface UI to the user.
    pub fn is_critical(&self) -> bool {
        matches!(self, BypassSignal::ObservationRevoked)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BypassSignal::ClockJump { .. } => "clock_jump",
            BypassSignal::FingerprintMismatch => "fingerprint_mismatch",
            BypassSignal::BatteryOptimized => "battery_optimized",
            BypassSignal::NotificationsDenied => "notifications_denied",
            BypassSignal::SecondaryUser => "secondary_user",
            BypassSignal::Rooted => "rooted",
            BypassSignal::Emulator => "emulator",
            BypassSignal::Debuggable => "debuggable",
            BypassSignal::HookFramework { .. } => "hook_framework",
            BypassSignal::ObservationRevoked => "observation_revoked",
        }
    }
}

impl fmt::Display for BypassSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BypassSignal::ClockJump { skew_millis } => {
                write!(f, "clock_jump (skew {}ms)", skew_millis)
            }
            BypassSignal::HookFramework { name } => write!(f, "hook_framework ({})", name),
            other => f.write_str(other.name()),
        }
    }
}
