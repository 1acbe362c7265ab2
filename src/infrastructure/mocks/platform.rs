//! Recording platform capability provider.

use crate::application::ports::{CapabilityStatus, PlatformCapabilities, PlatformError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A call received by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    SetUninstallBlocked { app_id: String, blocked: bool },
    RequestBatteryExemption,
    NavigateHome,
    GoBack,
    SurfaceAlert(String),
    StopProtectionServices,
}

/// Platform double that records every call in order.
///
/// Calls are recorded even when the mock is told to fail, so tests can
/// assert that a failing action was attempted.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    status: Arc<Mutex<CapabilityStatus>>,
    fail: Arc<AtomicBool>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every action return an error.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    /// Status returned by `capability_status`.
    pub fn set_status(&self, status: CapabilityStatus) {
        *self
            .status
            .lock()
            .expect("MockPlatform mutex poisoned - a test thread panicked while holding the lock") =
            status;
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.recorded().clone()
    }

    pub fn clear_calls(&self) {
        self.recorded().clear();
    }

    /// Last uninstall-block state requested for `app_id`, if any.
    pub fn uninstall_blocked(&self, app_id: &str) -> Option<bool> {
        self.recorded().iter().rev().find_map(|call| match call {
            PlatformCall::SetUninstallBlocked {
                app_id: id,
                blocked,
            } if id == app_id => Some(*blocked),
            _ => None,
        })
    }

    pub fn navigate_home_count(&self) -> usize {
        self.count(|call| matches!(call, PlatformCall::NavigateHome))
    }

    pub fn stop_services_count(&self) -> usize {
        self.count(|call| matches!(call, PlatformCall::StopProtectionServices))
    }

    pub fn alerts(&self) -> Vec<String> {
        self.recorded()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SurfaceAlert(reason) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.recorded().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: PlatformCall) -> Result<(), PlatformError> {
        self.recorded().push(call);
        if self.fail.load(Ordering::Acquire) {
            Err(PlatformError::Failed("mock failure".to_string()))
        } else {
            Ok(())
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Vec<PlatformCall>> {
        self.calls
            .lock()
            .expect("MockPlatform mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl PlatformCapabilities for MockPlatform {
    fn set_uninstall_blocked(&self, app_id: &str, blocked: bool) -> Result<(), PlatformError> {
        self.record(PlatformCall::SetUninstallBlocked {
            app_id: app_id.to_string(),
            blocked,
        })
    }

    fn request_battery_exemption(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::RequestBatteryExemption)
    }

    fn navigate_home(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::NavigateHome)
    }

    fn go_back(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::GoBack)
    }

    fn surface_alert(&self, reason: &str) -> Result<(), PlatformError> {
        self.record(PlatformCall::SurfaceAlert(reason.to_string()))
    }

    fn stop_protection_services(&self) -> Result<(), PlatformError> {
        self.record(PlatformCall::StopProtectionServices)
    }

    fn capability_status(&self) -> CapabilityStatus {
        *self
            .status
            .lock()
            .expect("MockPlatform mutex poisoned - a test thread panicked while holding the lock")
    }
}
