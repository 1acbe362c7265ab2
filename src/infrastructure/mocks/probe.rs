//! Scripted device probe and fixed identity.

use crate::application::ports::{DeviceIdentity, DeviceProbe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Probe whose answers are set by the test.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    rooted: Arc<AtomicBool>,
    emulator: Arc<AtomicBool>,
    debuggable: Arc<AtomicBool>,
    hooks: Arc<Mutex<Vec<String>>>,
    panic_next: Arc<AtomicBool>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rooted(&self, rooted: bool) {
        self.rooted.store(rooted, Ordering::Release);
    }

    pub fn set_emulator(&self, emulator: bool) {
        self.emulator.store(emulator, Ordering::Release);
    }

    pub fn set_debuggable(&self, debuggable: bool) {
        self.debuggable.store(debuggable, Ordering::Release);
    }

    pub fn add_hook_framework(&self, name: &str) {
        self.hooks
            .lock()
            .expect("MockProbe mutex poisoned - a test thread panicked while holding the lock")
            .push(name.to_string());
    }

    /// Make the next `is_rooted` call panic.
    pub fn panic_next(&self) {
        self.panic_next.store(true, Ordering::Release);
    }
}

impl DeviceProbe for MockProbe {
    fn is_rooted(&self) -> bool {
        if self.panic_next.swap(false, Ordering::AcqRel) {
            panic!("probe failure requested by test");
        }
        self.rooted.load(Ordering::Acquire)
    }

    fn is_emulator(&self) -> bool {
        self.emulator.load(Ordering::Acquire)
    }

    fn is_debuggable(&self) -> bool {
        self.debuggable.load(Ordering::Acquire)
    }

    fn hook_frameworks(&self) -> Vec<String> {
        self.hooks
            .lock()
            .expect("MockProbe mutex poisoned - a test thread panicked while holding the lock")
            .clone()
    }
}

/// Identity with a fixed fingerprint.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    fingerprint: String,
}

impl StaticIdentity {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
        }
    }
}

impl DeviceIdentity for StaticIdentity {
    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}
