//! Recording listener.

use crate::application::ports::GuardListener;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Recorded {
    launches: Vec<String>,
    limited_launches: Vec<String>,
    reinstalls: Vec<(String, bool, u64)>,
}

/// Listener that keeps every notification for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<String> {
        self.lock().launches.clone()
    }

    pub fn limited_launches(&self) -> Vec<String> {
        self.lock().limited_launches.clone()
    }

    /// `(package, was_blocked, remaining_minutes)` per reinstall.
    pub fn reinstalls(&self) -> Vec<(String, bool, u64)> {
        self.lock().reinstalls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .expect("RecordingListener mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl GuardListener for RecordingListener {
    fn on_app_launched(&self, package: &str) {
        self.lock().launches.push(package.to_string());
    }

    fn on_limited_app_launched(&self, package: &str) {
        self.lock().limited_launches.push(package.to_string());
    }

    fn on_package_reinstalled(&self, package: &str, was_blocked: bool, remaining_minutes: u64) {
        self.lock()
            .reinstalls
            .push((package.to_string(), was_blocked, remaining_minutes));
    }
}
