//! Channel-backed listener.
//!
//! Notifications are produced on the event-observation path and must never
//! block it. [`ChannelListener`] pushes them into an unbounded channel that
//! the UI-owning context drains at its own pace.

use crate::application::ports::GuardListener;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// A notification for the configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardNotification {
    AppLaunched {
        package: String,
    },
    LimitedAppLaunched {
        package: String,
    },
    PackageReinstalled {
        package: String,
        was_blocked: bool,
        remaining_minutes: u64,
    },
}

#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<GuardNotification>,
}

impl ChannelListener {
    /// Create a listener and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GuardNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: GuardNotification) {
        // Fire-and-forget: a closed receiver just means nobody is listening
        if self.tx.send(notification).is_err() {
            debug!("notification dropped, receiver closed");
        }
    }
}

impl GuardListener for ChannelListener {
    fn on_app_launched(&self, package: &str) {
        self.send(GuardNotification::AppLaunched {
            package: package.to_string(),
        });
    }

    fn on_limited_app_launched(&self, package: &str) {
        self.send(GuardNotification::LimitedAppLaunched {
            package: package.to_string(),
        });
    }

    fn on_package_reinstalled(&self, package: &str, was_blocked: bool, remaining_minutes: u64) {
        self.send(GuardNotification::PackageReinstalled {
            package: package.to_string(),
            was_blocked,
            remaining_minutes,
        });
    }
}
