//! Basic example: block an app, start a short commitment and feed events.
//!
//! Run with `RUST_LOG=commitment_guard=debug cargo run --example basic` to
//! see every decision the guard makes.

use commitment_guard::{
    CapabilityStatus, ChannelListener, CommitmentGuard, EventKind, GuardConfig,
    PlatformCapabilities, PlatformError, WindowEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Platform stand-in that only logs what a real host would do.
#[derive(Debug)]
struct ConsolePlatform;

impl PlatformCapabilities for ConsolePlatform {
    fn set_uninstall_blocked(&self, app_id: &str, blocked: bool) -> Result<(), PlatformError> {
        info!(app_id, blocked, "platform: uninstall block");
        Ok(())
    }

    fn request_battery_exemption(&self) -> Result<(), PlatformError> {
        info!("platform: battery exemption requested");
        Ok(())
    }

    fn navigate_home(&self) -> Result<(), PlatformError> {
        info!("platform: navigate home");
        Ok(())
    }

    fn go_back(&self) -> Result<(), PlatformError> {
        info!("platform: go back");
        Ok(())
    }

    fn surface_alert(&self, reason: &str) -> Result<(), PlatformError> {
        info!(reason, "platform: alert");
        Ok(())
    }

    fn stop_protection_services(&self) -> Result<(), PlatformError> {
        info!("platform: protection services stopped");
        Ok(())
    }

    fn capability_status(&self) -> CapabilityStatus {
        CapabilityStatus::default()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = std::env::temp_dir().join("commitment-guard-demo");
    let config = GuardConfig {
        sentinel_interval_millis: 1_000,
        ..GuardConfig::default()
    }
    .with_data_dir(&data_dir);

    let (listener, mut notifications) = ChannelListener::new();
    let guard = CommitmentGuard::builder()
        .with_config(config)
        .with_platform(Arc::new(ConsolePlatform))
        .with_listener(Arc::new(listener))
        .build()
        .expect("valid configuration");

    println!("=== Commitment Guard Example ===\n");

    let report = guard.start_engine();
    println!("Cold start: {:?}\n", report);

    guard
        .add_blocked_app_labeled("com.example.game", "Example Game", u64::MAX)
        .expect("session persisted");
    if guard.start_commitment(0) {
        let status = guard.get_commitment_status();
        println!(
            "Commitment active for another {}s\n",
            status.remaining_millis / 1_000
        );
    }

    println!("Opening the blocked app:");
    guard.publish(WindowEvent::state_changed("com.example.game"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\nTrying to uninstall it from settings:");
    guard.publish(WindowEvent::new(
        EventKind::WindowContentChanged,
        "com.android.settings",
        "com.android.settings.applications.InstalledAppDetails",
        "Example Game  Uninstall  Force stop",
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("\nUnlocking the screen is never blocked:");
    let verdict = guard.on_event(&WindowEvent::new(
        EventKind::WindowStateChanged,
        "com.android.settings",
        "com.android.settings.password.ConfirmLockPassword",
        "",
    ));
    println!("Verdict: {:?}", verdict);

    guard.stop_engine();

    println!("\nNotifications delivered:");
    while let Ok(notification) = notifications.try_recv() {
        println!("  {:?}", notification);
    }

    let snapshot = guard.metrics().snapshot();
    println!("\nMetrics: {:?}", snapshot);
    println!("\n=== Example Complete ===");
}
