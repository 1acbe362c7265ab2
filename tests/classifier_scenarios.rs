//! Integration tests for event classification through the public facade.

use commitment_guard::infrastructure::mocks::{
    MockClock, MockPlatform, MockProbe, RecordingListener, StaticIdentity,
};
use commitment_guard::{
    CommitmentGuard, DropReason, EventKind, InterventionReason, Surface, Verdict, WindowEvent,
};
use std::sync::Arc;
use std::time::Duration;

const NOW: u64 = 1_700_000_000_000;
const SETTINGS: &str = "com.android.settings";
const APP_DETAILS: &str = "com.android.settings.applications.InstalledAppDetails";

struct Harness {
    clock: Arc<MockClock>,
    platform: Arc<MockPlatform>,
    listener: Arc<RecordingListener>,
    guard: CommitmentGuard,
}

fn harness() -> Harness {
    let clock = Arc::new(MockClock::at_wall(NOW));
    let platform = Arc::new(MockPlatform::new());
    let listener = Arc::new(RecordingListener::new());
    let guard = CommitmentGuard::builder()
        .with_clock(clock.clone())
        .with_platform(platform.clone())
        .with_listener(listener.clone())
        .with_probe(Arc::new(MockProbe::new()))
        .with_identity(Arc::new(StaticIdentity::new("device-a")))
        .build()
        .unwrap();
    Harness {
        clock,
        platform,
        listener,
        guard,
    }
}

fn content(package: &'static str, class: &'static str, text: &str) -> WindowEvent {
    WindowEvent::new(EventKind::WindowContentChanged, package, class, text)
}

#[test]
fn test_eleventh_event_in_one_bucket_is_dropped() {
    let h = harness();
    h.guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    let verdicts: Vec<Verdict> = (0..11)
        .map(|_| h.guard.on_event(&WindowEvent::state_changed("com.example.other")))
        .collect();

    assert!(verdicts[..10].iter().all(|v| !v.is_dropped()));
    assert_eq!(verdicts[10], Verdict::Dropped(DropReason::RateLimited));
    assert_eq!(h.guard.metrics().events_rate_limited(), 1);
}

#[test]
fn test_events_across_two_buckets_all_pass() {
    let h = harness();
    h.guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    for _ in 0..5 {
        assert!(!h
            .guard
            .on_event(&WindowEvent::state_changed("com.example.other"))
            .is_dropped());
    }
    h.clock.advance(Duration::from_millis(60));
    for _ in 0..5 {
        assert!(!h
            .guard
            .on_event(&WindowEvent::state_changed("com.example.other"))
            .is_dropped());
    }
    assert_eq!(h.guard.metrics().events_rate_limited(), 0);
}

#[test]
fn test_unclassified_kinds_are_filtered() {
    let h = harness();
    let event = WindowEvent::new(EventKind::ViewScrolled, SETTINGS, "", "uninstall");
    assert_eq!(h.guard.on_event(&event), Verdict::Dropped(DropReason::Filtered));
    assert_eq!(h.guard.metrics().events_filtered(), 1);
}

#[test]
fn test_auth_screen_never_blocked_under_lock() {
    let h = harness();
    assert!(h.guard.start_commitment(1));
    h.guard
        .add_blocked_app_labeled("com.example.game", "Example Game", u64::MAX)
        .unwrap();

    let verdict = h.guard.on_event(&content(
        SETTINGS,
        "com.android.settings.password.ConfirmLockPassword",
        "Example Game uninstall force stop",
    ));
    assert_eq!(verdict, Verdict::AuthScreen);
    assert_eq!(h.platform.navigate_home_count(), 0);
}

#[test]
fn test_sticky_window_after_uninstall_attempt() {
    let h = harness();
    h.guard
        .add_blocked_app_labeled("com.example.game", "Example Game", u64::MAX)
        .unwrap();

    let attempt = h
        .guard
        .on_event(&content(SETTINGS, APP_DETAILS, "Example Game Uninstall"));
    assert!(matches!(
        attempt,
        Verdict::Intervene {
            reason: InterventionReason::UninstallAttempt {
                surface: Surface::Settings,
                ..
            },
            redirected: true,
        }
    ));

    // No danger keyword, still blocked inside the window
    h.clock.advance(Duration::from_millis(5_000));
    let inside = h
        .guard
        .on_event(&content(SETTINGS, "android.widget.FrameLayout", "Storage"));
    assert_eq!(
        inside,
        Verdict::Intervene {
            reason: InterventionReason::StickyProtection {
                surface: Surface::Settings
            },
            redirected: true,
        }
    );

    h.clock.advance(Duration::from_millis(5_001));
    let after = h
        .guard
        .on_event(&content(SETTINGS, "android.widget.FrameLayout", "Storage"));
    assert_eq!(after, Verdict::Pass);
    assert_eq!(h.platform.navigate_home_count(), 2);
}

#[test]
fn test_guard_protects_itself_only_while_locked() {
    let h = harness();
    let prompt = || {
        content(
            "com.android.packageinstaller",
            "android.app.AlertDialog",
            "Do you want to uninstall Commitment Guard?",
        )
    };

    // Idle: nothing blocked and no lock
    assert_eq!(h.guard.on_event(&prompt()), Verdict::Pass);

    assert!(h.guard.start_commitment(1));
    let verdict = h.guard.on_event(&prompt());
    assert!(matches!(
        verdict,
        Verdict::Intervene {
            reason: InterventionReason::UninstallAttempt {
                surface: Surface::Installer,
                ref target,
            },
            ..
        } if target == "commitment guard"
    ));
}

#[test]
fn test_well_known_package_matches_store_label() {
    let h = harness();
    h.guard
        .add_blocked_app("com.facebook.katana", u64::MAX)
        .unwrap();

    let verdict = h.guard.on_event(&content(
        "com.android.packageinstaller",
        "android.app.AlertDialog",
        "Do you want to uninstall Facebook?",
    ));
    assert!(matches!(
        verdict,
        Verdict::Intervene {
            reason: InterventionReason::UninstallAttempt {
                surface: Surface::Installer,
                ref target,
            },
            ..
        } if target == "facebook"
    ));
}

#[test]
fn test_text_input_fields_are_not_inspected() {
    let h = harness();
    h.guard
        .add_blocked_app_labeled("com.example.game", "Example Game", u64::MAX)
        .unwrap();

    let verdict = h.guard.on_event(&content(
        "com.android.vending",
        "android.widget.EditText",
        "uninstall example game",
    ));
    assert_eq!(verdict, Verdict::Pass);
}

#[test]
fn test_foreground_telemetry() {
    let h = harness();
    h.guard.add_blocked_app("com.example.game", NOW + 60_000).unwrap();

    h.guard.on_event(&WindowEvent::state_changed("com.example.mail"));
    h.guard.on_event(&WindowEvent::state_changed("com.example.mail"));
    let verdict = h.guard.on_event(&WindowEvent::state_changed("com.example.game"));

    assert_eq!(
        verdict,
        Verdict::Intervene {
            reason: InterventionReason::BlockedForeground,
            redirected: true,
        }
    );
    assert_eq!(
        h.listener.launches(),
        vec!["com.example.mail", "com.example.game"]
    );
    assert_eq!(h.listener.limited_launches(), vec!["com.example.game"]);
}

#[test]
fn test_repeat_interventions_are_spaced() {
    let h = harness();
    h.guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    let first = h.guard.on_event(&WindowEvent::state_changed("com.example.game"));
    h.guard.on_event(&WindowEvent::state_changed("com.example.mail"));
    let second = h.guard.on_event(&WindowEvent::state_changed("com.example.game"));

    assert!(matches!(first, Verdict::Intervene { redirected: true, .. }));
    assert!(matches!(second, Verdict::Intervene { redirected: false, .. }));
    assert_eq!(h.platform.navigate_home_count(), 1);

    h.clock.advance(Duration::from_secs(2));
    h.guard.on_event(&WindowEvent::state_changed("com.example.mail"));
    let third = h.guard.on_event(&WindowEvent::state_changed("com.example.game"));
    assert!(matches!(third, Verdict::Intervene { redirected: true, .. }));
}

#[test]
fn test_expired_block_is_not_enforced() {
    let h = harness();
    h.guard.add_blocked_app("com.example.game", NOW + 1_000).unwrap();
    h.clock.advance(Duration::from_millis(1_001));

    assert_eq!(
        h.guard.on_event(&WindowEvent::state_changed("com.example.game")),
        Verdict::Pass
    );
}

#[test]
fn test_host_events_pass() {
    let h = harness();
    assert!(h.guard.start_commitment(1));
    let host = h.guard.config().host_app_id.clone();
    let event = WindowEvent::new(EventKind::WindowContentChanged, host, "", "uninstall");
    assert_eq!(h.guard.on_event(&event), Verdict::Pass);
}
