//! Integration tests for engine start, event delivery and shutdown.

#![cfg(feature = "async")]

use commitment_guard::application::registry::GuardState;
use commitment_guard::application::sentinel::BypassSentinel;
use commitment_guard::infrastructure::mocks::{
    MemoryBackup, MockClock, MockPlatform, MockProbe, RecordingListener, StaticIdentity,
};
use commitment_guard::{
    AesGcmSealer, CommitmentGuard, CommitmentStateMachine, MemoryLockStore, Metrics,
    SentinelConfig,
};
use std::sync::Arc;
use std::time::Duration;

const NOW: u64 = 1_700_000_000_000;

fn guard(platform: Arc<MockPlatform>, listener: Arc<RecordingListener>) -> CommitmentGuard {
    CommitmentGuard::builder()
        .with_clock(Arc::new(MockClock::at_wall(NOW)))
        .with_platform(platform)
        .with_listener(listener)
        .with_probe(Arc::new(MockProbe::new()))
        .with_identity(Arc::new(StaticIdentity::new("device-a")))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_published_events_reach_the_classifier() {
    let platform = Arc::new(MockPlatform::new());
    let listener = Arc::new(RecordingListener::new());
    let guard = guard(platform.clone(), listener.clone());
    guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    guard.start_engine();
    guard.publish(commitment_guard::WindowEvent::state_changed("com.example.game"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(platform.navigate_home_count(), 1);
    assert_eq!(listener.limited_launches(), vec!["com.example.game"]);
    guard.stop_engine();
}

#[tokio::test]
async fn test_only_newest_pending_event_is_processed() {
    let platform = Arc::new(MockPlatform::new());
    let listener = Arc::new(RecordingListener::new());
    let guard = guard(platform.clone(), listener.clone());
    guard.add_blocked_app("com.example.one", u64::MAX).unwrap();
    guard.add_blocked_app("com.example.two", u64::MAX).unwrap();

    guard.start_engine();
    // No await in between: the consumer has not run yet
    guard.publish(commitment_guard::WindowEvent::state_changed("com.example.one"));
    guard.publish(commitment_guard::WindowEvent::state_changed("com.example.two"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(listener.limited_launches(), vec!["com.example.two"]);
    assert_eq!(platform.navigate_home_count(), 1);
    guard.stop_engine();
}

#[tokio::test]
async fn test_stop_is_idempotent_and_final() {
    let platform = Arc::new(MockPlatform::new());
    let listener = Arc::new(RecordingListener::new());
    let guard = guard(platform.clone(), listener.clone());
    guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    guard.start_engine();
    assert!(guard.is_engine_running());

    guard.stop_engine();
    guard.stop_engine();
    assert!(!guard.is_engine_running());

    // Nothing consumes the feed any more
    guard.publish(commitment_guard::WindowEvent::state_changed("com.example.game"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(platform.navigate_home_count(), 0);
}

#[tokio::test]
async fn test_engine_can_be_restarted() {
    let platform = Arc::new(MockPlatform::new());
    let listener = Arc::new(RecordingListener::new());
    let guard = guard(platform.clone(), listener.clone());
    guard.add_blocked_app("com.example.game", u64::MAX).unwrap();

    guard.start_engine();
    guard.stop_engine();
    let report = guard.start_engine();
    assert_eq!(report.rehydrated, 1);
    assert!(guard.is_engine_running());

    guard.publish(commitment_guard::WindowEvent::state_changed("com.example.game"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(platform.navigate_home_count(), 1);
}

#[tokio::test]
async fn test_sentinel_graceful_shutdown() {
    let clock = Arc::new(MockClock::at_wall(NOW));
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemoryLockStore::new());
    let commitment = Arc::new(CommitmentStateMachine::new(
        store.clone(),
        Arc::new(MemoryBackup::new()),
        Arc::new(AesGcmSealer::ephemeral()),
        Arc::new(StaticIdentity::new("device-a")),
        platform.clone(),
        clock.clone(),
        "com.example.commitmentguard",
    ));
    let sentinel = Arc::new(BypassSentinel::new(
        SentinelConfig::new(Duration::from_millis(10)).unwrap(),
        commitment,
        Arc::new(GuardState::new()),
        store,
        platform,
        Arc::new(MockProbe::new()),
        clock,
        Metrics::new(),
    ));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = sentinel.start(move |report| {
        let _ = tx.send(report);
    });

    // The first cycle runs immediately
    let first = rx.recv().await.unwrap();
    assert!(!first.aborted);
    assert!(handle.is_running());

    handle.shutdown().await.unwrap();
}
