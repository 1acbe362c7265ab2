//! Shared enforcement state.
//!
//! One explicitly owned [`GuardState`] is created per guard and injected into
//! the classifier, the reactor, the sentinel and the supervisor. It holds the
//! blocked-app set, per-package intervention timestamps, the sticky
//! protection window and the last foreground package.
//!
//! Reads and writes happen from the event-observation callback, which must
//! not block: the maps are sharded (`DashMap`) and the sticky deadline and
//! foreground marker are atomics. The sticky label sits behind a mutex that
//! is only touched when a window is armed or an intervention is logged.

use crate::domain::sticky::StickyProtectionWindow;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Package-id segments that never name an app on their own.
const GENERIC_SEGMENTS: &[&str] = &[
    "com", "org", "net", "io", "co", "android", "app", "apps", "mobile", "client", "free", "lite",
];

/// Packages whose id does not carry the name users see.
const KNOWN_LABELS: &[(&str, &str)] = &[
    ("com.facebook.katana", "facebook"),
    ("com.facebook.lite", "facebook lite"),
    ("com.facebook.orca", "messenger"),
    ("com.zhiliaoapp.musically", "tiktok"),
    ("com.ss.android.ugc.trill", "tiktok"),
    ("com.twitter.android", "twitter"),
    ("org.telegram.messenger", "telegram"),
    ("com.google.android.youtube", "youtube"),
    ("com.google.android.apps.youtube.music", "youtube music"),
    ("tv.twitch.android.app", "twitch"),
];

/// Derive a lowercase display name from a package id.
///
/// Well-known packages use their store label. Otherwise picks the last
/// segment that is not a generic token: `com.instagram.android` ->
/// `instagram`. The result is a guess; callers that know the real label
/// should pass it instead.
pub fn derive_display_name(package: &str) -> String {
    let trimmed = package.trim();
    if let Some((_, label)) = KNOWN_LABELS
        .iter()
        .find(|(id, _)| id.eq_ignore_ascii_case(trimmed))
    {
        return (*label).to_string();
    }
    package
        .rsplit('.')
        .map(str::trim)
        .find(|segment| {
            !segment.is_empty() && !GENERIC_SEGMENTS.contains(&segment.to_lowercase().as_str())
        })
        .unwrap_or(package)
        .to_lowercase()
}

/// A blocked application and its blocking deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedApp {
    pub package: String,
    /// Lowercase name used for text heuristics
    pub display_name: String,
    pub end_time_millis: u64,
}

impl BlockedApp {
    pub fn new(package: impl Into<String>, display_name: Option<&str>, end_time_millis: u64) -> Self {
        let package = package.into();
        let display_name = display_name
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| derive_display_name(&package));
        Self {
            package,
            display_name,
            end_time_millis,
        }
    }

    pub fn is_blocked_at(&self, now_millis: u64) -> bool {
        self.end_time_millis > now_millis
    }
}

/// State shared across the enforcement components.
#[derive(Debug)]
pub struct GuardState {
    blocked: DashMap<String, BlockedApp>,
    last_intervention: DashMap<String, Instant>,
    sticky_until_millis: AtomicU64,
    sticky_label: Mutex<String>,
    last_foreground: AtomicU64,
    hasher: ahash::RandomState,
}

impl GuardState {
    pub fn new() -> Self {
        Self {
            blocked: DashMap::new(),
            last_intervention: DashMap::new(),
            sticky_until_millis: AtomicU64::new(0),
            sticky_label: Mutex::new(String::new()),
            last_foreground: AtomicU64::new(0),
            hasher: ahash::RandomState::new(),
        }
    }

    /// Add or replace a blocked application.
    pub fn insert_blocked(&self, app: BlockedApp) {
        self.blocked.insert(app.package.clone(), app);
    }

    pub fn remove_blocked(&self, package: &str) -> Option<BlockedApp> {
        self.last_intervention.remove(package);
        self.blocked.remove(package).map(|(_, app)| app)
    }

    pub fn blocked_app(&self, package: &str) -> Option<BlockedApp> {
        self.blocked.get(package).map(|entry| entry.value().clone())
    }

    /// Whether the package is blocked and its deadline has not passed.
    pub fn is_blocked(&self, package: &str, now_millis: u64) -> bool {
        self.blocked
            .get(package)
            .is_some_and(|entry| entry.is_blocked_at(now_millis))
    }

    /// Cheap emptiness check for the classifier's fast path.
    pub fn has_blocked_apps(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Display names of every app still blocked at `now_millis`.
    pub fn blocked_labels(&self, now_millis: u64) -> Vec<String> {
        self.blocked
            .iter()
            .filter(|entry| entry.is_blocked_at(now_millis))
            .map(|entry| entry.display_name.clone())
            .collect()
    }

    /// Whether any still-blocked app carries this display name.
    pub fn is_blocked_label(&self, label: &str, now_millis: u64) -> bool {
        self.blocked
            .iter()
            .any(|entry| entry.is_blocked_at(now_millis) && entry.display_name == label)
    }

    pub fn blocked_apps(&self) -> Vec<BlockedApp> {
        self.blocked.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Drop every app whose deadline has passed and return their packages.
    pub fn prune_expired(&self, now_millis: u64) -> Vec<String> {
        let mut expired = Vec::new();
        self.blocked.retain(|package, app| {
            if app.is_blocked_at(now_millis) {
                true
            } else {
                expired.push(package.clone());
                false
            }
        });
        for package in &expired {
            self.last_intervention.remove(package);
        }
        expired
    }

    /// Open or refresh the sticky protection window.
    pub fn arm_sticky(&self, now_millis: u64, duration_millis: u64, label: &str) {
        let window = StickyProtectionWindow::armed(now_millis, duration_millis, label);
        if let Ok(mut current) = self.sticky_label.lock() {
            current.clear();
            current.push_str(&window.target_label);
        }
        self.sticky_until_millis
            .store(window.until_millis, Ordering::Release);
    }

    /// Hot-path check; never takes the label mutex.
    pub fn is_sticky_open(&self, now_millis: u64) -> bool {
        now_millis < self.sticky_until_millis.load(Ordering::Acquire)
    }

    pub fn sticky_window(&self) -> StickyProtectionWindow {
        let target_label = self
            .sticky_label
            .lock()
            .map(|label| label.clone())
            .unwrap_or_default();
        StickyProtectionWindow {
            until_millis: self.sticky_until_millis.load(Ordering::Acquire),
            target_label,
        }
    }

    pub fn close_sticky(&self) {
        self.sticky_until_millis.store(0, Ordering::Release);
    }

    /// Claim the right to intervene on `package` at `now`.
    ///
    /// Returns `false` if the previous intervention on the same package was
    /// less than `min_interval` ago.
    pub fn try_claim_intervention(&self, package: &str, now: Instant, min_interval: Duration) -> bool {
        match self.last_intervention.entry(package.to_string()) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < min_interval {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Record `package` as the foreground app; true if it changed.
    pub fn note_foreground(&self, package: &str) -> bool {
        let mut hasher = self.hasher.build_hasher();
        package.hash(&mut hasher);
        // Zero is reserved for "nothing seen yet"
        let hash = hasher.finish().max(1);
        self.last_foreground.swap(hash, Ordering::AcqRel) != hash
    }

    /// Forget everything; used when the engine is rebuilt from durable state.
    pub fn clear(&self) {
        self.blocked.clear();
        self.last_intervention.clear();
        self.close_sticky();
        self.last_foreground.store(0, Ordering::Release);
    }
}

impl Default for GuardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_derive_display_name() {
        assert_eq!(derive_display_name("com.instagram.android"), "instagram");
        assert_eq!(derive_display_name("com.google.android.youtube"), "youtube");
        assert_eq!(derive_display_name("org.Telegram.messenger"), "telegram");
        assert_eq!(derive_display_name("com.facebook.katana"), "facebook");
        assert_eq!(derive_display_name("com.zhiliaoapp.musically"), "tiktok");
        assert_eq!(derive_display_name("com.example.focusgame"), "focusgame");
        assert_eq!(derive_display_name("android"), "android");
    }

    #[test]
    fn test_explicit_label_is_lowercased() {
        let app = BlockedApp::new("com.zhiliaoapp.musically", Some(" TikTok "), 10);
        assert_eq!(app.display_name, "tiktok");

        let derived = BlockedApp::new("com.zhiliaoapp.musically", Some("  "), 10);
        assert_eq!(derived.display_name, "musically");
    }

    #[test]
    fn test_blocked_respects_deadline() {
        let state = GuardState::new();
        state.insert_blocked(BlockedApp::new("com.example.game", None, 1_000));

        assert!(state.is_blocked("com.example.game", 999));
        assert!(!state.is_blocked("com.example.game", 1_000));
        assert!(!state.is_blocked("com.example.other", 0));
        assert_eq!(state.blocked_labels(500), vec!["game".to_string()]);
        assert!(state.blocked_labels(1_000).is_empty());
    }

    #[test]
    fn test_prune_expired() {
        let state = GuardState::new();
        state.insert_blocked(BlockedApp::new("a.one", None, 100));
        state.insert_blocked(BlockedApp::new("a.two", None, 300));

        let expired = state.prune_expired(200);
        assert_eq!(expired, vec!["a.one".to_string()]);
        assert_eq!(state.blocked_count(), 1);
        assert!(state.is_blocked("a.two", 200));
    }

    #[test]
    fn test_sticky_window() {
        let state = GuardState::new();
        assert!(!state.is_sticky_open(0));

        state.arm_sticky(1_000, 10_000, "instagram");
        assert!(state.is_sticky_open(10_999));
        assert!(!state.is_sticky_open(11_001));
        assert_eq!(state.sticky_window().target_label, "instagram");

        state.close_sticky();
        assert!(!state.is_sticky_open(1_001));
    }

    #[test]
    fn test_intervention_interval() {
        let state = GuardState::new();
        let start = Instant::now();
        let interval = Duration::from_millis(1_000);

        assert!(state.try_claim_intervention("p", start, interval));
        assert!(!state.try_claim_intervention("p", start, interval));
        assert!(!state.try_claim_intervention("p", start + Duration::from_millis(10), interval));
        assert!(state.try_claim_intervention("q", start + Duration::from_millis(10), interval));
        assert!(state.try_claim_intervention("p", start + Duration::from_millis(1_000), interval));
    }

    #[test]
    fn test_note_foreground() {
        let state = GuardState::new();
        assert!(state.note_foreground("a"));
        assert!(!state.note_foreground("a"));
        assert!(state.note_foreground("b"));
        assert!(state.note_foreground("a"));
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let state = Arc::new(GuardState::new());
        let mut handles = vec![];

        for i in 0..10 {
            let state = Arc::clone(&state);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    state.insert_blocked(BlockedApp::new(format!("pkg.{}.{}", i, j), None, 10));
                    let _ = state.is_blocked("pkg.0.0", 5);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.blocked_count(), 1000);
    }
}
