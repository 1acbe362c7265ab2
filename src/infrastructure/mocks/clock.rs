//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Mock clock for testing.
///
/// Controls monotonic and wall-clock time separately. [`MockClock::advance`]
/// moves both, the way real time passes; [`MockClock::set_wall`] moves only
/// the wall clock, the way a user changing the system time would.
///
/// # Examples
///
/// ```
/// use commitment_guard::infrastructure::mocks::MockClock;
/// use commitment_guard::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::at_wall(1_000_000);
/// let start = clock.now();
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// assert_eq!(clock.wall_millis(), 1_010_000);
///
/// // Roll the wall clock back an hour; monotonic time is unaffected
/// clock.set_wall(1_010_000 - 3_600_000);
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across threads.
/// All clones share the same underlying time values.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Readings>>,
}

#[derive(Debug, Clone, Copy)]
struct Readings {
    monotonic: Instant,
    wall_millis: u64,
}

impl MockClock {
    /// Create a mock clock at `start` with the wall clock at `wall_millis`.
    pub fn new(start: Instant, wall_millis: u64) -> Self {
        Self {
            current: Arc::new(Mutex::new(Readings {
                monotonic: start,
                wall_millis,
            })),
        }
    }

    /// Create a mock clock starting now, with the wall clock at `wall_millis`.
    pub fn at_wall(wall_millis: u64) -> Self {
        Self::new(Instant::now(), wall_millis)
    }

    /// Let `duration` pass on both clocks.
    pub fn advance(&self, duration: Duration) {
        let mut readings = self.readings();
        readings.monotonic += duration;
        readings.wall_millis = readings
            .wall_millis
            .saturating_add(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
    }

    /// Set the wall clock only.
    pub fn set_wall(&self, wall_millis: u64) {
        self.readings().wall_millis = wall_millis;
    }

    /// Set the monotonic clock only.
    pub fn set(&self, instant: Instant) {
        self.readings().monotonic = instant;
    }

    fn readings(&self) -> MutexGuard<'_, Readings> {
        self.current
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.readings().monotonic
    }

    fn wall_millis(&self) -> u64 {
        self.readings().wall_millis
    }
}
