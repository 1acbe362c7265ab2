//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of application logic.

pub mod clock;
pub mod layer;
pub mod listener;
pub mod platform;
pub mod probe;

pub use crate::infrastructure::backup::MemoryBackup;
pub use crate::infrastructure::storage::MemoryLockStore;
pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use listener::RecordingListener;
pub use platform::{MockPlatform, PlatformCall};
pub use probe::{MockProbe, StaticIdentity};
