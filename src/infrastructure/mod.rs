//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Durable storage (JSON state document, secondary backup file)
//! - Sealing (AES-256-GCM with a local key file)
//! - Device identity and integrity probes
//! - Configuration and the public [`guard::CommitmentGuard`] facade

pub mod backup;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod guard;
pub mod identity;
#[cfg(feature = "async")]
pub mod notifier;
pub mod probe;
pub mod storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for the
/// clock, the platform provider, the integrity probe and the listener.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// commitment-guard = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
