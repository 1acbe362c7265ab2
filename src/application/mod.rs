//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain rules and owns the runtime behavior:
//! - Commitment state machine (lock lifecycle and backup recovery)
//! - Event classifier and enforcement reactor
//! - Admission control (rate limiter, re-entrancy guard)
//! - Bypass sentinel (periodic signal sampling)
//! - Supervisor (cold start, reinstall reconciliation, engine lifecycle)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from storage, crypto and platform details.

pub mod classifier;
pub mod commitment;
#[cfg(feature = "async")]
pub mod feed;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod reactor;
pub mod registry;
pub mod sentinel;
pub mod supervisor;
