//! Domain layer - pure types and rules with no I/O.
//!
//! - Commitment lock record, backup payload and lifecycle states
//! - Window events delivered by the host
//! - Surface-scoped keyword heuristics
//! - Sticky protection window
//! - Advisory bypass signals

pub mod event;
pub mod heuristics;
pub mod lock;
pub mod signal;
pub mod sticky;
