//! SLA Tracking for Greenlight approvals
//!
//! Everything here is a pure function over persisted fields: a stage's
//! `entered_at` and the snapshot's `sla_secs`. No independent state is
//! held, so the Kanban view can never drift from the engine's record of
//! when a stage began. Re-running a computation with the same inputs
//! yields the same output.

#![deny(unsafe_code)]

mod analytics;
mod tracker;

pub use analytics::*;
pub use tracker::*;
