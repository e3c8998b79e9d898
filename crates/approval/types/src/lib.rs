//! Approval Domain Types for Greenlight
//!
//! Content moves through a configurable, multi-stage human approval
//! process before publication. These types are the shared vocabulary
//! of that process.
//!
//! # Key Concepts
//!
//! - **WorkflowTemplate**: A reusable, immutable-once-published
//!   definition: an ordered sequence of stages, each with its own
//!   approvers and completion policy.
//! - **ApprovalInstance**: The live record for one content item.
//!   Created by snapshotting a template, mutated only by the engine,
//!   terminal once approved, rejected, or sent back for changes.
//! - **StageState**: Per-instance progress of one stage, including
//!   every approver decision ever recorded. Stage states are never
//!   deleted, only transitioned, so the audit trail is complete.
//! - **ApprovalEvent**: What the engine tells the outside world after
//!   a transition commits (notification/audit sink contract).
//!
//! # Design Principles
//!
//! 1. Templates are versioned by copy. An instance carries its own
//!    snapshot of the stages, so later template edits never alter
//!    in-flight approvals.
//! 2. Every failure is a typed, caller-facing error. Infrastructure
//!    failures are kept distinct from the domain taxonomy.
//! 3. Decisions are permanent. Resubmission is rejected, never
//!    silently overwritten.

#![deny(unsafe_code)]

mod errors;
mod events;
mod ids;
mod instance;
mod template;

pub use errors::*;
pub use events::*;
pub use ids::*;
pub use instance::*;
pub use template::*;
