//! Greenlight Approval Engine
//!
//! The authoritative writer for approval instances. Reads go anywhere;
//! every mutation funnels through [`ApprovalEngine`], which validates
//! against committed state, persists through the store's optimistic
//! version check, and only then notifies the event sink.
//!
//! # Key Concepts
//!
//! - **ApprovalEngine**: Load-validate-mutate-commit transitions with
//!   bounded conflict retries.
//! - **InstanceStore**: The persistence seam. The in-memory adapter is
//!   the deterministic reference; production backs it with a
//!   transactional store.
//! - **EventSink**: Fire-and-forget notification of committed
//!   transitions. A failing sink never rolls back a write.
//! - **TemplateRegistry**: Immutable-once-published template catalog,
//!   versioned by re-registration under the same name.

#![deny(unsafe_code)]

mod engine;
mod policy;
mod registry;
mod sink;
mod store;

pub use engine::{ApprovalEngine, MoveTarget, SWEEP_INTERVAL_SECS};
pub use policy::stage_satisfied;
pub use registry::TemplateRegistry;
pub use sink::{EventSink, NullEventSink, RecordingEventSink};
pub use store::{InMemoryInstanceStore, InstanceStore};
