//! Notification seam for committed transitions
//!
//! The engine publishes one event per transition after the store write
//! commits. Delivery is fire-and-forget: a failing sink is logged and
//! never rolls back the transition.

use approval_types::{ApprovalEvent, ApprovalResult};
use async_trait::async_trait;
use std::sync::Mutex;

/// Receiver for committed transition events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ApprovalEvent) -> ApprovalResult<()>;
}

/// Sink that discards every event
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: &ApprovalEvent) -> ApprovalResult<()> {
        Ok(())
    }
}

/// Sink that records events in memory, for tests and local inspection
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ApprovalEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<ApprovalEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: &ApprovalEvent) -> ApprovalResult<()> {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
        Ok(())
    }
}
