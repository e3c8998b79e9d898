//! Transition events: the notification/audit sink contract
//!
//! The engine emits one event per committed transition. Delivery is
//! fire-and-forget; a failing sink never rolls back the transition.

use crate::{ApproverId, InstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of transition occurred
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The current stage completed and the next one became current
    StageAdvanced {
        from_stage: u32,
        to_stage: u32,
    },
    /// Every required stage accepted; the instance is approved
    Approved,
    /// An approver rejected; the instance is terminal
    Rejected,
    /// An approver requested changes; the instance is terminal
    ChangesRequested,
    /// A board user moved the card outside the normal decision path
    ManualMove {
        from_column: String,
        to_column: String,
    },
    /// An SLA breach added an escalation approver to the stage
    Escalated { stage: u32 },
}

/// A committed transition, as reported to the notification collaborator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    /// The instance that transitioned
    pub instance_id: InstanceId,
    /// What happened
    pub kind: EventKind,
    /// The identity that caused the transition, when attributable
    /// (auto-approvals and sweeps carry no actor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ApproverId>,
    /// When the transition committed
    pub timestamp: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn new(instance_id: InstanceId, kind: EventKind, actor: Option<ApproverId>) -> Self {
        Self {
            instance_id,
            kind,
            actor,
            timestamp: Utc::now(),
        }
    }
}
