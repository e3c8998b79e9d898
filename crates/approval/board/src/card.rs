//! Card derivation
//!
//! A card is a pure projection of one instance against the column
//! configuration. Nothing here is persisted; the board is always
//! recomputable from instances alone.

use approval_sla::{compute_sla, SlaView};
use approval_types::{ApprovalInstance, ContentId, InstanceId, InstanceStatus, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One instance as shown on the board
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KanbanCard {
    /// Same as the instance id
    pub card_id: InstanceId,
    pub content_id: ContentId,
    pub column_id: String,
    /// Display name of the current stage
    pub stage_name: String,
    pub status: InstanceStatus,
    pub priority: Priority,
    /// SLA deadline of the current stage, when one is tracked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla: Option<SlaView>,
    pub updated_at: DateTime<Utc>,
}

impl KanbanCard {
    /// Project an instance into a card for the given column.
    ///
    /// SLA fields are attached only while the instance is open; a
    /// terminal card has no running clock.
    pub fn from_instance(
        instance: &ApprovalInstance,
        column_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let index = instance.current_stage_index;
        let sla = if instance.is_open() {
            match (instance.stage_state(index), instance.stage_def(index)) {
                (Some(state), Some(def)) => compute_sla(state, def, now),
                _ => None,
            }
        } else {
            None
        };

        Self {
            card_id: instance.id.clone(),
            content_id: instance.content_id.clone(),
            column_id: column_id.into(),
            stage_name: instance.current_stage_name().to_string(),
            status: instance.status,
            priority: instance.priority,
            due_date: sla.map(|view| view.deadline),
            sla,
            updated_at: instance.updated_at,
        }
    }
}

/// Column ordering: priority first, then earliest deadline (no
/// deadline sorts last), then most recently touched.
pub fn compare_cards(a: &KanbanCard, b: &KanbanCard) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.updated_at.cmp(&a.updated_at))
}
