//! Approval instances: the live record of one content item under review
//!
//! An ApprovalInstance is created by snapshotting a template against a
//! content reference. The engine is its only writer. Stage states are
//! created up front and only ever transitioned, so the record carries
//! its own complete audit trail.

use crate::{ApprovalError, ApprovalResult, ApproverId, ContentId, InstanceId, TemplateId};
use crate::{StageDefinition, TemplateSettings, WorkflowTemplate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Priority ─────────────────────────────────────────────────────────

/// Display priority of a card on the board
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Sort rank, higher is more urgent
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Urgent => 4,
        }
    }
}

// ── Decisions ────────────────────────────────────────────────────────

/// The status of one approver's decision on one stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting a response
    #[default]
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

impl DecisionStatus {
    /// Whether this decision is final (resubmission is rejected)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One approver's recorded decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Decision {
    /// Current status
    pub status: DecisionStatus,
    /// Free-form comment supplied with the decision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the decision was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Whether the decision was synthesized by the auto-approval timer
    #[serde(default)]
    pub auto: bool,
}

impl Decision {
    /// A pending placeholder, materialized when the approver is assigned
    pub fn pending() -> Self {
        Self::default()
    }

    /// A recorded decision
    pub fn recorded(status: DecisionStatus, comment: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            status,
            comment,
            decided_at: Some(now),
            auto: false,
        }
    }

    /// A decision synthesized by the auto-approval timer
    pub fn auto_approved(now: DateTime<Utc>) -> Self {
        Self {
            status: DecisionStatus::Approved,
            comment: None,
            decided_at: Some(now),
            auto: true,
        }
    }
}

// ── Stage State ──────────────────────────────────────────────────────

/// Status of one stage within an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet reached
    #[default]
    Pending,
    /// The current stage, collecting decisions
    InProgress,
    /// Completion policy satisfied
    Approved,
    Rejected,
    ChangesRequested,
    /// Bypassed by a manual board move
    Skipped,
}

/// Per-instance progress of one stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    /// Order of the stage in the template snapshot
    pub stage_order: u32,
    /// Current status
    pub status: StageStatus,
    /// When the stage became current (SLA clock origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Every approver's decision, keyed by identity reference
    pub decisions: HashMap<ApproverId, Decision>,
    /// Approvers added by SLA escalation (not in the template snapshot)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub escalated_to: Vec<ApproverId>,
}

impl StageState {
    /// Materialize a stage state with pending decision slots for every
    /// configured approver
    pub fn from_definition(definition: &StageDefinition) -> Self {
        Self {
            stage_order: definition.order,
            status: StageStatus::Pending,
            entered_at: None,
            completed_at: None,
            decisions: definition
                .approvers
                .iter()
                .map(|a| (a.approver_id.clone(), Decision::pending()))
                .collect(),
            escalated_to: Vec::new(),
        }
    }

    /// Mark the stage as current, restarting its SLA clock
    pub fn enter(&mut self, now: DateTime<Utc>) {
        self.status = StageStatus::InProgress;
        self.entered_at = Some(now);
        self.completed_at = None;
    }

    /// Mark the stage terminal
    pub fn complete(&mut self, status: StageStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
    }

    /// Reset every decision to pending for a fresh review round.
    ///
    /// Used when a manual move re-enters a stage that was already
    /// decided; the instance history keeps the record of the first
    /// round.
    pub fn reset_decisions(&mut self) {
        for decision in self.decisions.values_mut() {
            *decision = Decision::pending();
        }
    }

    /// The recorded decision for an approver, if the slot exists
    pub fn decision(&self, approver: &ApproverId) -> Option<&Decision> {
        self.decisions.get(approver)
    }

    /// Approvers that have not yet decided
    pub fn pending_approvers(&self) -> Vec<&ApproverId> {
        self.decisions
            .iter()
            .filter(|(_, d)| d.status == DecisionStatus::Pending)
            .map(|(id, _)| id)
            .collect()
    }

    /// Count of approving decisions
    pub fn approved_count(&self) -> usize {
        self.decisions
            .values()
            .filter(|d| d.status == DecisionStatus::Approved)
            .count()
    }

    /// Seconds since the stage became current
    pub fn active_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.entered_at
            .map(|at| now.signed_duration_since(at).num_seconds())
    }
}

// ── Instance Status ──────────────────────────────────────────────────

/// The lifecycle state of an approval instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created but review has not started
    #[default]
    Pending,
    /// Collecting decisions on the current stage
    InProgress,
    /// Every required stage accepted
    Approved,
    /// An approver rejected; terminal for the whole instance
    Rejected,
    /// An approver requested changes; resubmission creates a new instance
    ChangesRequested,
}

impl InstanceStatus {
    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::ChangesRequested
        )
    }

    /// Whether the instance still accepts decisions
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

// ── Audit History ────────────────────────────────────────────────────

/// One entry in the instance history.
///
/// Manual board moves are recorded as decision-less entries so the
/// card's history shows the override rather than an approver action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened ("created", "approved", "manual_move", ...)
    pub action: String,
    /// Who caused it, when attributable to an identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ApproverId>,
    /// The stage involved, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_order: Option<u32>,
    /// Free-form detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

// ── Approval Instance ────────────────────────────────────────────────

/// The live approval record for one content item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    /// Unique instance identifier (also the Kanban card id)
    pub id: InstanceId,
    /// The content item under review (opaque to this core)
    pub content_id: ContentId,
    /// The template this instance was created from
    pub template_id: TemplateId,
    /// Immutable copy of the template's stages at creation time
    pub template_snapshot: Vec<StageDefinition>,
    /// Immutable copy of the template settings at creation time
    pub settings: TemplateSettings,
    /// Index of the current stage while the instance is open
    pub current_stage_index: u32,
    /// Lifecycle state
    pub status: InstanceStatus,
    /// Per-stage progress, one entry per snapshot stage
    pub stage_states: Vec<StageState>,
    /// Board display priority
    pub priority: Priority,
    /// Revision chain link when this instance is a resubmission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_instance_id: Option<InstanceId>,
    /// Complete ordered history of everything that happened
    pub history: Vec<AuditEntry>,
    /// Optimistic concurrency version, bumped by the store on update
    pub version: u64,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last updated
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ApprovalInstance {
    /// Create an instance from a validated template.
    ///
    /// Snapshots the stages, enters stage 0, and records the creation
    /// in history. Fails with `InvalidTemplate` if the template does
    /// not validate (in particular, zero stages).
    pub fn from_template(
        template: &WorkflowTemplate,
        content_id: ContentId,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Self> {
        template.validate()?;

        let mut stage_states: Vec<StageState> = template
            .stages
            .iter()
            .map(StageState::from_definition)
            .collect();
        stage_states[0].enter(now);

        let mut instance = Self {
            id: InstanceId::generate(),
            content_id,
            template_id: template.id.clone(),
            template_snapshot: template.stages.clone(),
            settings: template.settings.clone(),
            current_stage_index: 0,
            status: InstanceStatus::InProgress,
            stage_states,
            priority: Priority::default(),
            previous_instance_id: None,
            history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        instance.record_history("created", None, Some(0), None, now);
        Ok(instance)
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Create a fresh instance for resubmission after changes were
    /// requested.
    ///
    /// The new instance reuses the previous snapshot (not the live
    /// template) and links back via `previous_instance_id`, so the
    /// revision chain is walkable while the old record stays immutable.
    pub fn resubmission_of(previous: &ApprovalInstance, now: DateTime<Utc>) -> Self {
        let mut stage_states: Vec<StageState> = previous
            .template_snapshot
            .iter()
            .map(StageState::from_definition)
            .collect();
        stage_states[0].enter(now);

        let mut instance = Self {
            id: InstanceId::generate(),
            content_id: previous.content_id.clone(),
            template_id: previous.template_id.clone(),
            template_snapshot: previous.template_snapshot.clone(),
            settings: previous.settings.clone(),
            current_stage_index: 0,
            status: InstanceStatus::InProgress,
            stage_states,
            priority: previous.priority,
            previous_instance_id: Some(previous.id.clone()),
            history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        instance.record_history("resubmitted", None, Some(0), None, now);
        instance
    }

    // ── Query methods ────────────────────────────────────────────────

    /// Whether the instance still accepts decisions
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the instance reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The current stage's state
    pub fn current_stage_state(&self) -> Option<&StageState> {
        self.stage_states.get(self.current_stage_index as usize)
    }

    /// The current stage's definition from the snapshot
    pub fn current_stage_def(&self) -> Option<&StageDefinition> {
        self.template_snapshot.get(self.current_stage_index as usize)
    }

    /// The stage definition at a given order
    pub fn stage_def(&self, order: u32) -> Option<&StageDefinition> {
        self.template_snapshot.get(order as usize)
    }

    /// The stage state at a given order
    pub fn stage_state(&self, order: u32) -> Option<&StageState> {
        self.stage_states.get(order as usize)
    }

    /// Whether `order` is the final stage of the snapshot
    pub fn is_final_stage(&self, order: u32) -> bool {
        order as usize + 1 == self.template_snapshot.len()
    }

    /// Display name of the current stage
    pub fn current_stage_name(&self) -> &str {
        self.current_stage_def().map(|s| s.name.as_str()).unwrap_or("")
    }

    // ── Mutators (engine only) ───────────────────────────────────────

    /// Ensure the instance accepts mutations
    pub fn require_open(&self) -> ApprovalResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ApprovalError::InstanceNotActive(self.id.clone()))
        }
    }

    /// Enter a stage, restarting its SLA clock
    pub fn enter_stage(&mut self, order: u32, now: DateTime<Utc>) {
        self.current_stage_index = order;
        if let Some(stage) = self.stage_states.get_mut(order as usize) {
            stage.enter(now);
        }
        self.status = InstanceStatus::InProgress;
        self.updated_at = now;
    }

    /// Finalize the instance with a terminal status
    pub fn finalize(&mut self, status: InstanceStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Append a history entry
    pub fn record_history(
        &mut self,
        action: impl Into<String>,
        actor: Option<ApproverId>,
        stage_order: Option<u32>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.history.push(AuditEntry {
            action: action.into(),
            actor,
            stage_order,
            comment,
            timestamp: now,
        });
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApprovalPolicy, ApproverSpec};

    fn template() -> WorkflowTemplate {
        WorkflowTemplate::new("Two Stage")
            .add_stage(
                StageDefinition::new(0, "Internal Review")
                    .with_approver(ApproverSpec::required("a"))
                    .with_approver(ApproverSpec::required("b")),
            )
            .add_stage(
                StageDefinition::new(0, "Client Approval")
                    .with_approver(ApproverSpec::any("c"))
                    .with_policy(ApprovalPolicy::Any),
            )
    }

    #[test]
    fn test_from_template_snapshots_and_enters_stage_zero() {
        let tpl = template();
        let inst = ApprovalInstance::from_template(&tpl, ContentId::new("post-1"), Utc::now())
            .unwrap();

        assert_eq!(inst.status, InstanceStatus::InProgress);
        assert_eq!(inst.current_stage_index, 0);
        assert_eq!(inst.template_snapshot.len(), 2);
        assert_eq!(inst.stage_states.len(), 2);

        let first = inst.current_stage_state().unwrap();
        assert_eq!(first.status, StageStatus::InProgress);
        assert!(first.entered_at.is_some());
        assert_eq!(first.decisions.len(), 2);

        let second = inst.stage_state(1).unwrap();
        assert_eq!(second.status, StageStatus::Pending);
        assert!(second.entered_at.is_none());

        // Creation is in the history
        assert_eq!(inst.history.len(), 1);
        assert_eq!(inst.history[0].action, "created");
    }

    #[test]
    fn test_from_invalid_template_fails() {
        let empty = WorkflowTemplate::new("Empty");
        let result = ApprovalInstance::from_template(&empty, ContentId::new("c"), Utc::now());
        assert!(matches!(result, Err(ApprovalError::InvalidTemplate(_))));
    }

    #[test]
    fn test_snapshot_is_independent_of_template_edits() {
        let tpl = template();
        let inst =
            ApprovalInstance::from_template(&tpl, ContentId::new("post-1"), Utc::now()).unwrap();

        // A later "edit" of the template must not affect the instance.
        let edited = tpl.add_stage(
            StageDefinition::new(0, "Legal").with_approver(ApproverSpec::required("lawyer")),
        );
        assert_eq!(edited.stage_count(), 3);
        assert_eq!(inst.template_snapshot.len(), 2);
    }

    #[test]
    fn test_enter_stage_resets_clock() {
        let tpl = template();
        let mut inst =
            ApprovalInstance::from_template(&tpl, ContentId::new("post-1"), Utc::now()).unwrap();

        let later = Utc::now() + chrono::Duration::hours(2);
        inst.enter_stage(1, later);

        assert_eq!(inst.current_stage_index, 1);
        let stage = inst.current_stage_state().unwrap();
        assert_eq!(stage.status, StageStatus::InProgress);
        assert_eq!(stage.entered_at, Some(later));
    }

    #[test]
    fn test_finalize_is_terminal() {
        let tpl = template();
        let mut inst =
            ApprovalInstance::from_template(&tpl, ContentId::new("post-1"), Utc::now()).unwrap();

        inst.finalize(InstanceStatus::Rejected, Utc::now());
        assert!(inst.is_terminal());
        assert!(inst.completed_at.is_some());
        assert!(inst.require_open().is_err());
    }

    #[test]
    fn test_stage_state_decision_helpers() {
        let tpl = template();
        let mut inst =
            ApprovalInstance::from_template(&tpl, ContentId::new("post-1"), Utc::now()).unwrap();

        let stage = &mut inst.stage_states[0];
        assert_eq!(stage.pending_approvers().len(), 2);
        assert_eq!(stage.approved_count(), 0);

        stage.decisions.insert(
            ApproverId::new("a"),
            Decision::recorded(DecisionStatus::Approved, None, Utc::now()),
        );
        assert_eq!(stage.pending_approvers().len(), 1);
        assert_eq!(stage.approved_count(), 1);

        stage.reset_decisions();
        assert_eq!(stage.pending_approvers().len(), 2);
    }

    #[test]
    fn test_decision_status_terminal() {
        assert!(!DecisionStatus::Pending.is_terminal());
        assert!(DecisionStatus::Approved.is_terminal());
        assert!(DecisionStatus::Rejected.is_terminal());
        assert!(DecisionStatus::ChangesRequested.is_terminal());
    }

    #[test]
    fn test_priority_rank_ordering() {
        assert!(Priority::Urgent.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_instance_status_classification() {
        assert!(InstanceStatus::Pending.is_open());
        assert!(InstanceStatus::InProgress.is_open());
        assert!(InstanceStatus::Approved.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(InstanceStatus::ChangesRequested.is_terminal());
    }
}
