//! Workflow templates: reusable approval process definitions
//!
//! A template is an ordered sequence of stages. Each stage names its
//! approvers, the policy that completes it (all/any/majority), and
//! optional timers (auto-approval, SLA). Templates are immutable once
//! published: instances snapshot the stages at creation time, so a
//! later template edit never retroactively alters an in-flight
//! approval.

use crate::{ApprovalError, ApprovalResult, ApproverId, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ── Approvers ────────────────────────────────────────────────────────

/// How an approver's decision weighs into stage completion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    /// Decision is necessary under the `All` policy and counts toward
    /// the `Majority` denominator
    #[default]
    Required,
    /// Counts toward the `Majority` denominator but is never necessary
    Any,
    /// Excluded from the `Majority` denominator; advisory only
    Optional,
}

/// One approver slot on a stage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverSpec {
    /// Identity reference, resolved by the identity collaborator
    pub approver_id: ApproverId,
    /// How this approver's decision weighs in
    pub role: ApproverRole,
}

impl ApproverSpec {
    /// A required approver
    pub fn required(approver_id: impl Into<String>) -> Self {
        Self {
            approver_id: ApproverId::new(approver_id),
            role: ApproverRole::Required,
        }
    }

    /// An approver who counts but is never individually necessary
    pub fn any(approver_id: impl Into<String>) -> Self {
        Self {
            approver_id: ApproverId::new(approver_id),
            role: ApproverRole::Any,
        }
    }

    /// An advisory approver, excluded from majority counts
    pub fn optional(approver_id: impl Into<String>) -> Self {
        Self {
            approver_id: ApproverId::new(approver_id),
            role: ApproverRole::Optional,
        }
    }

    /// Whether this approver counts toward the majority denominator
    pub fn is_eligible(&self) -> bool {
        self.role != ApproverRole::Optional
    }
}

// ── Completion Policy ────────────────────────────────────────────────

/// The policy determining when a stage's collected decisions satisfy
/// advancement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Every `required` approver must approve
    #[default]
    All,
    /// One approving decision (any role) suffices
    Any,
    /// More than half of the eligible approvers must approve
    Majority,
}

// ── Stage Definition ─────────────────────────────────────────────────

/// One sequential checkpoint in a workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Position in the template (contiguous, 0-based)
    pub order: u32,
    /// Display name ("Internal Review", "Client Approval", ...)
    pub name: String,
    /// Who decides at this stage
    pub approvers: Vec<ApproverSpec>,
    /// When collected decisions complete the stage
    pub approval_type: ApprovalPolicy,
    /// Whether the stage approves itself after a timeout
    pub auto_approve: bool,
    /// Auto-approval timeout in seconds (required when `auto_approve`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve_after_secs: Option<u64>,
    /// Whether approvers may reject (terminal for the whole instance)
    pub can_reject: bool,
    /// Whether approvers may request changes (terminal; resubmission
    /// creates a new instance)
    pub can_request_changes: bool,
    /// Per-stage time budget in seconds; unset means no SLA tracked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_secs: Option<u64>,
    /// Identity to add as an approver when the SLA goes overdue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalate_to: Option<ApproverId>,
}

impl StageDefinition {
    /// Create a stage with defaults: `All` policy, reject and
    /// change-request allowed, no timers
    pub fn new(order: u32, name: impl Into<String>) -> Self {
        Self {
            order,
            name: name.into(),
            approvers: Vec::new(),
            approval_type: ApprovalPolicy::All,
            auto_approve: false,
            auto_approve_after_secs: None,
            can_reject: true,
            can_request_changes: true,
            sla_secs: None,
            escalate_to: None,
        }
    }

    pub fn with_approver(mut self, approver: ApproverSpec) -> Self {
        self.approvers.push(approver);
        self
    }

    pub fn with_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_type = policy;
        self
    }

    pub fn with_auto_approve(mut self, after_secs: u64) -> Self {
        self.auto_approve = true;
        self.auto_approve_after_secs = Some(after_secs);
        self
    }

    pub fn with_sla(mut self, sla_secs: u64) -> Self {
        self.sla_secs = Some(sla_secs);
        self
    }

    pub fn with_escalation(mut self, escalate_to: impl Into<String>) -> Self {
        self.escalate_to = Some(ApproverId::new(escalate_to));
        self
    }

    pub fn without_reject(mut self) -> Self {
        self.can_reject = false;
        self
    }

    pub fn without_change_requests(mut self) -> Self {
        self.can_request_changes = false;
        self
    }

    /// The approver spec for an identity, if present on this stage
    pub fn approver(&self, id: &ApproverId) -> Option<&ApproverSpec> {
        self.approvers.iter().find(|a| &a.approver_id == id)
    }

    /// Approvers counted in the majority denominator (non-optional)
    pub fn eligible_approvers(&self) -> Vec<&ApproverSpec> {
        self.approvers.iter().filter(|a| a.is_eligible()).collect()
    }

    /// Approvers whose decision is necessary under the `All` policy
    pub fn required_approvers(&self) -> Vec<&ApproverSpec> {
        self.approvers
            .iter()
            .filter(|a| a.role == ApproverRole::Required)
            .collect()
    }
}

// ── Template Settings ────────────────────────────────────────────────

/// Template-wide behavior switches
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSettings {
    /// Whether approvers in one stage may act in parallel
    pub allow_parallel_approvals: bool,
    /// Whether every stage must complete (vs allowing configured skips)
    pub require_all_stages: bool,
    /// Whether the content creator may edit while under review
    pub allow_creator_edit: bool,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            allow_parallel_approvals: true,
            require_all_stages: true,
            allow_creator_edit: false,
        }
    }
}

// ── Workflow Template ────────────────────────────────────────────────

/// A reusable approval workflow definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Unique template identifier
    pub id: TemplateId,
    /// Display name
    pub name: String,
    /// Ordered stages (contiguous `order` starting at 0)
    pub stages: Vec<StageDefinition>,
    /// Template-wide settings
    pub settings: TemplateSettings,
    /// When the template was created
    pub created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Create an empty template (add stages before publishing)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TemplateId::generate(),
            name: name.into(),
            stages: Vec::new(),
            settings: TemplateSettings::default(),
            created_at: Utc::now(),
        }
    }

    /// Append a stage, assigning the next contiguous order
    pub fn add_stage(mut self, mut stage: StageDefinition) -> Self {
        stage.order = self.stages.len() as u32;
        self.stages.push(stage);
        self
    }

    pub fn with_settings(mut self, settings: TemplateSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The stage definition at a given order
    pub fn stage(&self, order: u32) -> Option<&StageDefinition> {
        self.stages.get(order as usize)
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Whether `order` is the final stage
    pub fn is_final_stage(&self, order: u32) -> bool {
        order as usize + 1 == self.stages.len()
    }

    /// Validate the template for publication.
    ///
    /// Checks: at least one stage; contiguous 0-based orders; every
    /// stage has at least one approver with no duplicates; auto-approve
    /// stages carry a timeout.
    pub fn validate(&self) -> ApprovalResult<()> {
        if self.stages.is_empty() {
            return Err(ApprovalError::InvalidTemplate(
                "template has no stages".into(),
            ));
        }

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.order != index as u32 {
                return Err(ApprovalError::InvalidTemplate(format!(
                    "stage '{}' has order {}, expected {}",
                    stage.name, stage.order, index
                )));
            }

            if stage.approvers.is_empty() {
                return Err(ApprovalError::InvalidTemplate(format!(
                    "stage '{}' has no approvers",
                    stage.name
                )));
            }

            let mut seen = HashSet::new();
            for approver in &stage.approvers {
                if !seen.insert(&approver.approver_id) {
                    return Err(ApprovalError::InvalidTemplate(format!(
                        "stage '{}' lists approver '{}' twice",
                        stage.name, approver.approver_id
                    )));
                }
            }

            if stage.auto_approve && stage.auto_approve_after_secs.is_none() {
                return Err(ApprovalError::InvalidTemplate(format!(
                    "stage '{}' enables auto-approve without a timeout",
                    stage.name
                )));
            }
        }

        Ok(())
    }
}
