//! The approval engine: authoritative state transitions
//!
//! Every transition follows the same shape: load the instance,
//! validate the request against the loaded state, mutate, commit
//! through the store's version check, then dispatch events. A
//! conflicting concurrent write restarts the whole cycle against
//! fresh state, so validation always runs against what was actually
//! committed.

use crate::policy;
use crate::sink::EventSink;
use crate::store::InstanceStore;
use approval_sla::{auto_approve_due, compute_sla, SlaStatus};
use approval_types::{
    ApprovalError, ApprovalEvent, ApprovalInstance, ApprovalResult, ApproverId, ContentId,
    Decision, DecisionStatus, EventKind, InstanceId, InstanceStatus, Priority, StageStatus,
    WorkflowTemplate,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Retries after a version conflict before giving up
const MAX_UPDATE_RETRIES: u32 = 3;

/// Interval between auto-approval sweeps
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Where a manual board move lands, as resolved by the caller's
/// column mapping
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    /// Enter the stage with this order (one forward or one back)
    Stage(u32),
    /// Terminal approval; allowed only from the final stage
    Approved,
    /// Terminal changes-requested; allowed from any stage
    ChangesRequested,
}

/// Outcome of a transition closure
enum Mutation {
    /// Nothing to persist; the loaded instance is returned as-is
    Unchanged,
    /// Persist the mutated instance and dispatch these events
    Applied(Vec<EventKind>),
}

/// The single writer for approval instances
pub struct ApprovalEngine {
    store: Arc<dyn InstanceStore>,
    sink: Arc<dyn EventSink>,
}

impl ApprovalEngine {
    pub fn new(store: Arc<dyn InstanceStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Engine over the in-memory store, discarding events
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(crate::store::InMemoryInstanceStore::new()),
            Arc::new(crate::sink::NullEventSink),
        )
    }

    // ── Lifecycle operations ─────────────────────────────────────────

    /// Create an instance from a template with default priority
    pub async fn create(
        &self,
        template: &WorkflowTemplate,
        content_id: ContentId,
    ) -> ApprovalResult<ApprovalInstance> {
        self.create_with_priority(template, content_id, Priority::default())
            .await
    }

    /// Create an instance from a template
    pub async fn create_with_priority(
        &self,
        template: &WorkflowTemplate,
        content_id: ContentId,
        priority: Priority,
    ) -> ApprovalResult<ApprovalInstance> {
        let instance = ApprovalInstance::from_template(template, content_id, Utc::now())?
            .with_priority(priority);
        let stored = self.store.insert(instance).await?;
        tracing::info!(
            instance_id = %stored.id,
            template_id = %stored.template_id,
            content_id = %stored.content_id,
            "approval instance created"
        );
        Ok(stored)
    }

    /// Record one approver's decision on the current stage.
    ///
    /// An approving decision advances the stage when the completion
    /// policy is satisfied; a rejection or change request terminates
    /// the instance. Decisions are permanent: a second decision from
    /// the same approver fails with `AlreadyDecided`.
    pub async fn submit_decision(
        &self,
        id: &InstanceId,
        approver: &ApproverId,
        status: DecisionStatus,
        comment: Option<String>,
    ) -> ApprovalResult<ApprovalInstance> {
        self.transition(id, Some(approver), |instance| {
            apply_decision(instance, approver, status, comment.clone(), Utc::now())
        })
        .await
        .map(|(instance, _)| instance)
    }

    /// Advance the current stage if its auto-approval timer elapsed
    /// at `now`. A no-op (including on terminal instances) returns the
    /// instance unchanged.
    pub async fn auto_approve_check(
        &self,
        id: &InstanceId,
        now: DateTime<Utc>,
    ) -> ApprovalResult<ApprovalInstance> {
        self.transition(id, None, |instance| apply_auto_approve(instance, now))
            .await
            .map(|(instance, _)| instance)
    }

    /// Run the auto-approval timer over every open instance.
    ///
    /// Returns the ids that advanced. A failure on one instance is
    /// logged and does not stop the sweep.
    pub async fn sweep_auto_approvals(
        &self,
        now: DateTime<Utc>,
    ) -> ApprovalResult<Vec<InstanceId>> {
        let open = self.store.list_open().await?;
        let mut advanced = Vec::new();

        for candidate in open {
            let index = candidate.current_stage_index;
            let due = match (candidate.stage_state(index), candidate.stage_def(index)) {
                (Some(state), Some(def)) => auto_approve_due(state, def, now),
                _ => false,
            };
            if !due {
                continue;
            }
            match self
                .transition(&candidate.id, None, |instance| {
                    apply_auto_approve(instance, now)
                })
                .await
            {
                Ok((updated, true)) => advanced.push(updated.id),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(instance_id = %candidate.id, %error, "auto-approval failed");
                }
            }
        }

        if !advanced.is_empty() {
            tracing::info!(count = advanced.len(), "auto-approval sweep advanced instances");
        }
        Ok(advanced)
    }

    /// Run the sweep forever at `SWEEP_INTERVAL_SECS`
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if let Err(error) = self.sweep_auto_approvals(Utc::now()).await {
                tracing::warn!(%error, "auto-approval sweep failed");
            }
        }
    }

    /// Add each overdue stage's escalation approver.
    ///
    /// The escalation target gets a pending decision slot on the
    /// current stage and can decide like any other approver. Each
    /// stage escalates at most once; the sweep is safe to re-run.
    pub async fn escalate_overdue(&self, now: DateTime<Utc>) -> ApprovalResult<Vec<InstanceId>> {
        let open = self.store.list_open().await?;
        let mut escalated = Vec::new();

        for candidate in open {
            let index = candidate.current_stage_index;
            let needed = match (candidate.stage_state(index), candidate.stage_def(index)) {
                (Some(state), Some(def)) => {
                    def.escalate_to.is_some()
                        && matches!(
                            compute_sla(state, def, now),
                            Some(view) if view.status == SlaStatus::Overdue
                        )
                }
                _ => false,
            };
            if !needed {
                continue;
            }
            match self
                .transition(&candidate.id, None, |instance| {
                    apply_escalation(instance, now)
                })
                .await
            {
                Ok((updated, true)) => escalated.push(updated.id),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(instance_id = %candidate.id, %error, "escalation failed");
                }
            }
        }

        Ok(escalated)
    }

    /// Start a fresh review round after changes were requested.
    ///
    /// Creates a new instance from the old one's snapshot, linked via
    /// `previous_instance_id`. The old instance stays terminal.
    pub async fn resubmit(&self, id: &InstanceId) -> ApprovalResult<ApprovalInstance> {
        let previous = self.get(id).await?;
        if previous.status != InstanceStatus::ChangesRequested {
            return Err(ApprovalError::ActionNotAllowed(
                "resubmission requires a changes_requested instance".to_string(),
            ));
        }

        let instance = ApprovalInstance::resubmission_of(&previous, Utc::now());
        let stored = self.store.insert(instance).await?;
        tracing::info!(
            instance_id = %stored.id,
            previous_instance_id = %previous.id,
            "instance resubmitted"
        );
        Ok(stored)
    }

    /// Apply a manual board move.
    ///
    /// The board resolves the drop column to a `MoveTarget`; the
    /// engine validates it against committed state. Allowed moves:
    /// one stage forward (the bypassed stage is marked skipped), one
    /// stage back (the destination's decisions reset for a fresh
    /// round), any stage to changes-requested, and the final stage to
    /// approved. Everything else is an `IllegalTransition`.
    pub async fn apply_move(
        &self,
        id: &InstanceId,
        target: MoveTarget,
        from_column: &str,
        to_column: &str,
        actor: Option<&ApproverId>,
    ) -> ApprovalResult<ApprovalInstance> {
        self.transition(id, actor, |instance| {
            apply_manual_move(instance, target, from_column, to_column, actor, Utc::now())
        })
        .await
        .map(|(instance, _)| instance)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch one instance
    pub async fn get(&self, id: &InstanceId) -> ApprovalResult<ApprovalInstance> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApprovalError::InstanceNotFound(id.clone()))
    }

    /// Every open instance, oldest first
    pub async fn list_open(&self) -> ApprovalResult<Vec<ApprovalInstance>> {
        self.store.list_open().await
    }

    /// Every instance, oldest first
    pub async fn list_all(&self) -> ApprovalResult<Vec<ApprovalInstance>> {
        self.store.list_all().await
    }

    // ── Transition plumbing ──────────────────────────────────────────

    /// Load-validate-mutate-commit cycle with conflict retries.
    ///
    /// The closure must be re-runnable: on a version conflict it is
    /// invoked again against freshly loaded state, so a request that
    /// became invalid in the meantime fails with the right error
    /// instead of clobbering the concurrent write.
    ///
    /// The returned flag is true only when THIS call committed a
    /// write; a no-op returns the loaded instance untouched, however
    /// many concurrent writers have moved it since the caller looked.
    async fn transition<F>(
        &self,
        id: &InstanceId,
        actor: Option<&ApproverId>,
        op: F,
    ) -> ApprovalResult<(ApprovalInstance, bool)>
    where
        F: Fn(&mut ApprovalInstance) -> ApprovalResult<Mutation>,
    {
        let mut attempt = 0;
        loop {
            let mut instance = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| ApprovalError::InstanceNotFound(id.clone()))?;

            let kinds = match op(&mut instance)? {
                Mutation::Unchanged => return Ok((instance, false)),
                Mutation::Applied(kinds) => kinds,
            };

            match self.store.update(instance).await {
                Ok(stored) => {
                    self.dispatch(&stored, kinds, actor).await;
                    return Ok((stored, true));
                }
                Err(ApprovalError::ConcurrencyConflict(_)) if attempt < MAX_UPDATE_RETRIES => {
                    attempt += 1;
                    tracing::debug!(
                        instance_id = %id,
                        attempt,
                        "version conflict, retrying transition"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Publish events for a committed transition. Sink failures are
    /// logged, never propagated: the transition already happened.
    async fn dispatch(
        &self,
        instance: &ApprovalInstance,
        kinds: Vec<EventKind>,
        actor: Option<&ApproverId>,
    ) {
        for kind in kinds {
            let event = ApprovalEvent::new(instance.id.clone(), kind, actor.cloned());
            if let Err(error) = self.sink.publish(&event).await {
                tracing::warn!(
                    instance_id = %instance.id,
                    %error,
                    "event sink failed; transition already committed"
                );
            }
        }
    }
}

// ── Transition bodies ────────────────────────────────────────────────

fn apply_decision(
    instance: &mut ApprovalInstance,
    approver: &ApproverId,
    status: DecisionStatus,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> ApprovalResult<Mutation> {
    instance.require_open()?;
    if status == DecisionStatus::Pending {
        return Err(ApprovalError::ActionNotAllowed(
            "a decision must approve, reject, or request changes".to_string(),
        ));
    }

    let index = instance.current_stage_index;
    let definition = instance
        .stage_def(index)
        .cloned()
        .ok_or_else(|| ApprovalError::Storage(format!("stage {index} missing from snapshot")))?;

    let on_current = instance
        .stage_state(index)
        .map(|s| s.decisions.contains_key(approver))
        .unwrap_or(false);
    if !on_current {
        return record_late_approval(instance, approver, status, comment, now);
    }

    if let Some(existing) = instance.stage_state(index).and_then(|s| s.decision(approver)) {
        if existing.status.is_terminal() {
            return Err(ApprovalError::AlreadyDecided(approver.clone()));
        }
    }

    match status {
        DecisionStatus::Rejected if !definition.can_reject => {
            return Err(ApprovalError::ActionNotAllowed(format!(
                "stage '{}' does not allow rejection",
                definition.name
            )));
        }
        DecisionStatus::ChangesRequested if !definition.can_request_changes => {
            return Err(ApprovalError::ActionNotAllowed(format!(
                "stage '{}' does not allow change requests",
                definition.name
            )));
        }
        _ => {}
    }

    if let Some(stage) = instance.stage_states.get_mut(index as usize) {
        stage.decisions.insert(
            approver.clone(),
            Decision::recorded(status, comment.clone(), now),
        );
    }

    match status {
        DecisionStatus::Approved => {
            instance.record_history("approved", Some(approver.clone()), Some(index), comment, now);
            let satisfied = instance
                .stage_state(index)
                .map(|state| policy::stage_satisfied(&definition, state))
                .unwrap_or(false);
            if satisfied {
                Ok(Mutation::Applied(advance(instance, index, now)))
            } else {
                Ok(Mutation::Applied(Vec::new()))
            }
        }
        DecisionStatus::Rejected => {
            if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                stage.complete(StageStatus::Rejected, now);
            }
            instance.finalize(InstanceStatus::Rejected, now);
            instance.record_history("rejected", Some(approver.clone()), Some(index), comment, now);
            Ok(Mutation::Applied(vec![EventKind::Rejected]))
        }
        DecisionStatus::ChangesRequested => {
            if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                stage.complete(StageStatus::ChangesRequested, now);
            }
            instance.finalize(InstanceStatus::ChangesRequested, now);
            instance.record_history(
                "changes_requested",
                Some(approver.clone()),
                Some(index),
                comment,
                now,
            );
            Ok(Mutation::Applied(vec![EventKind::ChangesRequested]))
        }
        DecisionStatus::Pending => Err(ApprovalError::ActionNotAllowed(
            "a decision must approve, reject, or request changes".to_string(),
        )),
    }
}

/// Accept an approval that raced a concurrent advancement.
///
/// When an `Any` or `Majority` stage completes while a second approver
/// is mid-decision, that approver still holds a pending slot on the
/// now-approved stage. The late approval is recorded for the audit
/// trail without re-advancing anything. Late rejections are refused:
/// the stage outcome is already committed.
fn record_late_approval(
    instance: &mut ApprovalInstance,
    approver: &ApproverId,
    status: DecisionStatus,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> ApprovalResult<Mutation> {
    let late_order = (status == DecisionStatus::Approved)
        .then(|| {
            instance
                .stage_states
                .iter()
                .find(|s| {
                    s.status == StageStatus::Approved
                        && matches!(
                            s.decision(approver),
                            Some(d) if d.status == DecisionStatus::Pending
                        )
                })
                .map(|s| s.stage_order)
        })
        .flatten();

    match late_order {
        Some(order) => {
            if let Some(stage) = instance.stage_states.get_mut(order as usize) {
                stage.decisions.insert(
                    approver.clone(),
                    Decision::recorded(status, comment.clone(), now),
                );
            }
            instance.record_history("approved", Some(approver.clone()), Some(order), comment, now);
            Ok(Mutation::Applied(Vec::new()))
        }
        None => Err(ApprovalError::NotAnApprover(approver.clone())),
    }
}

/// Complete stage `index` as approved and move on: enter the next
/// stage, or finalize the instance when `index` is the final stage.
fn advance(instance: &mut ApprovalInstance, index: u32, now: DateTime<Utc>) -> Vec<EventKind> {
    if let Some(stage) = instance.stage_states.get_mut(index as usize) {
        stage.complete(StageStatus::Approved, now);
    }

    if instance.is_final_stage(index) {
        instance.finalize(InstanceStatus::Approved, now);
        instance.record_history("completed", None, Some(index), None, now);
        vec![EventKind::Approved]
    } else {
        let next = index + 1;
        instance.enter_stage(next, now);
        instance.record_history("stage_advanced", None, Some(next), None, now);
        vec![EventKind::StageAdvanced {
            from_stage: index,
            to_stage: next,
        }]
    }
}

fn apply_auto_approve(
    instance: &mut ApprovalInstance,
    now: DateTime<Utc>,
) -> ApprovalResult<Mutation> {
    if !instance.is_open() {
        return Ok(Mutation::Unchanged);
    }

    let index = instance.current_stage_index;
    let Some(definition) = instance.stage_def(index).cloned() else {
        return Ok(Mutation::Unchanged);
    };
    let due = instance
        .stage_state(index)
        .map(|state| auto_approve_due(state, &definition, now))
        .unwrap_or(false);
    if !due {
        return Ok(Mutation::Unchanged);
    }

    // Synthesize approvals for the outstanding required approvers
    // only; advisory slots stay undecided in the audit trail. The
    // elapsed timer completes the stage regardless of policy.
    let required: Vec<ApproverId> = definition
        .required_approvers()
        .iter()
        .map(|spec| spec.approver_id.clone())
        .collect();
    if let Some(stage) = instance.stage_states.get_mut(index as usize) {
        for id in &required {
            if let Some(decision) = stage.decisions.get_mut(id) {
                if decision.status == DecisionStatus::Pending {
                    *decision = Decision::auto_approved(now);
                }
            }
        }
    }
    instance.record_history("auto_approved", None, Some(index), None, now);
    Ok(Mutation::Applied(advance(instance, index, now)))
}

fn apply_escalation(
    instance: &mut ApprovalInstance,
    now: DateTime<Utc>,
) -> ApprovalResult<Mutation> {
    if !instance.is_open() {
        return Ok(Mutation::Unchanged);
    }

    let index = instance.current_stage_index;
    let Some(definition) = instance.stage_def(index).cloned() else {
        return Ok(Mutation::Unchanged);
    };
    let Some(target) = definition.escalate_to.clone() else {
        return Ok(Mutation::Unchanged);
    };

    let overdue = instance
        .stage_state(index)
        .map(|state| {
            matches!(
                compute_sla(state, &definition, now),
                Some(view) if view.status == SlaStatus::Overdue
            )
        })
        .unwrap_or(false);
    if !overdue {
        return Ok(Mutation::Unchanged);
    }

    let Some(stage) = instance.stage_states.get_mut(index as usize) else {
        return Ok(Mutation::Unchanged);
    };
    if stage.escalated_to.contains(&target) || stage.decisions.contains_key(&target) {
        return Ok(Mutation::Unchanged);
    }

    stage.escalated_to.push(target.clone());
    stage.decisions.insert(target.clone(), Decision::pending());
    instance.record_history(
        "escalated",
        None,
        Some(index),
        Some(format!("escalated to {target}")),
        now,
    );
    Ok(Mutation::Applied(vec![EventKind::Escalated { stage: index }]))
}

fn apply_manual_move(
    instance: &mut ApprovalInstance,
    target: MoveTarget,
    from_column: &str,
    to_column: &str,
    actor: Option<&ApproverId>,
    now: DateTime<Utc>,
) -> ApprovalResult<Mutation> {
    instance.require_open()?;
    let index = instance.current_stage_index;

    match target {
        MoveTarget::Stage(order) => {
            if order == index + 1 && instance.stage_def(order).is_some() {
                // Skip ahead: the bypassed stage stays in the record
                // as skipped, not approved.
                if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                    stage.complete(StageStatus::Skipped, now);
                }
                instance.enter_stage(order, now);
            } else if index > 0 && order + 1 == index {
                // One column back: the current stage returns to
                // pending and the destination starts a fresh round.
                // History keeps the first round's decisions.
                if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                    stage.status = StageStatus::Pending;
                    stage.entered_at = None;
                    stage.completed_at = None;
                }
                if let Some(stage) = instance.stage_states.get_mut(order as usize) {
                    stage.reset_decisions();
                }
                instance.enter_stage(order, now);
            } else {
                return Err(ApprovalError::IllegalTransition(format!(
                    "cannot move from stage {index} to stage {order}"
                )));
            }
        }
        MoveTarget::Approved => {
            if !instance.is_final_stage(index) {
                return Err(ApprovalError::IllegalTransition(
                    "only the final stage can be moved straight to approved".to_string(),
                ));
            }
            if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                stage.complete(StageStatus::Skipped, now);
            }
            instance.finalize(InstanceStatus::Approved, now);
        }
        MoveTarget::ChangesRequested => {
            if let Some(stage) = instance.stage_states.get_mut(index as usize) {
                stage.complete(StageStatus::ChangesRequested, now);
            }
            instance.finalize(InstanceStatus::ChangesRequested, now);
        }
    }

    let landed_at = instance.current_stage_index;
    instance.record_history(
        "manual_move",
        actor.cloned(),
        Some(landed_at),
        Some(format!("{from_column} -> {to_column}")),
        now,
    );
    Ok(Mutation::Applied(vec![EventKind::ManualMove {
        from_column: from_column.to_string(),
        to_column: to_column.to_string(),
    }]))
}
