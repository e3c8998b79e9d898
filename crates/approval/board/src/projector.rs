//! Board building and manual moves
//!
//! `build_board` is a pure pass over instances; `move_card` translates
//! a drag-and-drop into an engine override. The projector validates
//! what it can against the instance it read (stale client state,
//! unknown or unreachable columns), then hands the resolved target to
//! the engine, which re-validates against committed state under the
//! same write discipline as decisions.

use crate::card::{compare_cards, KanbanCard};
use crate::config::{BoardConfig, KanbanColumn};
use approval_engine::{ApprovalEngine, MoveTarget};
use approval_sla::SlaStatus;
use approval_types::{
    ApprovalError, ApprovalInstance, ApprovalResult, ApproverId, InstanceId, InstanceStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One lane with its cards, ready for display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub id: String,
    pub name: String,
    pub color: String,
    pub order: u32,
    pub cards: Vec<KanbanCard>,
}

/// Card counts by lifecycle status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub approved: usize,
    pub rejected: usize,
    pub changes_requested: usize,
}

impl StatusCounts {
    fn record(&mut self, status: InstanceStatus) {
        match status {
            InstanceStatus::Pending => self.pending += 1,
            InstanceStatus::InProgress => self.in_progress += 1,
            InstanceStatus::Approved => self.approved += 1,
            InstanceStatus::Rejected => self.rejected += 1,
            InstanceStatus::ChangesRequested => self.changes_requested += 1,
        }
    }
}

/// One-pass rollup over every card on the board
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSummary {
    pub total: usize,
    pub by_status: StatusCounts,
    pub overdue: usize,
    pub at_risk: usize,
}

/// The complete derived board
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    pub summary: BoardSummary,
    pub generated_at: DateTime<Utc>,
}

/// Project instances onto the configured columns.
///
/// Open instances always appear; terminal ones appear while inside
/// the grace window. An instance whose state maps to no column is
/// left off the board.
pub fn build_board(
    instances: &[ApprovalInstance],
    config: &BoardConfig,
    now: DateTime<Utc>,
) -> Board {
    let mut columns: Vec<BoardColumn> = config
        .columns
        .iter()
        .map(|column| BoardColumn {
            id: column.id.clone(),
            name: column.name.clone(),
            color: column.color.clone(),
            order: column.order,
            cards: Vec::new(),
        })
        .collect();
    columns.sort_by_key(|c| c.order);

    let mut summary = BoardSummary::default();

    for instance in instances {
        if instance.is_terminal() && !config.within_grace(instance, now) {
            continue;
        }
        let Some(column) = config.derive_column(instance) else {
            continue;
        };
        let card = KanbanCard::from_instance(instance, column.id.clone(), now);

        summary.total += 1;
        summary.by_status.record(card.status);
        match card.sla.map(|view| view.status) {
            Some(SlaStatus::Overdue) => summary.overdue += 1,
            Some(SlaStatus::AtRisk) => summary.at_risk += 1,
            _ => {}
        }

        if let Some(lane) = columns.iter_mut().find(|c| c.id == card.column_id) {
            lane.cards.push(card);
        }
    }

    for lane in &mut columns {
        lane.cards.sort_by(compare_cards);
    }

    Board {
        columns,
        summary,
        generated_at: now,
    }
}

/// Validate a drag-and-drop against the instance as read.
///
/// Checks the client's idea of the source column against the derived
/// one (`StaleMove` otherwise) and resolves the destination column to
/// an engine move target. Destination legality relative to the
/// current stage is the engine's call.
pub fn validate_move(
    instance: &ApprovalInstance,
    config: &BoardConfig,
    from_column: &str,
    to_column: &str,
) -> ApprovalResult<MoveTarget> {
    let actual = config.derive_column(instance).ok_or_else(|| {
        ApprovalError::IllegalTransition("card is not on the board".to_string())
    })?;
    if actual.id != from_column {
        return Err(ApprovalError::StaleMove {
            expected: from_column.to_string(),
            actual: actual.id.clone(),
        });
    }
    if from_column == to_column {
        return Err(ApprovalError::IllegalTransition(format!(
            "card is already in column '{to_column}'"
        )));
    }

    let destination = config.column(to_column).ok_or_else(|| {
        ApprovalError::IllegalTransition(format!("unknown column: {to_column}"))
    })?;
    resolve_target(destination)
}

/// Map a destination column to the engine's move target
fn resolve_target(column: &KanbanColumn) -> ApprovalResult<MoveTarget> {
    let mapping = column.mappings.first().ok_or_else(|| {
        ApprovalError::IllegalTransition(format!("column '{}' accepts no cards", column.id))
    })?;

    match (mapping.status, mapping.stage_order) {
        (InstanceStatus::InProgress, Some(order)) => Ok(MoveTarget::Stage(order)),
        (InstanceStatus::Approved, _) => Ok(MoveTarget::Approved),
        (InstanceStatus::ChangesRequested, _) => Ok(MoveTarget::ChangesRequested),
        _ => Err(ApprovalError::IllegalTransition(format!(
            "cards cannot be moved into column '{}'",
            column.id
        ))),
    }
}

/// Apply a manual move end to end: load, validate, hand to the engine
pub async fn move_card(
    engine: &ApprovalEngine,
    config: &BoardConfig,
    id: &InstanceId,
    from_column: &str,
    to_column: &str,
    actor: Option<&ApproverId>,
) -> ApprovalResult<ApprovalInstance> {
    let instance = engine.get(id).await?;
    let target = validate_move(&instance, config, from_column, to_column)?;

    let moved = engine
        .apply_move(id, target, from_column, to_column, actor)
        .await?;
    tracing::info!(
        instance_id = %moved.id,
        from_column,
        to_column,
        "card moved manually"
    );
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{
        ApprovalPolicy, ApproverSpec, ContentId, DecisionStatus, Priority, StageDefinition,
        StageStatus, WorkflowTemplate,
    };
    use chrono::Duration;

    fn two_stage_template() -> WorkflowTemplate {
        WorkflowTemplate::new("Blog Review")
            .add_stage(
                StageDefinition::new(0, "Editorial")
                    .with_approver(ApproverSpec::required("alice"))
                    .with_approver(ApproverSpec::required("bob"))
                    .with_sla(3600),
            )
            .add_stage(
                StageDefinition::new(1, "Legal")
                    .with_policy(ApprovalPolicy::Any)
                    .with_approver(ApproverSpec::any("carol")),
            )
    }

    fn instance_with_priority(priority: Priority) -> ApprovalInstance {
        ApprovalInstance::from_template(
            &two_stage_template(),
            ContentId::new("post"),
            Utc::now(),
        )
        .unwrap()
        .with_priority(priority)
    }

    #[test]
    fn test_build_board_groups_and_counts() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let now = Utc::now();

        let fresh = instance_with_priority(Priority::Low);
        let urgent = instance_with_priority(Priority::Urgent);
        let mut advanced = instance_with_priority(Priority::Medium);
        advanced.enter_stage(1, now);
        let mut rejected = instance_with_priority(Priority::Medium);
        rejected.finalize(InstanceStatus::Rejected, now);

        let board = build_board(&[fresh.clone(), urgent.clone(), advanced, rejected], &config, now);

        let stage0 = board.columns.iter().find(|c| c.id == "stage-0").unwrap();
        assert_eq!(stage0.cards.len(), 2);
        // Urgent outranks low within the lane.
        assert_eq!(stage0.cards[0].card_id, urgent.id);
        assert_eq!(stage0.cards[1].card_id, fresh.id);

        assert_eq!(board.summary.total, 4);
        assert_eq!(board.summary.by_status.in_progress, 3);
        assert_eq!(board.summary.by_status.rejected, 1);
        assert_eq!(board.summary.overdue, 0);
    }

    #[test]
    fn test_build_board_flags_overdue_and_drops_expired_terminal() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let created = Utc::now();

        let slow = instance_with_priority(Priority::Medium);
        let mut expired = instance_with_priority(Priority::Medium);
        expired.finalize(InstanceStatus::Approved, created);

        // Two hours against a one-hour SLA; far past the grace window.
        let later = created + Duration::seconds(config.terminal_grace_secs as i64 + 7200);
        let board = build_board(&[slow, expired], &config, later);

        assert_eq!(board.summary.total, 1);
        assert_eq!(board.summary.overdue, 1);
        assert!(board
            .columns
            .iter()
            .find(|c| c.id == "approved")
            .unwrap()
            .cards
            .is_empty());
    }

    #[test]
    fn test_validate_move_rejects_stale_source() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let instance = instance_with_priority(Priority::Medium);

        let err = validate_move(&instance, &config, "stage-1", "approved").unwrap_err();
        assert!(matches!(err, ApprovalError::StaleMove { .. }));
    }

    #[test]
    fn test_validate_move_rejects_unknown_and_rejected_destinations() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let instance = instance_with_priority(Priority::Medium);

        let err = validate_move(&instance, &config, "stage-0", "archive").unwrap_err();
        assert!(matches!(err, ApprovalError::IllegalTransition(_)));

        // Rejection requires an approver's decision, not a drag.
        let err = validate_move(&instance, &config, "stage-0", "rejected").unwrap_err();
        assert!(matches!(err, ApprovalError::IllegalTransition(_)));
    }

    #[tokio::test]
    async fn test_move_card_to_approved_is_refused_with_stage_undecided() {
        let engine = ApprovalEngine::in_memory();
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let instance = engine
            .create(&template, ContentId::new("post-1"))
            .await
            .unwrap();

        let err = move_card(&engine, &config, &instance.id, "stage-0", "approved", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::IllegalTransition(_)));

        // Nothing moved: same column, same stage state, SLA clock intact.
        let unchanged = engine.get(&instance.id).await.unwrap();
        assert_eq!(unchanged.current_stage_index, 0);
        assert_eq!(unchanged.version, instance.version);
        assert_eq!(
            unchanged.stage_states[0].entered_at,
            instance.stage_states[0].entered_at
        );
    }

    #[tokio::test]
    async fn test_move_card_forward_and_back_to_changes_requested() {
        let engine = ApprovalEngine::in_memory();
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let instance = engine
            .create(&template, ContentId::new("post-1"))
            .await
            .unwrap();
        let admin = ApproverId::new("admin");

        let moved = move_card(
            &engine,
            &config,
            &instance.id,
            "stage-0",
            "stage-1",
            Some(&admin),
        )
        .await
        .unwrap();
        assert_eq!(moved.current_stage_index, 1);
        assert_eq!(moved.stage_states[0].status, StageStatus::Skipped);

        let sent_back = move_card(
            &engine,
            &config,
            &instance.id,
            "stage-1",
            "changes_requested",
            Some(&admin),
        )
        .await
        .unwrap();
        assert_eq!(sent_back.status, InstanceStatus::ChangesRequested);
        assert!(sent_back.history.iter().any(|h| h.action == "manual_move"));
        assert!(sent_back.stage_states[1]
            .decisions
            .values()
            .all(|d| d.status == DecisionStatus::Pending));
    }
}
