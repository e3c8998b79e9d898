//! Deadline computation and classification for the active stage

use approval_types::{StageDefinition, StageState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fraction of the SLA window that counts as the at-risk tail
const AT_RISK_FRACTION: f64 = 0.25;

/// SLA classification of an active stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    /// More than a quarter of the window remains
    OnTime,
    /// Inside the last quarter of the window
    AtRisk,
    /// Past the deadline
    Overdue,
}

/// The derived SLA view attached to a Kanban card
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaView {
    /// Classification at the evaluation instant
    pub status: SlaStatus,
    /// The full window in hours
    pub target_hours: f64,
    /// When the window closes
    pub deadline: DateTime<Utc>,
    /// Hours until the deadline (negative once overdue)
    pub hours_remaining: f64,
}

/// Compute the SLA view for a stage at `now`.
///
/// Returns `None` when the stage has no SLA configured or has not been
/// entered yet. Classification: `Overdue` past the deadline, `AtRisk`
/// inside the last quarter of the window, `OnTime` otherwise.
pub fn compute_sla(
    stage: &StageState,
    definition: &StageDefinition,
    now: DateTime<Utc>,
) -> Option<SlaView> {
    let sla_secs = definition.sla_secs?;
    let entered_at = stage.entered_at?;

    let deadline = entered_at + Duration::seconds(sla_secs as i64);
    let target_hours = sla_secs as f64 / 3600.0;
    let hours_remaining = (deadline - now).num_seconds() as f64 / 3600.0;

    let status = if hours_remaining < 0.0 {
        SlaStatus::Overdue
    } else if hours_remaining < target_hours * AT_RISK_FRACTION {
        SlaStatus::AtRisk
    } else {
        SlaStatus::OnTime
    };

    Some(SlaView {
        status,
        target_hours,
        deadline,
        hours_remaining,
    })
}

/// Whether the auto-approval timer for a stage has elapsed at `now`.
///
/// False when the stage does not auto-approve or has not been entered.
pub fn auto_approve_due(
    stage: &StageState,
    definition: &StageDefinition,
    now: DateTime<Utc>,
) -> bool {
    if !definition.auto_approve {
        return false;
    }
    let (Some(after_secs), Some(entered_at)) =
        (definition.auto_approve_after_secs, stage.entered_at)
    else {
        return false;
    };
    now.signed_duration_since(entered_at).num_seconds() >= after_secs as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::ApproverSpec;

    fn stage_with_sla(sla_secs: Option<u64>, entered_hours_ago: i64) -> (StageState, StageDefinition) {
        let mut def = StageDefinition::new(0, "Review").with_approver(ApproverSpec::required("a"));
        def.sla_secs = sla_secs;

        let mut state = StageState::from_definition(&def);
        state.enter(Utc::now() - Duration::hours(entered_hours_ago));
        (state, def)
    }

    #[test]
    fn test_no_sla_configured() {
        let (state, def) = stage_with_sla(None, 1);
        assert!(compute_sla(&state, &def, Utc::now()).is_none());
    }

    #[test]
    fn test_stage_not_entered() {
        let def = StageDefinition::new(0, "Review")
            .with_approver(ApproverSpec::required("a"))
            .with_sla(3600);
        let state = StageState::from_definition(&def);
        assert!(compute_sla(&state, &def, Utc::now()).is_none());
    }

    #[test]
    fn test_on_time() {
        // 24h window, 1h elapsed
        let (state, def) = stage_with_sla(Some(86_400), 1);
        let view = compute_sla(&state, &def, Utc::now()).unwrap();
        assert_eq!(view.status, SlaStatus::OnTime);
        assert!(view.hours_remaining > 22.0);
        assert!((view.target_hours - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_at_risk_in_last_quarter() {
        // 24h window, 19h elapsed: 5h remaining < 6h threshold
        let (state, def) = stage_with_sla(Some(86_400), 19);
        let view = compute_sla(&state, &def, Utc::now()).unwrap();
        assert_eq!(view.status, SlaStatus::AtRisk);
    }

    #[test]
    fn test_overdue() {
        // 24h window, 25h elapsed
        let (state, def) = stage_with_sla(Some(86_400), 25);
        let view = compute_sla(&state, &def, Utc::now()).unwrap();
        assert_eq!(view.status, SlaStatus::Overdue);
        assert!(view.hours_remaining < 0.0);
    }

    #[test]
    fn test_deterministic() {
        let (state, def) = stage_with_sla(Some(86_400), 3);
        let now = Utc::now();
        let first = compute_sla(&state, &def, now).unwrap();
        let second = compute_sla(&state, &def, now).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reentering_resets_window() {
        let (mut state, def) = stage_with_sla(Some(86_400), 23);
        let now = Utc::now();
        let before = compute_sla(&state, &def, now).unwrap();
        assert_eq!(before.status, SlaStatus::AtRisk);

        // A fresh entry restores the full window.
        state.enter(now);
        let after = compute_sla(&state, &def, now).unwrap();
        assert_eq!(after.status, SlaStatus::OnTime);
        assert!((after.hours_remaining - 24.0).abs() < 0.01);
    }

    #[test]
    fn test_auto_approve_due() {
        let def = StageDefinition::new(0, "Review")
            .with_approver(ApproverSpec::required("a"))
            .with_auto_approve(3600);

        let mut state = StageState::from_definition(&def);
        assert!(!auto_approve_due(&state, &def, Utc::now()));

        state.enter(Utc::now() - Duration::hours(2));
        assert!(auto_approve_due(&state, &def, Utc::now()));

        state.enter(Utc::now());
        assert!(!auto_approve_due(&state, &def, Utc::now()));
    }

    #[test]
    fn test_auto_approve_disabled() {
        let (state, def) = stage_with_sla(Some(60), 10);
        assert!(!auto_approve_due(&state, &def, Utc::now()));
    }
}
