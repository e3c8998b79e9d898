//! Stage completion policy evaluation
//!
//! Decides whether the decisions collected so far complete a stage:
//!
//! - `All`: every `required` approver has approved. Any-role and
//!   optional approvers never block the stage.
//! - `Any`: at least one approving decision, from anyone on the stage
//!   (escalated and optional approvers included).
//! - `Majority`: strictly more than half of the eligible (non-optional)
//!   approvers, so a 2-of-2 tie does not pass and 2 of 3 does.
//!
//! Non-required approvers never raise the bar, but their approvals
//! still count toward `Any` and `Majority`. A stage with no required
//! approvers under `All`, or no eligible approvers under `Majority`,
//! degrades to `Any` semantics.

use approval_types::{ApprovalPolicy, DecisionStatus, StageDefinition, StageState};

/// Whether the collected decisions complete the stage
pub fn stage_satisfied(definition: &StageDefinition, state: &StageState) -> bool {
    match definition.approval_type {
        ApprovalPolicy::Any => state.approved_count() > 0,
        ApprovalPolicy::All => {
            let required = definition.required_approvers();
            if required.is_empty() {
                return state.approved_count() > 0;
            }
            required.iter().all(|spec| {
                matches!(
                    state.decision(&spec.approver_id),
                    Some(d) if d.status == DecisionStatus::Approved
                )
            })
        }
        ApprovalPolicy::Majority => {
            let eligible = definition.eligible_approvers().len();
            if eligible == 0 {
                return state.approved_count() > 0;
            }
            state.approved_count() > eligible / 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{ApproverId, ApproverSpec, Decision};
    use chrono::Utc;
    use proptest::prelude::*;

    fn stage(policy: ApprovalPolicy, approvers: &[ApproverSpec]) -> (StageDefinition, StageState) {
        let mut definition = StageDefinition::new(0, "Review").with_policy(policy);
        for approver in approvers {
            definition = definition.with_approver(approver.clone());
        }
        let state = StageState::from_definition(&definition);
        (definition, state)
    }

    fn approve(state: &mut StageState, id: &str) {
        state.decisions.insert(
            ApproverId::new(id),
            Decision::recorded(DecisionStatus::Approved, None, Utc::now()),
        );
    }

    #[test]
    fn test_all_requires_every_required_approver() {
        let (definition, mut state) = stage(
            ApprovalPolicy::All,
            &[ApproverSpec::required("a"), ApproverSpec::required("b")],
        );
        assert!(!stage_satisfied(&definition, &state));

        approve(&mut state, "a");
        assert!(!stage_satisfied(&definition, &state));

        approve(&mut state, "b");
        assert!(stage_satisfied(&definition, &state));
    }

    #[test]
    fn test_all_ignores_optional_approvers() {
        let (definition, mut state) = stage(
            ApprovalPolicy::All,
            &[ApproverSpec::required("a"), ApproverSpec::optional("fyi")],
        );
        approve(&mut state, "a");
        assert!(stage_satisfied(&definition, &state));
    }

    #[test]
    fn test_all_not_blocked_by_undecided_any_role_approver() {
        let (definition, mut state) = stage(
            ApprovalPolicy::All,
            &[ApproverSpec::required("lead"), ApproverSpec::any("observer")],
        );
        assert!(!stage_satisfied(&definition, &state));

        // The required approver alone completes the stage; the
        // any-role observer never holds it up.
        approve(&mut state, "lead");
        assert!(stage_satisfied(&definition, &state));
    }

    #[test]
    fn test_any_is_satisfied_by_one_approval() {
        let (definition, mut state) = stage(
            ApprovalPolicy::Any,
            &[ApproverSpec::any("a"), ApproverSpec::any("b")],
        );
        assert!(!stage_satisfied(&definition, &state));

        approve(&mut state, "b");
        assert!(stage_satisfied(&definition, &state));
    }

    #[test]
    fn test_majority_two_of_two_is_a_tie() {
        let (definition, mut state) = stage(
            ApprovalPolicy::Majority,
            &[ApproverSpec::required("a"), ApproverSpec::required("b")],
        );
        approve(&mut state, "a");
        assert!(!stage_satisfied(&definition, &state));

        approve(&mut state, "b");
        assert!(stage_satisfied(&definition, &state));
    }

    #[test]
    fn test_majority_excludes_optional_from_denominator() {
        // 2 eligible + 1 optional: one approval from an eligible
        // approver plus the optional's approval is already 2 > 1.
        let (definition, mut state) = stage(
            ApprovalPolicy::Majority,
            &[
                ApproverSpec::required("a"),
                ApproverSpec::required("b"),
                ApproverSpec::optional("fyi"),
            ],
        );
        approve(&mut state, "a");
        assert!(!stage_satisfied(&definition, &state));

        approve(&mut state, "fyi");
        assert!(stage_satisfied(&definition, &state));
    }

    proptest! {
        #[test]
        fn prop_majority_passes_iff_strictly_more_than_half(
            eligible in 1usize..9,
            approvals in 0usize..9,
        ) {
            let approvals = approvals.min(eligible);
            let approvers: Vec<ApproverSpec> = (0..eligible)
                .map(|i| ApproverSpec::required(format!("approver-{i}")))
                .collect();
            let (definition, mut state) = stage(ApprovalPolicy::Majority, &approvers);
            for i in 0..approvals {
                approve(&mut state, &format!("approver-{i}"));
            }

            prop_assert_eq!(
                stage_satisfied(&definition, &state),
                approvals > eligible / 2
            );
        }
    }
}
