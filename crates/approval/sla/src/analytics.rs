//! SLA rollup across a set of approval instances
//!
//! Aggregates classification counts and average timings for reporting.
//! Like the tracker, this is a pure pass over persisted fields.

use crate::{compute_sla, SlaStatus};
use approval_types::ApprovalInstance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated SLA metrics over a set of instances
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaAnalytics {
    /// Stages with an SLA that have been entered
    pub total: usize,
    pub on_time: usize,
    pub at_risk: usize,
    pub overdue: usize,
    /// Average window across tracked stages, in hours
    pub average_target_hours: f64,
    /// Average time to complete a tracked stage, in hours
    pub average_completion_hours: f64,
}

/// Roll up SLA metrics for every tracked stage in `instances` at `now`.
///
/// Completed stages count toward `on_time` (they met their window by
/// finishing) and feed the completion-time average; open stages are
/// classified by `compute_sla`.
pub fn sla_analytics(instances: &[ApprovalInstance], now: DateTime<Utc>) -> SlaAnalytics {
    let mut metrics = SlaAnalytics::default();
    let mut target_hours_sum = 0.0;
    let mut completion_hours_sum = 0.0;
    let mut completed = 0usize;

    for instance in instances {
        for state in &instance.stage_states {
            let Some(def) = instance.stage_def(state.stage_order) else {
                continue;
            };
            let Some(sla_secs) = def.sla_secs else {
                continue;
            };
            let Some(entered_at) = state.entered_at else {
                continue;
            };

            metrics.total += 1;
            target_hours_sum += sla_secs as f64 / 3600.0;

            if let Some(completed_at) = state.completed_at {
                metrics.on_time += 1;
                completion_hours_sum +=
                    (completed_at - entered_at).num_seconds() as f64 / 3600.0;
                completed += 1;
            } else if let Some(view) = compute_sla(state, def, now) {
                match view.status {
                    SlaStatus::OnTime => metrics.on_time += 1,
                    SlaStatus::AtRisk => metrics.at_risk += 1,
                    SlaStatus::Overdue => metrics.overdue += 1,
                }
            }
        }
    }

    if metrics.total > 0 {
        metrics.average_target_hours = target_hours_sum / metrics.total as f64;
    }
    if completed > 0 {
        metrics.average_completion_hours = completion_hours_sum / completed as f64;
    }
    metrics
}
