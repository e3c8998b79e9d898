//! Board column configuration
//!
//! A column is a named lane mapped to one or more `(status, stage)`
//! combinations. The default layout derives one lane per template
//! stage plus the three terminal lanes, but deployments can supply
//! their own mapping (several stages can share a lane, for example).

use approval_types::{ApprovalInstance, InstanceStatus, WorkflowTemplate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a terminal card stays visible on the board
pub const DEFAULT_TERMINAL_GRACE_SECS: u64 = 7 * 24 * 3600;

/// One `(status, stage)` combination a column accepts.
///
/// `stage_order: None` matches the status at any stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub status: InstanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_order: Option<u32>,
}

impl ColumnMapping {
    pub fn stage(order: u32) -> Self {
        Self {
            status: InstanceStatus::InProgress,
            stage_order: Some(order),
        }
    }

    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status,
            stage_order: None,
        }
    }

    /// Whether the mapping matches, requiring the exact stage when one
    /// is configured
    pub fn matches(&self, instance: &ApprovalInstance) -> bool {
        self.status == instance.status
            && self
                .stage_order
                .map(|order| order == instance.current_stage_index)
                .unwrap_or(true)
    }
}

/// A named board lane
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub id: String,
    pub name: String,
    /// Display color as a hex string
    pub color: String,
    /// Position on the board, left to right
    pub order: u32,
    pub mappings: Vec<ColumnMapping>,
}

impl KanbanColumn {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: &str, order: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.to_string(),
            order,
            mappings: Vec::new(),
        }
    }

    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mappings.push(mapping);
        self
    }
}

/// The full board layout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub columns: Vec<KanbanColumn>,
    /// Terminal cards older than this are dropped from the board
    pub terminal_grace_secs: u64,
}

impl BoardConfig {
    /// Default layout for a template: one lane per stage, then the
    /// approved / changes-requested / rejected lanes.
    pub fn for_template(template: &WorkflowTemplate) -> Self {
        let mut columns: Vec<KanbanColumn> = template
            .stages
            .iter()
            .map(|stage| {
                KanbanColumn::new(
                    format!("stage-{}", stage.order),
                    stage.name.clone(),
                    "#3b82f6",
                    stage.order,
                )
                .with_mapping(ColumnMapping::stage(stage.order))
            })
            .collect();

        let next = template.stage_count() as u32;
        columns.push(
            KanbanColumn::new("approved", "Approved", "#10b981", next)
                .with_mapping(ColumnMapping::status(InstanceStatus::Approved)),
        );
        columns.push(
            KanbanColumn::new("changes_requested", "Changes Requested", "#f59e0b", next + 1)
                .with_mapping(ColumnMapping::status(InstanceStatus::ChangesRequested)),
        );
        columns.push(
            KanbanColumn::new("rejected", "Rejected", "#ef4444", next + 2)
                .with_mapping(ColumnMapping::status(InstanceStatus::Rejected)),
        );

        Self {
            columns,
            terminal_grace_secs: DEFAULT_TERMINAL_GRACE_SECS,
        }
    }

    /// Look up a column by id
    pub fn column(&self, id: &str) -> Option<&KanbanColumn> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Resolve the column an instance currently belongs to.
    ///
    /// An exact `(status, stage)` mapping wins over a status-wide one,
    /// so a deployment can pin one stage to a special lane while a
    /// wildcard lane catches the rest.
    pub fn derive_column(&self, instance: &ApprovalInstance) -> Option<&KanbanColumn> {
        let exact = self.columns.iter().find(|column| {
            column
                .mappings
                .iter()
                .any(|m| m.stage_order.is_some() && m.matches(instance))
        });
        exact.or_else(|| {
            self.columns
                .iter()
                .find(|column| column.mappings.iter().any(|m| m.matches(instance)))
        })
    }

    /// Whether a terminal instance is still within the display grace
    /// window at `now`
    pub fn within_grace(&self, instance: &ApprovalInstance, now: DateTime<Utc>) -> bool {
        match instance.completed_at {
            Some(completed) => {
                now.signed_duration_since(completed)
                    <= Duration::seconds(self.terminal_grace_secs as i64)
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{ApproverSpec, ContentId, StageDefinition};

    fn two_stage_template() -> WorkflowTemplate {
        WorkflowTemplate::new("Review")
            .add_stage(
                StageDefinition::new(0, "Editorial")
                    .with_approver(ApproverSpec::required("alice")),
            )
            .add_stage(
                StageDefinition::new(1, "Legal").with_approver(ApproverSpec::required("carol")),
            )
    }

    #[test]
    fn test_default_layout_has_stage_and_terminal_lanes() {
        let config = BoardConfig::for_template(&two_stage_template());

        let ids: Vec<&str> = config.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["stage-0", "stage-1", "approved", "changes_requested", "rejected"]
        );
        assert_eq!(config.column("stage-1").unwrap().name, "Legal");
    }

    #[test]
    fn test_derive_column_follows_current_stage() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let mut instance =
            ApprovalInstance::from_template(&template, ContentId::new("post-1"), Utc::now())
                .unwrap();

        assert_eq!(config.derive_column(&instance).unwrap().id, "stage-0");

        instance.enter_stage(1, Utc::now());
        assert_eq!(config.derive_column(&instance).unwrap().id, "stage-1");

        instance.finalize(InstanceStatus::Approved, Utc::now());
        assert_eq!(config.derive_column(&instance).unwrap().id, "approved");
    }

    #[test]
    fn test_exact_stage_mapping_wins_over_wildcard() {
        let template = two_stage_template();
        let mut config = BoardConfig::for_template(&template);
        // A catch-all lane for anything in progress, listed first.
        config.columns.insert(
            0,
            KanbanColumn::new("in-review", "In Review", "#64748b", 99)
                .with_mapping(ColumnMapping::status(InstanceStatus::InProgress)),
        );

        let instance =
            ApprovalInstance::from_template(&template, ContentId::new("post-1"), Utc::now())
                .unwrap();
        assert_eq!(config.derive_column(&instance).unwrap().id, "stage-0");
    }

    #[test]
    fn test_grace_window() {
        let template = two_stage_template();
        let config = BoardConfig::for_template(&template);
        let mut instance =
            ApprovalInstance::from_template(&template, ContentId::new("post-1"), Utc::now())
                .unwrap();

        let now = Utc::now();
        instance.finalize(InstanceStatus::Rejected, now);
        assert!(config.within_grace(&instance, now));
        assert!(!config.within_grace(
            &instance,
            now + Duration::seconds(config.terminal_grace_secs as i64 + 1)
        ));
    }
}
