//! Template registry: stores and retrieves workflow templates
//!
//! Templates are immutable once published. To modify one, register a
//! new copy under the same name; in-flight instances keep their own
//! snapshot and never see the change. The registry tracks all versions
//! of a name.

use approval_types::{ApprovalError, ApprovalResult, TemplateId, WorkflowTemplate};
use std::collections::HashMap;

/// Registry of workflow templates
#[derive(Clone, Debug, Default)]
pub struct TemplateRegistry {
    /// All registered templates, keyed by id
    templates: HashMap<TemplateId, WorkflowTemplate>,
    /// Index by name, oldest registration first
    by_name: HashMap<String, Vec<TemplateId>>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template.
    ///
    /// Validates before storing. Returns the template id.
    pub fn register(&mut self, template: WorkflowTemplate) -> ApprovalResult<TemplateId> {
        template.validate()?;

        let id = template.id.clone();
        let name = template.name.clone();

        self.templates.insert(id.clone(), template);
        self.by_name.entry(name).or_default().push(id.clone());

        tracing::info!(template_id = %id, "workflow template registered");
        Ok(id)
    }

    /// Get a template by id
    pub fn get(&self, id: &TemplateId) -> ApprovalResult<&WorkflowTemplate> {
        self.templates
            .get(id)
            .ok_or_else(|| ApprovalError::InvalidTemplate(format!("unknown template: {id}")))
    }

    /// Get the latest registration under a name
    pub fn latest_by_name(&self, name: &str) -> Option<&WorkflowTemplate> {
        self.by_name
            .get(name)
            .and_then(|ids| ids.last())
            .and_then(|id| self.templates.get(id))
    }

    /// All registrations under a name, oldest first
    pub fn versions_by_name(&self, name: &str) -> Vec<&WorkflowTemplate> {
        self.by_name
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.templates.get(id)).collect())
            .unwrap_or_default()
    }

    /// List every registered template
    pub fn list(&self) -> Vec<&WorkflowTemplate> {
        self.templates.values().collect()
    }

    /// Number of registered templates
    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Whether a template id is registered
    pub fn contains(&self, id: &TemplateId) -> bool {
        self.templates.contains_key(id)
    }
}
