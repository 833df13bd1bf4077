use crate::model::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a principal can hold on a project. Checked independently:
/// `write` does not imply `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

/// The engine's view of a project record: identity, the per-principal
/// permission map, and the whitelist of foreign projects its elements may
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    #[serde(default)]
    pub permissions: HashMap<String, Vec<Permission>>,
    #[serde(default)]
    pub project_references: Vec<Id>,
}

impl Project {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            permissions: HashMap::new(),
            project_references: Vec::new(),
        }
    }

    pub fn with_permission(mut self, user_id: &str, permissions: &[Permission]) -> Self {
        self.permissions
            .insert(user_id.to_string(), permissions.to_vec());
        self
    }

    pub fn with_reference(mut self, project_id: impl Into<Id>) -> Self {
        self.project_references.push(project_id.into());
        self
    }

    /// Whether this project is allowed to hold cross-project references into
    /// `other`. A project may always reference itself.
    pub fn may_reference(&self, other: &Id) -> bool {
        *other == self.id || self.project_references.contains(other)
    }
}
