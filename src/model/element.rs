use crate::model::{local_id, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default user for legacy data migration
fn default_user() -> String {
    "legacy-user".to_string()
}

/// Default timestamp for legacy data migration
fn default_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap_or_else(Utc::now)
}

/// A node in the model graph. `id` is the fully-qualified
/// `org:project:branch:local` identifier; `parent` forms the containment
/// tree, `source`/`target` layer a directed relationship edge on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: Id,
    /// Owning project (`org:project`); immutable after creation.
    pub project: Id,
    /// Owning branch name; immutable after creation.
    pub branch: String,
    /// Fully-qualified parent id. None only for the branch root element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    /// Source and target are both present or both absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Id>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default, rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub custom: Map<String, Value>,

    /// Audit fields for tracking who created/modified this element
    #[serde(default = "default_user")]
    pub created_by: String,
    #[serde(default = "default_timestamp")]
    pub created_on: DateTime<Utc>,
    #[serde(default = "default_user")]
    pub last_modified_by: String,
    #[serde(default = "default_timestamp")]
    pub updated_on: DateTime<Utc>,

    /// Soft-delete flag: archived elements are excluded from default finds
    /// and reject any other field change until unarchived.
    #[serde(default)]
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_on: Option<DateTime<Utc>>,
}

impl Element {
    pub fn local_id(&self) -> &str {
        local_id(&self.id)
    }
}

/// Explicit org/project/branch triple overriding the same-project assumption
/// for a relationship's source or target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNamespace {
    pub org: String,
    pub project: String,
    pub branch: String,
}

/// Element input model for creation. Local ids only; the engine qualifies
/// them against the org/project/branch coordinate of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewElement {
    pub id: Id,
    /// Local id of the parent; defaults to the branch root when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Id>,
    #[serde(
        default,
        rename = "sourceNamespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_namespace: Option<ElementNamespace>,
    #[serde(
        default,
        rename = "targetNamespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_namespace: Option<ElementNamespace>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default, rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

/// Element patch model for update operations. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementUpdate {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    /// Only permitted in single-element updates; triggers the cycle guard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Id>,
    #[serde(
        default,
        rename = "sourceNamespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_namespace: Option<ElementNamespace>,
    #[serde(
        default,
        rename = "targetNamespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_namespace: Option<ElementNamespace>,
}

impl ElementUpdate {
    /// Fields on the bulk-update allow-list: name, documentation, type,
    /// custom, archived. Anything else requires a single-element update.
    pub fn bulk_safe(&self) -> bool {
        self.parent.is_none()
            && self.source.is_none()
            && self.target.is_none()
            && self.source_namespace.is_none()
            && self.target_namespace.is_none()
    }

    /// Whether the patch touches anything besides the archived flag.
    pub fn touches_non_archive_fields(&self) -> bool {
        self.name.is_some()
            || self.documentation.is_some()
            || self.element_type.is_some()
            || self.custom.is_some()
            || self.parent.is_some()
            || self.source.is_some()
            || self.target.is_some()
    }
}

/// Intermediate create-time form: the finalized document plus the references
/// still to be verified against the store. External references are resolved
/// in one batched pass; references into the same payload never hit the store.
#[derive(Debug, Clone)]
pub struct PendingElement {
    pub element: Element,
    pub parent_ref: Option<Id>,
    pub source_ref: Option<Id>,
    pub target_ref: Option<Id>,
}
