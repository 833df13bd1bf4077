use crate::error::Result;
use crate::model::{Element, Id, Project};
use serde_json::Value;
use std::collections::HashMap;

/// Predicate for element queries. Always scoped to one project and branch;
/// the optional id-set predicates (`ids`, `parents`, `sources`, `targets`)
/// are the lists subject to the batching rule.
#[derive(Debug, Clone)]
pub struct ElementFilter {
    pub project: Id,
    pub branch: String,
    /// Restrict to these fully-qualified ids.
    pub ids: Option<Vec<Id>>,
    /// Restrict to elements whose parent is in this set (subtree frontiers).
    pub parents: Option<Vec<Id>>,
    /// Restrict to elements whose source/target is in this set.
    pub sources: Option<Vec<Id>>,
    pub targets: Option<Vec<Id>>,
    /// Include soft-deleted elements. Default finds exclude them.
    pub include_archived: bool,
    /// Equality filters on `parent`/`source`/`target`/`type`/`name`/
    /// `created_by`/`last_modified_by`/`archived_by`/`custom.<key>`.
    pub equals: HashMap<String, Value>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

impl ElementFilter {
    pub fn new(project: impl Into<Id>, branch: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
            ids: None,
            parents: None,
            sources: None,
            targets: None,
            include_archived: false,
            equals: HashMap::new(),
            limit: None,
            skip: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<Id>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }
}

/// Document-store operations for elements. Implementations must enforce a
/// unique key on `Element::id` so that racing inserts surface as errors
/// rather than silent overwrites.
#[async_trait::async_trait]
pub trait ElementStore: Send + Sync {
    async fn find_elements(&self, filter: &ElementFilter) -> Result<Vec<Element>>;

    /// Insert new documents; fails on any pre-existing id.
    async fn insert_elements(&self, elements: &[Element]) -> Result<u64>;

    /// Write fully-merged documents over their existing ids.
    async fn replace_elements(&self, elements: &[Element]) -> Result<u64>;

    async fn delete_elements(&self, ids: &[Id]) -> Result<u64>;

    /// Relevance-ranked full-text match over name/documentation/id, best
    /// match first, honoring the filter's structural predicates and paging.
    async fn search_elements(&self, filter: &ElementFilter, text: &str) -> Result<Vec<Element>>;
}

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>>;
    async fn upsert_project(&self, project: Project) -> Result<()>;
}

pub trait Store: ElementStore + ProjectStore + Send + Sync {}
impl<T: ElementStore + ProjectStore + Send + Sync> Store for T {}
