use crate::error::{Error, Result};
use crate::model::{
    element_id, Element, Id, Project, ROOT_ELEMENTS, ROOT_MODEL,
};
use crate::store::traits::{ElementFilter, ElementStore, ProjectStore};
use anyhow::anyhow;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// In-memory store used by the test suite and dev mode. Implements the same
/// traits as the Postgres store, including the unique-id insert guarantee.
#[derive(Debug, Default)]
pub struct MemoryStore {
    elements: RwLock<HashMap<Id, Element>>,
    projects: RwLock<HashMap<Id, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a project and its protected root elements, the bootstrap the
    /// application performs when a branch is created.
    pub fn seed_branch_root(&self, project: Project, org: &str, project_name: &str, branch: &str) {
        let project_key = project.id.clone();
        self.projects.write().insert(project_key.clone(), project);

        let mut elements = self.elements.write();
        for local in ROOT_ELEMENTS {
            let id = element_id(org, project_name, branch, local);
            let parent = if *local == ROOT_MODEL {
                None
            } else {
                Some(element_id(org, project_name, branch, ROOT_MODEL))
            };
            elements.insert(
                id.clone(),
                Element {
                    id,
                    project: project_key.clone(),
                    branch: branch.to_string(),
                    parent,
                    source: None,
                    target: None,
                    name: local.to_string(),
                    documentation: String::new(),
                    element_type: String::new(),
                    custom: serde_json::Map::new(),
                    created_by: "system".to_string(),
                    created_on: Utc::now(),
                    last_modified_by: "system".to_string(),
                    updated_on: Utc::now(),
                    archived: false,
                    archived_by: None,
                    archived_on: None,
                },
            );
        }
    }

    pub fn element_count(&self) -> usize {
        self.elements.read().len()
    }
}

fn equals_match(element: &Element, key: &str, expected: &Value) -> bool {
    if let Some(custom_key) = key.strip_prefix("custom.") {
        return element.custom.get(custom_key) == Some(expected);
    }
    let actual: Option<&str> = match key {
        "parent" => element.parent.as_deref(),
        "source" => element.source.as_deref(),
        "target" => element.target.as_deref(),
        "type" => Some(element.element_type.as_str()),
        "name" => Some(element.name.as_str()),
        "created_by" => Some(element.created_by.as_str()),
        "last_modified_by" => Some(element.last_modified_by.as_str()),
        "archived_by" => element.archived_by.as_deref(),
        _ => return false,
    };
    actual == expected.as_str()
}

/// Set form of the filter's id predicates, built once per scan so large
/// batched key lists stay O(1) per element.
struct IdPredicates<'a> {
    ids: Option<HashSet<&'a str>>,
    parents: Option<HashSet<&'a str>>,
    sources: Option<HashSet<&'a str>>,
    targets: Option<HashSet<&'a str>>,
}

impl<'a> IdPredicates<'a> {
    fn from_filter(filter: &'a ElementFilter) -> Self {
        let to_set =
            |ids: &'a Option<Vec<Id>>| ids.as_ref().map(|v| v.iter().map(String::as_str).collect());
        Self {
            ids: to_set(&filter.ids),
            parents: to_set(&filter.parents),
            sources: to_set(&filter.sources),
            targets: to_set(&filter.targets),
        }
    }

    fn matches(&self, element: &Element) -> bool {
        let in_set = |set: &Option<HashSet<&str>>, value: Option<&str>| match set {
            None => true,
            Some(set) => value.map(|v| set.contains(v)).unwrap_or(false),
        };
        in_set(&self.ids, Some(element.id.as_str()))
            && in_set(&self.parents, element.parent.as_deref())
            && in_set(&self.sources, element.source.as_deref())
            && in_set(&self.targets, element.target.as_deref())
    }
}

fn matches(element: &Element, filter: &ElementFilter, predicates: &IdPredicates<'_>) -> bool {
    if element.project != filter.project || element.branch != filter.branch {
        return false;
    }
    if !filter.include_archived && element.archived {
        return false;
    }
    if !predicates.matches(element) {
        return false;
    }
    filter
        .equals
        .iter()
        .all(|(key, expected)| equals_match(element, key, expected))
}

fn page(mut found: Vec<Element>, filter: &ElementFilter) -> Vec<Element> {
    // Stable order so skip/limit paging is deterministic.
    found.sort_by(|a, b| a.id.cmp(&b.id));
    let skip = filter.skip.unwrap_or(0);
    let found: Vec<Element> = found.into_iter().skip(skip).collect();
    match filter.limit {
        Some(limit) => found.into_iter().take(limit).collect(),
        None => found,
    }
}

#[async_trait::async_trait]
impl ElementStore for MemoryStore {
    async fn find_elements(&self, filter: &ElementFilter) -> Result<Vec<Element>> {
        let predicates = IdPredicates::from_filter(filter);
        let elements = self.elements.read();
        let found: Vec<Element> = elements
            .values()
            .filter(|e| matches(e, filter, &predicates))
            .cloned()
            .collect();
        Ok(page(found, filter))
    }

    async fn insert_elements(&self, new_elements: &[Element]) -> Result<u64> {
        let mut elements = self.elements.write();
        // Unique-key enforcement: documents before the offending one stay
        // applied, matching a non-transactional bulk insert.
        let mut inserted = 0_u64;
        for element in new_elements {
            if elements.contains_key(&element.id) {
                return Err(Error::Database(anyhow!(
                    "duplicate key error: element '{}' already exists",
                    element.id
                )));
            }
            elements.insert(element.id.clone(), element.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn replace_elements(&self, replacements: &[Element]) -> Result<u64> {
        let mut elements = self.elements.write();
        let mut replaced = 0_u64;
        for element in replacements {
            elements.insert(element.id.clone(), element.clone());
            replaced += 1;
        }
        Ok(replaced)
    }

    async fn delete_elements(&self, ids: &[Id]) -> Result<u64> {
        let mut elements = self.elements.write();
        let mut deleted = 0_u64;
        for id in ids {
            if elements.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn search_elements(&self, filter: &ElementFilter, text: &str) -> Result<Vec<Element>> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let predicates = IdPredicates::from_filter(filter);
        let elements = self.elements.read();
        let mut scored: Vec<(usize, Element)> = elements
            .values()
            .filter(|e| matches(e, filter, &predicates))
            .filter_map(|e| {
                let haystack = format!(
                    "{} {} {}",
                    e.name.to_lowercase(),
                    e.documentation.to_lowercase(),
                    e.local_id().to_lowercase()
                );
                let score: usize = tokens
                    .iter()
                    .map(|t| haystack.matches(t.as_str()).count())
                    .sum();
                (score > 0).then(|| (score, e.clone()))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        let found: Vec<Element> = scored.into_iter().map(|(_, e)| e).collect();

        let skip = filter.skip.unwrap_or(0);
        let found: Vec<Element> = found.into_iter().skip(skip).collect();
        Ok(match filter.limit {
            Some(limit) => found.into_iter().take(limit).collect(),
            None => found,
        })
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        Ok(self.projects.read().get(id).cloned())
    }

    async fn upsert_project(&self, project: Project) -> Result<()> {
        self.projects.write().insert(project.id.clone(), project);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Permission;

    fn element(id: &str, parent: Option<&str>, name: &str) -> Element {
        Element {
            id: id.to_string(),
            project: "org:proj".to_string(),
            branch: "master".to_string(),
            parent: parent.map(|p| p.to_string()),
            source: None,
            target: None,
            name: name.to_string(),
            documentation: String::new(),
            element_type: String::new(),
            custom: serde_json::Map::new(),
            created_by: "tester".to_string(),
            created_on: Utc::now(),
            last_modified_by: "tester".to_string(),
            updated_on: Utc::now(),
            archived: false,
            archived_by: None,
            archived_on: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        let e = element("org:proj:master:e1", None, "Widget");
        store.insert_elements(&[e.clone()]).await.unwrap();
        let err = store.insert_elements(&[e]).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn find_honors_archived_flag_and_equals() {
        let store = MemoryStore::new();
        let mut archived = element("org:proj:master:old", None, "Old");
        archived.archived = true;
        store
            .insert_elements(&[element("org:proj:master:e1", None, "Widget"), archived])
            .await
            .unwrap();

        let filter = ElementFilter::new("org:proj", "master");
        assert_eq!(store.find_elements(&filter).await.unwrap().len(), 1);
        assert_eq!(
            store
                .find_elements(&filter.clone().archived(true))
                .await
                .unwrap()
                .len(),
            2
        );

        let mut by_name = filter.clone().archived(true);
        by_name
            .equals
            .insert("name".to_string(), Value::String("Old".to_string()));
        let found = store.find_elements(&by_name).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Old");
    }

    #[tokio::test]
    async fn search_ranks_by_match_count() {
        let store = MemoryStore::new();
        let mut best = element("org:proj:master:a", None, "pump");
        best.documentation = "pump pump pump".to_string();
        store
            .insert_elements(&[best, element("org:proj:master:b", None, "pump housing")])
            .await
            .unwrap();

        let filter = ElementFilter::new("org:proj", "master");
        let found = store.search_elements(&filter, "pump").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "org:proj:master:a");
    }

    #[tokio::test]
    async fn id_set_predicates_select_by_id_parent_source_and_target() {
        let store = MemoryStore::new();
        let mut rel = element("org:proj:master:rel", None, "flow");
        rel.source = Some("org:proj:master:a".to_string());
        rel.target = Some("org:proj:master:b".to_string());
        store
            .insert_elements(&[
                element("org:proj:master:a", None, "a"),
                element("org:proj:master:b", Some("org:proj:master:a"), "b"),
                rel,
            ])
            .await
            .unwrap();

        let base = ElementFilter::new("org:proj", "master");
        let by_ids = base
            .clone()
            .with_ids(vec!["org:proj:master:a".to_string(), "org:proj:master:rel".to_string()]);
        assert_eq!(store.find_elements(&by_ids).await.unwrap().len(), 2);

        let mut by_parent = base.clone();
        by_parent.parents = Some(vec!["org:proj:master:a".to_string()]);
        let children = store.find_elements(&by_parent).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "org:proj:master:b");

        let mut by_source = base.clone();
        by_source.sources = Some(vec!["org:proj:master:a".to_string()]);
        let outgoing = store.find_elements(&by_source).await.unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].id, "org:proj:master:rel");

        let mut by_target = base;
        by_target.targets = Some(vec!["org:proj:master:b".to_string()]);
        let incoming = store.find_elements(&by_target).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].id, "org:proj:master:rel");
    }

    #[tokio::test]
    async fn seed_installs_roots_and_project() {
        let store = MemoryStore::new();
        let project =
            Project::new("org:proj").with_permission("alice", &[Permission::Read]);
        store.seed_branch_root(project, "org", "proj", "master");

        assert_eq!(store.element_count(), ROOT_ELEMENTS.len());
        let root = store
            .find_elements(
                &ElementFilter::new("org:proj", "master")
                    .with_ids(vec!["org:proj:master:model".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].parent.is_none());
    }
}
