use crate::error::Result;
use crate::model::{element_id, parse_id, Id, ROOT_MODEL};
use crate::store::batch;
use crate::store::traits::{ElementFilter, ElementStore};
use std::collections::HashSet;

/// Expand a set of root ids to the full set of descendant ids (roots
/// included) by breadth-first expansion over the parent relationship, one
/// batched query per level.
///
/// An empty seed set means "the whole tree": the branch root element is
/// substituted as the sole seed. The visited set makes termination
/// unconditional even if stored parent links are corrupted into a loop.
pub async fn resolve_subtree<S: ElementStore + ?Sized>(
    store: &S,
    project: &Id,
    branch: &str,
    roots: &[Id],
) -> Result<Vec<Id>> {
    let seeds: Vec<Id> = if roots.is_empty() {
        let segments = parse_id(project);
        let (org, project_name) = (
            segments.first().copied().unwrap_or_default(),
            segments.get(1).copied().unwrap_or_default(),
        );
        vec![element_id(org, project_name, branch, ROOT_MODEL)]
    } else {
        roots.to_vec()
    };

    // Archived descendants are part of the subtree too; callers decide what
    // to do with them.
    let frontier_filter = ElementFilter::new(project.clone(), branch).archived(true);

    let mut visited: HashSet<Id> = seeds.iter().cloned().collect();
    let mut ordered: Vec<Id> = seeds.clone();
    let mut frontier = seeds;

    while !frontier.is_empty() {
        let children = batch::find_by_parents(store, &frontier_filter, frontier).await?;
        frontier = Vec::new();
        for child in children {
            if visited.insert(child.id.clone()) {
                ordered.push(child.id.clone());
                frontier.push(child.id);
            }
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, Project};
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    fn element(local: &str, parent: Option<&str>) -> Element {
        Element {
            id: element_id("org", "proj", "master", local),
            project: "org:proj".to_string(),
            branch: "master".to_string(),
            parent: parent.map(|p| element_id("org", "proj", "master", p)),
            source: None,
            target: None,
            name: local.to_string(),
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

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.seed_branch_root(Project::new("org:proj"), "org", "proj", "master");
        // model -> a -> b -> c, model -> d
        store
            .insert_elements(&[
                element("a", Some("model")),
                element("b", Some("a")),
                element("c", Some("b")),
                element("d", Some("model")),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn expands_descendants_breadth_first() {
        let store = seeded_store().await;
        let ids = resolve_subtree(
            &store,
            &"org:proj".to_string(),
            "master",
            &[element_id("org", "proj", "master", "a")],
        )
        .await
        .unwrap();
        assert_eq!(
            ids,
            vec![
                element_id("org", "proj", "master", "a"),
                element_id("org", "proj", "master", "b"),
                element_id("org", "proj", "master", "c"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_seed_means_whole_tree() {
        let store = seeded_store().await;
        let ids = resolve_subtree(&store, &"org:proj".to_string(), "master", &[])
            .await
            .unwrap();
        // model + 3 root children installed by seeding + 4 test elements
        assert_eq!(ids.len(), 8);
        assert_eq!(ids[0], element_id("org", "proj", "master", "model"));
    }

    #[tokio::test]
    async fn corrupted_parent_loop_terminates() {
        let store = MemoryStore::new();
        store.seed_branch_root(Project::new("org:proj"), "org", "proj", "master");
        // x and y point at each other; the visited set must stop the walk.
        store
            .insert_elements(&[element("x", Some("y")), element("y", Some("x"))])
            .await
            .unwrap();
        let ids = resolve_subtree(
            &store,
            &"org:proj".to_string(),
            "master",
            &[element_id("org", "proj", "master", "x")],
        )
        .await
        .unwrap();
        assert_eq!(ids.len(), 2);
    }
}
