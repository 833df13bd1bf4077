//! Batch query executor: no store operation is issued with more than
//! `ELEMENT_BATCH_SIZE` keys in an id-set predicate. Oversized key lists are
//! split into chunks, all chunk futures are dispatched together and joined,
//! and results are concatenated with no order guarantee.
//!
//! Partial completion is not rolled back: once a chunk has committed, a
//! failure in a later chunk leaves the earlier chunks applied and surfaces
//! as `Error::Database`.

use crate::error::Result;
use crate::model::{Element, Id};
use crate::store::traits::{ElementFilter, ElementStore};
use futures::future::try_join_all;

pub const ELEMENT_BATCH_SIZE: usize = 50_000;

/// Find elements matching `base` restricted to `ids`, batched.
pub async fn find_by_ids<S: ElementStore + ?Sized>(
    store: &S,
    base: &ElementFilter,
    ids: Vec<Id>,
) -> Result<Vec<Element>> {
    find_by_ids_chunked(store, base, ids, ELEMENT_BATCH_SIZE).await
}

pub(crate) async fn find_by_ids_chunked<S: ElementStore + ?Sized>(
    store: &S,
    base: &ElementFilter,
    ids: Vec<Id>,
    chunk_size: usize,
) -> Result<Vec<Element>> {
    let filters: Vec<ElementFilter> = ids
        .chunks(chunk_size.max(1))
        .map(|chunk| {
            let mut filter = base.clone();
            filter.ids = Some(chunk.to_vec());
            filter
        })
        .collect();
    let results = try_join_all(filters.iter().map(|f| store.find_elements(f))).await?;
    Ok(results.into_iter().flatten().collect())
}

/// Find elements whose parent is in `parents`, batched. Used by the subtree
/// resolver to expand one BFS level at a time.
pub async fn find_by_parents<S: ElementStore + ?Sized>(
    store: &S,
    base: &ElementFilter,
    parents: Vec<Id>,
) -> Result<Vec<Element>> {
    find_by_parents_chunked(store, base, parents, ELEMENT_BATCH_SIZE).await
}

pub(crate) async fn find_by_parents_chunked<S: ElementStore + ?Sized>(
    store: &S,
    base: &ElementFilter,
    parents: Vec<Id>,
    chunk_size: usize,
) -> Result<Vec<Element>> {
    let filters: Vec<ElementFilter> = parents
        .chunks(chunk_size.max(1))
        .map(|chunk| {
            let mut filter = base.clone();
            filter.parents = Some(chunk.to_vec());
            filter
        })
        .collect();
    let results = try_join_all(filters.iter().map(|f| store.find_elements(f))).await?;
    Ok(results.into_iter().flatten().collect())
}

/// Insert documents in chunks; returns the total inserted count.
pub async fn insert_elements<S: ElementStore + ?Sized>(
    store: &S,
    elements: &[Element],
) -> Result<u64> {
    let results = try_join_all(
        elements
            .chunks(ELEMENT_BATCH_SIZE)
            .map(|chunk| store.insert_elements(chunk)),
    )
    .await?;
    Ok(results.into_iter().sum())
}

/// Replace documents in chunks; returns the total replaced count.
pub async fn replace_elements<S: ElementStore + ?Sized>(
    store: &S,
    elements: &[Element],
) -> Result<u64> {
    let results = try_join_all(
        elements
            .chunks(ELEMENT_BATCH_SIZE)
            .map(|chunk| store.replace_elements(chunk)),
    )
    .await?;
    Ok(results.into_iter().sum())
}

/// Delete by id in chunks; returns the total deleted count.
pub async fn delete_elements<S: ElementStore + ?Sized>(store: &S, ids: &[Id]) -> Result<u64> {
    let results = try_join_all(
        ids.chunks(ELEMENT_BATCH_SIZE)
            .map(|chunk| store.delete_elements(chunk)),
    )
    .await?;
    Ok(results.into_iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{element_id, Element};
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use std::collections::HashSet;

    fn element(local: &str) -> Element {
        Element {
            id: element_id("org", "proj", "master", local),
            project: "org:proj".to_string(),
            branch: "master".to_string(),
            parent: None,
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

    /// The union across chunks must equal a single un-chunked query,
    /// regardless of chunk size or ordering.
    #[tokio::test]
    async fn chunked_find_is_a_transparent_union() {
        let store = MemoryStore::new();
        let elements: Vec<Element> = (0..10).map(|i| element(&format!("e{}", i))).collect();
        store.insert_elements(&elements).await.unwrap();

        let base = ElementFilter::new("org:proj", "master");
        let ids: Vec<Id> = elements.iter().map(|e| e.id.clone()).collect();

        let whole = find_by_ids_chunked(&store, &base, ids.clone(), ids.len()).await.unwrap();
        let chunked = find_by_ids_chunked(&store, &base, ids, 3).await.unwrap();

        let whole_ids: HashSet<Id> = whole.into_iter().map(|e| e.id).collect();
        let chunked_ids: HashSet<Id> = chunked.into_iter().map(|e| e.id).collect();
        assert_eq!(whole_ids.len(), 10);
        assert_eq!(whole_ids, chunked_ids);
    }

    #[tokio::test]
    async fn chunked_parent_queries_union_children() {
        let store = MemoryStore::new();
        let parents: Vec<Element> = (0..4).map(|i| element(&format!("p{}", i))).collect();
        let children: Vec<Element> = (0..4)
            .map(|i| {
                let mut child = element(&format!("c{}", i));
                child.parent = Some(element_id("org", "proj", "master", &format!("p{}", i)));
                child
            })
            .collect();
        store.insert_elements(&parents).await.unwrap();
        store.insert_elements(&children).await.unwrap();

        let base = ElementFilter::new("org:proj", "master");
        let parent_ids: Vec<Id> = parents.iter().map(|e| e.id.clone()).collect();
        let found = find_by_parents_chunked(&store, &base, parent_ids, 2).await.unwrap();
        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|e| e.local_id().starts_with('c')));
    }

    #[tokio::test]
    async fn delete_sums_across_chunks() {
        let store = MemoryStore::new();
        let elements: Vec<Element> = (0..5).map(|i| element(&format!("e{}", i))).collect();
        store.insert_elements(&elements).await.unwrap();
        let ids: Vec<Id> = elements.iter().map(|e| e.id.clone()).collect();
        assert_eq!(delete_elements(&store, &ids).await.unwrap(), 5);
        assert_eq!(store.element_count(), 0);
    }
}
