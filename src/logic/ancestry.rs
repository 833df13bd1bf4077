use crate::error::{Error, Result};
use crate::model::{is_root_element, local_id, Id};
use crate::store::traits::{ElementFilter, ElementStore};
use std::collections::HashSet;

/// Reject a reparent that would break the tree: self-parenting, moving a
/// protected root, or creating a cycle. Walks the candidate parent's
/// ancestor chain toward the branch root with an explicit visited set, so a
/// corrupted chain fails instead of looping.
///
/// Only single-element updates may change `parent`, so this never needs to
/// run batched.
pub async fn assert_no_cycle<S: ElementStore + ?Sized>(
    store: &S,
    project: &Id,
    branch: &str,
    element_id: &Id,
    new_parent_id: &Id,
) -> Result<()> {
    if new_parent_id == element_id {
        return Err(Error::operation(format!(
            "element '{}' cannot be its own parent",
            local_id(element_id)
        )));
    }
    if is_root_element(element_id) {
        return Err(Error::operation(format!(
            "cannot move root element '{}'",
            local_id(element_id)
        )));
    }

    let filter = ElementFilter::new(project.clone(), branch).archived(true);
    let mut visited: HashSet<Id> = HashSet::new();
    let mut current = new_parent_id.clone();

    loop {
        if current == *element_id {
            return Err(Error::operation(format!(
                "parent '{}' would create a circular reference to element '{}'",
                local_id(new_parent_id),
                local_id(element_id)
            )));
        }
        if !visited.insert(current.clone()) {
            // Stored ancestry already contains a loop.
            return Err(Error::operation(format!(
                "circular reference found in ancestry of '{}'",
                local_id(new_parent_id)
            )));
        }

        let mut found = store
            .find_elements(&filter.clone().with_ids(vec![current.clone()]))
            .await?;
        let Some(ancestor) = found.pop() else {
            return Err(Error::not_found(format!(
                "parent element '{}' not found",
                local_id(&current)
            )));
        };

        match ancestor.parent {
            // Reached the branch root: the chain is sound.
            None => return Ok(()),
            Some(parent) => current = parent,
        }
    }
}
