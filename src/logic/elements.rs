use crate::error::{Error, Result};
use crate::events::{self, EventBus};
use crate::logic::ancestry::assert_no_cycle;
use crate::logic::permissions::{ensure_read, ensure_write};
use crate::logic::snapshot::SnapshotStore;
use crate::logic::subtree::resolve_subtree;
use crate::logic::validators::Validators;
use crate::logic::jmi;
use crate::model::{
    build_id, element_id, is_root_element, local_id, parse_id, project_id, Element,
    ElementNamespace, ElementUpdate, Id, NewElement, PendingElement, Project, UserContext,
    MASTER_BRANCH, ROOT_MODEL,
};
use crate::store::batch;
use crate::store::traits::{ElementFilter, Store};
use chrono::Utc;
use itertools::Itertools;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Options recognized by `find`. Response shaping (`fields` projection,
/// `populate`) lives in the API layer on top of the returned set.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Include archived elements (default finds exclude them).
    pub include_archived: bool,
    /// Expand each requested id to its full subtree before querying.
    pub subtree: bool,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// Equality filters on `parent`/`source`/`target`/`type`/`name`/
    /// `created_by`/`last_modified_by`/`archived_by`/`custom.<key>`.
    pub filters: HashMap<String, Value>,
}

/// Options recognized by `search`: the same surface as `find` minus subtree
/// expansion; results come back best match first.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub include_archived: bool,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub filters: HashMap<String, Value>,
}

/// The element graph mutation engine. All element reads and writes for a
/// branch go through one of the six operations on this struct, which enforce
/// permissions, referential integrity, acyclicity, protected roots and the
/// batching rule, and publish a domain event after each successful mutation.
pub struct ElementEngine<S: Store> {
    store: Arc<S>,
    events: Arc<dyn EventBus>,
    validators: Validators,
    snapshots: SnapshotStore,
}

impl<S: Store> ElementEngine<S> {
    pub fn new(store: Arc<S>, events: Arc<dyn EventBus>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            events,
            validators: Validators::new(),
            snapshots: SnapshotStore::new(data_dir),
        }
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Find elements on a branch. `ids` of None means the whole project.
    pub async fn find(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        ids: Option<Vec<Id>>,
        options: FindOptions,
    ) -> Result<Vec<Element>> {
        ensure_master(branch)?;
        let project_key = project_id(org, project);
        let record = self.load_project(&project_key).await?;
        ensure_read(&record, user)?;

        let mut filter = ElementFilter::new(project_key.clone(), branch)
            .archived(options.include_archived);
        filter.equals = qualify_filters(options.filters, org, project, branch);
        filter.limit = options.limit;
        filter.skip = options.skip;

        let Some(ids) = ids else {
            return self.store.find_elements(&filter).await;
        };

        let mut full_ids: Vec<Id> = ids
            .iter()
            .map(|local| element_id(org, project, branch, local))
            .collect();
        if options.subtree {
            full_ids = resolve_subtree(&*self.store, &project_key, branch, &full_ids).await?;
        }
        batch::find_by_ids(&*self.store, &filter, full_ids).await
    }

    /// Create elements in bulk. Fails fast on malformed payloads and
    /// duplicate ids, verifies every parent/source/target reference, then
    /// inserts in batches and returns the created set.
    pub async fn create(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        payload: Vec<NewElement>,
    ) -> Result<Vec<Element>> {
        ensure_master(branch)?;
        if payload.is_empty() {
            return Err(Error::data_format("no elements provided"));
        }

        let pending = self.sanitize_new(user, org, project, branch, &payload)?;

        let project_key = project_id(org, project);
        let record = self.load_project(&project_key).await?;
        ensure_write(&record, user)?;
        check_reference_whitelist(&record, payload.iter().flat_map(namespaces_of))?;

        // Advisory conflict pre-check; a racing create slipping past it is
        // caught by the store's unique index at insert time.
        let ids: Vec<Id> = pending.iter().map(|p| p.element.id.clone()).collect();
        let scope = ElementFilter::new(project_key.clone(), branch).archived(true);
        let existing = batch::find_by_ids(&*self.store, &scope, ids.clone()).await?;
        if !existing.is_empty() {
            return Err(Error::operation(format!(
                "elements already exist: [{}]",
                existing.iter().map(|e| e.local_id()).sorted().join(", ")
            )));
        }

        self.verify_pending_refs(&pending).await?;

        let elements: Vec<Element> = pending.into_iter().map(|p| p.element).collect();
        batch::insert_elements(&*self.store, &elements).await?;

        let created = batch::find_by_ids(&*self.store, &scope, ids).await?;
        log::info!(
            "created {} element(s) in {}:{}",
            created.len(),
            project_key,
            branch
        );
        self.events.emit(
            events::ELEMENTS_CREATED,
            serde_json::to_value(&created).unwrap_or_default(),
        );
        Ok(created)
    }

    /// Patch elements. Bulk payloads may only touch the bulk-safe fields
    /// (name, documentation, type, custom, archived); a single-element
    /// payload may additionally change `parent`, guarded against cycles.
    pub async fn update(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        updates: Vec<ElementUpdate>,
    ) -> Result<Vec<Element>> {
        ensure_master(branch)?;
        if updates.is_empty() {
            return Err(Error::data_format("no updates provided"));
        }

        let bulk = updates.len() > 1;
        let mut seen: HashSet<&str> = HashSet::new();
        for update in &updates {
            self.validators.validate_local_id(&update.id)?;
            if bulk {
                if let Some(field) = bulk_violation(update) {
                    return Err(Error::operation(format!(
                        "cannot update '{}' in a bulk update",
                        field
                    )));
                }
            }
            if !seen.insert(update.id.as_str()) {
                return Err(Error::operation(format!(
                    "duplicate element id '{}' in update payload",
                    update.id
                )));
            }
        }

        let project_key = project_id(org, project);
        let record = self.load_project(&project_key).await?;
        ensure_write(&record, user)?;
        check_reference_whitelist(
            &record,
            updates.iter().flat_map(|u| {
                u.source_namespace
                    .iter()
                    .chain(u.target_namespace.iter())
            }),
        )?;

        let full_ids: Vec<Id> = updates
            .iter()
            .map(|u| element_id(org, project, branch, &u.id))
            .collect();
        let scope = ElementFilter::new(project_key.clone(), branch).archived(true);
        let existing = batch::find_by_ids(&*self.store, &scope, full_ids.clone()).await?;
        if existing.len() != full_ids.len() {
            let found: HashSet<&str> = existing.iter().map(|e| e.id.as_str()).collect();
            let missing = full_ids
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .map(|id| local_id(id))
                .sorted()
                .join(", ");
            return Err(Error::not_found(format!(
                "elements not found: [{}]",
                missing
            )));
        }

        let mut docs = jmi::by_id(existing);
        let mut patched: Vec<Element> = Vec::with_capacity(updates.len());
        let mut refs_to_verify: HashSet<Id> = HashSet::new();
        let now = Utc::now();

        for update in &updates {
            let full_id = element_id(org, project, branch, &update.id);
            let mut doc = docs
                .remove(&full_id)
                .ok_or_else(|| Error::not_found(format!("element '{}' not found", update.id)))?;

            // Archived elements accept no other change unless the same patch
            // unarchives them.
            if doc.archived
                && update.touches_non_archive_fields()
                && update.archived != Some(false)
            {
                return Err(Error::operation(format!(
                    "element '{}' is archived; it must be unarchived before other fields change",
                    update.id
                )));
            }

            if is_root_element(&full_id) && update.archived == Some(true) {
                return Err(Error::operation(format!(
                    "cannot archive root element '{}'",
                    update.id
                )));
            }

            if let Some(parent) = &update.parent {
                self.validators.validate_local_id(parent)?;
                let parent_full = element_id(org, project, branch, parent);
                if doc.parent.as_ref() != Some(&parent_full) {
                    assert_no_cycle(&*self.store, &project_key, branch, &full_id, &parent_full)
                        .await?;
                    doc.parent = Some(parent_full);
                }
            }

            let touches_relationship = update.source.is_some()
                || update.target.is_some()
                || update.source_namespace.is_some()
                || update.target_namespace.is_some();
            if touches_relationship {
                let new_source = qualify_ref(
                    update.source.as_deref(),
                    update.source_namespace.as_ref(),
                    org,
                    project,
                    branch,
                )
                .or(doc.source.clone());
                let new_target = qualify_ref(
                    update.target.as_deref(),
                    update.target_namespace.as_ref(),
                    org,
                    project,
                    branch,
                )
                .or(doc.target.clone());

                // The invariant holds against the merged state.
                match (&new_source, &new_target) {
                    (Some(_), Some(_)) => {}
                    (Some(_), None) => {
                        return Err(Error::data_format(format!(
                            "element '{}': if source is provided, target must also be provided",
                            update.id
                        )))
                    }
                    (None, Some(_)) => {
                        return Err(Error::data_format(format!(
                            "element '{}': if target is provided, source must also be provided",
                            update.id
                        )))
                    }
                    (None, None) => {}
                }
                for reference in [&new_source, &new_target].into_iter().flatten() {
                    if *reference == full_id {
                        return Err(Error::operation(format!(
                            "element '{}' cannot reference itself",
                            update.id
                        )));
                    }
                }
                if update.source.is_some() || update.source_namespace.is_some() {
                    refs_to_verify.extend(new_source.clone());
                }
                if update.target.is_some() || update.target_namespace.is_some() {
                    refs_to_verify.extend(new_target.clone());
                }
                doc.source = new_source;
                doc.target = new_target;
            }

            if let Some(name) = &update.name {
                self.validators.validate_name(name)?;
                doc.name = name.clone();
            }
            if let Some(documentation) = &update.documentation {
                doc.documentation = documentation.clone();
            }
            if let Some(element_type) = &update.element_type {
                doc.element_type = element_type.clone();
            }
            if let Some(custom) = &update.custom {
                doc.custom = custom.clone();
            }
            match update.archived {
                Some(true) if !doc.archived => {
                    doc.archived = true;
                    doc.archived_by = Some(user.user_id.clone());
                    doc.archived_on = Some(now);
                }
                Some(false) if doc.archived => {
                    doc.archived = false;
                    doc.archived_by = None;
                    doc.archived_on = None;
                }
                _ => {}
            }

            doc.last_modified_by = user.user_id.clone();
            doc.updated_on = now;
            patched.push(doc);
        }

        let found = self.find_existing_refs(&refs_to_verify).await?;
        let missing = refs_to_verify
            .iter()
            .filter(|id| !found.contains(*id))
            .map(|id| local_id(id))
            .sorted()
            .join(", ");
        if !missing.is_empty() {
            return Err(Error::not_found(format!(
                "referenced elements not found: [{}]",
                missing
            )));
        }

        batch::replace_elements(&*self.store, &patched).await?;

        let updated = batch::find_by_ids(&*self.store, &scope, full_ids).await?;
        log::info!(
            "updated {} element(s) in {}:{}",
            updated.len(),
            project_key,
            branch
        );
        self.events.emit(
            events::ELEMENTS_UPDATED,
            serde_json::to_value(&updated).unwrap_or_default(),
        );
        Ok(updated)
    }

    /// Idempotent create-or-replace, restricted to global admins. Existing
    /// documents are snapshotted to disk, deleted, and recreated from the
    /// payload; the snapshot is discarded only if the recreate succeeds.
    pub async fn create_or_replace(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        payload: Vec<NewElement>,
    ) -> Result<Vec<Element>> {
        ensure_master(branch)?;
        if payload.is_empty() {
            return Err(Error::data_format("no elements provided"));
        }

        let project_key = project_id(org, project);
        self.load_project(&project_key).await?;
        if !user.admin {
            return Err(Error::permission(
                "createOrReplace requires a global admin",
            ));
        }

        let pending = self.sanitize_new(user, org, project, branch, &payload)?;
        for element in &payload {
            if is_root_element(&element.id) {
                return Err(Error::operation(format!(
                    "cannot replace root element '{}'",
                    element.id
                )));
            }
        }

        let ids: Vec<Id> = pending.iter().map(|p| p.element.id.clone()).collect();
        let scope = ElementFilter::new(project_key.clone(), branch).archived(true);
        let existing = batch::find_by_ids(&*self.store, &scope, ids).await?;

        let snapshot = if existing.is_empty() {
            None
        } else {
            Some(self.snapshots.write(org, project, &existing).await?)
        };

        if !existing.is_empty() {
            let deleted: Vec<Id> = existing.iter().map(|e| e.id.clone()).collect();
            batch::delete_elements(&*self.store, &deleted).await?;
            log::info!(
                "replacing {} element(s) in {}:{}",
                deleted.len(),
                project_key,
                branch
            );
            self.events
                .emit(events::ELEMENTS_DELETED, serde_json::json!(deleted));
        }

        match self.create(user, org, project, branch, payload).await {
            Ok(created) => {
                if let Some(path) = snapshot {
                    if let Err(e) = self.snapshots.discard(&path).await {
                        log::warn!("failed to clean up snapshot {}: {}", path.display(), e);
                    }
                }
                Ok(created)
            }
            Err(e) => {
                // The snapshot stays on disk for manual recovery; it is
                // never replayed automatically.
                if let Some(path) = snapshot {
                    log::error!(
                        "createOrReplace failed after delete; snapshot retained at {}",
                        path.display()
                    );
                }
                Err(e)
            }
        }
    }

    /// Delete elements and everything beneath them. Returns the
    /// de-duplicated list of deleted identifiers.
    pub async fn remove(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        ids: Vec<Id>,
    ) -> Result<Vec<Id>> {
        ensure_master(branch)?;
        if ids.is_empty() {
            return Err(Error::data_format("no elements provided"));
        }

        let project_key = project_id(org, project);
        let record = self.load_project(&project_key).await?;
        ensure_write(&record, user)?;

        let full_ids: Vec<Id> = ids
            .iter()
            .map(|local| element_id(org, project, branch, local))
            .collect();
        let scope = ElementFilter::new(project_key.clone(), branch).archived(true);
        let existing = batch::find_by_ids(&*self.store, &scope, full_ids.clone()).await?;
        if existing.len() != full_ids.len() {
            let found: HashSet<&str> = existing.iter().map(|e| e.id.as_str()).collect();
            let missing = full_ids
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .map(|id| local_id(id))
                .sorted()
                .join(", ");
            return Err(Error::not_found(format!(
                "elements not found: [{}]",
                missing
            )));
        }

        let expanded = resolve_subtree(&*self.store, &project_key, branch, &full_ids).await?;
        for id in &expanded {
            if is_root_element(id) {
                return Err(Error::operation(format!(
                    "cannot delete root element '{}'",
                    local_id(id)
                )));
            }
        }

        batch::delete_elements(&*self.store, &expanded).await?;

        let mut deleted = expanded;
        deleted.sort();
        log::info!(
            "deleted {} element(s) in {}:{}",
            deleted.len(),
            project_key,
            branch
        );
        self.events
            .emit(events::ELEMENTS_DELETED, serde_json::json!(deleted));
        Ok(deleted)
    }

    /// Relevance-ranked full-text search over a branch's elements.
    pub async fn search(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<Element>> {
        ensure_master(branch)?;
        let project_key = project_id(org, project);
        let record = self.load_project(&project_key).await?;
        ensure_read(&record, user)?;

        let mut filter = ElementFilter::new(project_key, branch)
            .archived(options.include_archived);
        filter.equals = qualify_filters(options.filters, org, project, branch);
        filter.limit = options.limit;
        filter.skip = options.skip;

        self.store.search_elements(&filter, query).await
    }

    async fn load_project(&self, project_key: &Id) -> Result<Project> {
        self.store
            .get_project(project_key)
            .await?
            .ok_or_else(|| Error::not_found(format!("project '{}' not found", project_key)))
    }

    /// Validate payload shape and produce the intermediate pending form:
    /// finalized documents plus the references still to be verified.
    fn sanitize_new(
        &self,
        user: &UserContext,
        org: &str,
        project: &str,
        branch: &str,
        payload: &[NewElement],
    ) -> Result<Vec<PendingElement>> {
        let project_key = project_id(org, project);
        let now = Utc::now();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending = Vec::with_capacity(payload.len());

        for element in payload {
            self.validators.validate_local_id(&element.id)?;
            self.validators.validate_name(&element.name)?;

            if element.source.is_some() != element.target.is_some() {
                return Err(Error::data_format(format!(
                    "element '{}': source and target must be provided together",
                    element.id
                )));
            }
            for (field, namespace, reference) in [
                ("sourceNamespace", &element.source_namespace, &element.source),
                ("targetNamespace", &element.target_namespace, &element.target),
            ] {
                if let Some(namespace) = namespace {
                    if reference.is_none() {
                        return Err(Error::data_format(format!(
                            "element '{}': {} requires a matching reference",
                            element.id, field
                        )));
                    }
                    if namespace.org != org {
                        return Err(Error::data_format(format!(
                            "element '{}': {} org must match the current org",
                            element.id, field
                        )));
                    }
                }
            }

            if !seen.insert(element.id.as_str()) {
                return Err(Error::operation(format!(
                    "duplicate element id '{}' in payload",
                    element.id
                )));
            }

            let full_id = element_id(org, project, branch, &element.id);
            let parent_ref = match element.parent.as_deref() {
                // The branch root is the only element created without a parent.
                None | Some("") if element.id == ROOT_MODEL => None,
                None | Some("") => Some(element_id(org, project, branch, ROOT_MODEL)),
                Some(parent) => {
                    self.validators.validate_local_id(parent)?;
                    Some(element_id(org, project, branch, parent))
                }
            };
            let source_ref = qualify_ref(
                element.source.as_deref(),
                element.source_namespace.as_ref(),
                org,
                project,
                branch,
            );
            let target_ref = qualify_ref(
                element.target.as_deref(),
                element.target_namespace.as_ref(),
                org,
                project,
                branch,
            );

            pending.push(PendingElement {
                element: Element {
                    id: full_id,
                    project: project_key.clone(),
                    branch: branch.to_string(),
                    parent: parent_ref.clone(),
                    source: source_ref.clone(),
                    target: target_ref.clone(),
                    name: element.name.clone(),
                    documentation: element.documentation.clone(),
                    element_type: element.element_type.clone(),
                    custom: element.custom.clone(),
                    created_by: user.user_id.clone(),
                    created_on: now,
                    last_modified_by: user.user_id.clone(),
                    updated_on: now,
                    archived: false,
                    archived_by: None,
                    archived_on: None,
                },
                parent_ref,
                source_ref,
                target_ref,
            });
        }

        Ok(pending)
    }

    /// Verify every parent/source/target reference of a pending batch.
    /// References into the batch itself are resolved in memory; the rest go
    /// through one batched store lookup per referenced project/branch.
    async fn verify_pending_refs(&self, pending: &[PendingElement]) -> Result<()> {
        let in_payload: HashSet<&str> = pending.iter().map(|p| p.element.id.as_str()).collect();

        let mut parents: HashSet<Id> = HashSet::new();
        let mut sources: HashSet<Id> = HashSet::new();
        let mut targets: HashSet<Id> = HashSet::new();
        for p in pending {
            for (set, reference) in [
                (&mut parents, &p.parent_ref),
                (&mut sources, &p.source_ref),
                (&mut targets, &p.target_ref),
            ] {
                if let Some(id) = reference {
                    if !in_payload.contains(id.as_str()) {
                        set.insert(id.clone());
                    }
                }
            }
        }

        let mut external: HashSet<Id> = HashSet::new();
        external.extend(parents.iter().cloned());
        external.extend(sources.iter().cloned());
        external.extend(targets.iter().cloned());
        let found = self.find_existing_refs(&external).await?;

        for (role, refs) in [
            ("parent", &parents),
            ("source", &sources),
            ("target", &targets),
        ] {
            let missing = refs
                .iter()
                .filter(|id| !found.contains(*id))
                .map(|id| local_id(id))
                .sorted()
                .join(", ");
            if !missing.is_empty() {
                return Err(Error::not_found(format!(
                    "{} element(s) not found: [{}]",
                    role, missing
                )));
            }
        }
        Ok(())
    }

    /// Batched existence lookup for fully-qualified ids, grouped by the
    /// project/branch they live in (cross-project references resolve against
    /// their own project).
    async fn find_existing_refs(&self, refs: &HashSet<Id>) -> Result<HashSet<Id>> {
        let mut groups: HashMap<(Id, String), Vec<Id>> = HashMap::new();
        for id in refs {
            let segments = parse_id(id);
            if segments.len() < 4 {
                continue;
            }
            let key = (
                build_id(&[segments[0], segments[1]]),
                segments[2].to_string(),
            );
            groups.entry(key).or_default().push(id.clone());
        }

        let mut found = HashSet::new();
        for ((project, branch), ids) in groups {
            let scope = ElementFilter::new(project, branch).archived(true);
            for element in batch::find_by_ids(&*self.store, &scope, ids).await? {
                found.insert(element.id);
            }
        }
        Ok(found)
    }
}

fn ensure_master(branch: &str) -> Result<()> {
    if branch == MASTER_BRANCH {
        Ok(())
    } else {
        Err(Error::data_format(format!(
            "branch '{}' is not supported; only '{}' exists in this version",
            branch, MASTER_BRANCH
        )))
    }
}

/// Qualify a local source/target reference into a fully-qualified id,
/// honoring an explicit namespace override.
fn qualify_ref(
    reference: Option<&str>,
    namespace: Option<&ElementNamespace>,
    org: &str,
    project: &str,
    branch: &str,
) -> Option<Id> {
    let reference = reference?;
    match namespace {
        Some(ns) => Some(element_id(&ns.org, &ns.project, &ns.branch, reference)),
        None => Some(element_id(org, project, branch, reference)),
    }
}

fn namespaces_of(element: &NewElement) -> impl Iterator<Item = &ElementNamespace> {
    element
        .source_namespace
        .iter()
        .chain(element.target_namespace.iter())
}

/// Every namespaced reference must point at a project on the owning
/// project's reference whitelist.
fn check_reference_whitelist<'a>(
    project: &Project,
    namespaces: impl Iterator<Item = &'a ElementNamespace>,
) -> Result<()> {
    for namespace in namespaces {
        let referenced = project_id(&namespace.org, &namespace.project);
        if !project.may_reference(&referenced) {
            return Err(Error::operation(format!(
                "project '{}' is not listed in the project references of '{}'",
                referenced, project.id
            )));
        }
    }
    Ok(())
}

/// First field of a bulk payload entry outside the bulk-safe allow-list.
fn bulk_violation(update: &ElementUpdate) -> Option<&'static str> {
    if update.parent.is_some() {
        Some("parent")
    } else if update.source.is_some() || update.source_namespace.is_some() {
        Some("source")
    } else if update.target.is_some() || update.target_namespace.is_some() {
        Some("target")
    } else {
        None
    }
}

/// Equality filters on parent/source/target arrive as local ids from the
/// API; qualify them against the call's coordinate.
fn qualify_filters(
    filters: HashMap<String, Value>,
    org: &str,
    project: &str,
    branch: &str,
) -> HashMap<String, Value> {
    filters
        .into_iter()
        .map(|(key, value)| {
            let qualified = match (key.as_str(), value.as_str()) {
                ("parent" | "source" | "target", Some(s)) if !s.contains(':') => {
                    Value::String(element_id(org, project, branch, s))
                }
                _ => value,
            };
            (key, qualified)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_master_branch_is_accepted() {
        assert!(ensure_master("master").is_ok());
        let err = ensure_master("develop").unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
    }

    #[test]
    fn refs_qualify_against_namespace_override() {
        let ns = ElementNamespace {
            org: "org".to_string(),
            project: "other".to_string(),
            branch: "master".to_string(),
        };
        assert_eq!(
            qualify_ref(Some("e9"), Some(&ns), "org", "proj", "master"),
            Some("org:other:master:e9".to_string())
        );
        assert_eq!(
            qualify_ref(Some("e9"), None, "org", "proj", "master"),
            Some("org:proj:master:e9".to_string())
        );
        assert_eq!(qualify_ref(None, Some(&ns), "org", "proj", "master"), None);
    }

    #[test]
    fn filter_values_are_qualified() {
        let mut filters = HashMap::new();
        filters.insert("parent".to_string(), Value::String("model".to_string()));
        filters.insert("name".to_string(), Value::String("Widget".to_string()));
        let qualified = qualify_filters(filters, "org", "proj", "master");
        assert_eq!(
            qualified["parent"],
            Value::String("org:proj:master:model".to_string())
        );
        assert_eq!(qualified["name"], Value::String("Widget".to_string()));
    }

    #[test]
    fn bulk_violations_name_the_field() {
        let reparent = ElementUpdate {
            id: "e1".to_string(),
            parent: Some("e2".to_string()),
            ..Default::default()
        };
        assert_eq!(bulk_violation(&reparent), Some("parent"));
        let rename = ElementUpdate {
            id: "e1".to_string(),
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert_eq!(bulk_violation(&rename), None);
    }
}
