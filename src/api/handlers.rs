use axum::{
    extract::{Path, Query, State},
    response::Json,
    Json as RequestJson,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::logic::elements::{ElementEngine, FindOptions, SearchOptions};
use crate::logic::jmi;
use crate::model::{Element, ElementUpdate, Id, NewElement, UserContext};
use crate::store::traits::{ElementFilter, Store};

pub type AppState<S> = Arc<ElementEngine<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

const FILTER_KEYS: &[&str] = &[
    "parent",
    "source",
    "target",
    "type",
    "name",
    "created_by",
    "last_modified_by",
    "archived_by",
];

/// Query-string surface shared by the element read endpoints. Option keys
/// are split out; everything else must be a recognized equality filter
/// (`custom.<key>` included).
#[derive(Debug, Default)]
struct ElementQuery {
    ids: Option<Vec<Id>>,
    archived: bool,
    subtree: bool,
    limit: Option<usize>,
    skip: Option<usize>,
    fields: Option<String>,
    populate: Option<String>,
    q: Option<String>,
    filters: HashMap<String, Value>,
}

fn parse_query(params: HashMap<String, String>) -> Result<ElementQuery> {
    let mut query = ElementQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "ids" => {
                query.ids = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            "archived" => query.archived = parse_bool(&key, &value)?,
            "subtree" => query.subtree = parse_bool(&key, &value)?,
            "limit" => query.limit = Some(parse_usize(&key, &value)?),
            "skip" => query.skip = Some(parse_usize(&key, &value)?),
            "fields" => query.fields = Some(value),
            "populate" => query.populate = Some(value),
            "q" => query.q = Some(value),
            other if FILTER_KEYS.contains(&other) || other.starts_with("custom.") => {
                query.filters.insert(key, Value::String(value));
            }
            other => {
                return Err(Error::data_format(format!(
                    "unrecognized query option '{}'",
                    other
                )))
            }
        }
    }
    Ok(query)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| Error::data_format(format!("option '{}' must be true or false", key)))
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::data_format(format!("option '{}' must be a non-negative integer", key)))
}

/// Accept either a single JSON object or an array of objects.
fn one_or_many<T: serde::de::DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(Error::data_format(
                "payload must be a JSON object or an array of objects",
            ))
        }
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| Error::data_format(format!("invalid element payload: {}", e)))
        })
        .collect()
}

pub async fn get_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(engine): State<AppState<S>>,
) -> Result<Json<Value>> {
    let query = parse_query(params)?;
    let options = FindOptions {
        include_archived: query.archived,
        subtree: query.subtree,
        limit: query.limit,
        skip: query.skip,
        filters: query.filters.clone(),
    };
    let elements = engine
        .find(&user, &org, &project, &branch, query.ids.clone(), options)
        .await?;
    let shaped = shape(
        &engine, &org, &project, &branch, elements, &query,
    )
    .await?;
    Ok(Json(shaped))
}

pub async fn get_element<S: Store>(
    user: UserContext,
    Path((org, project, branch, element)): Path<(String, String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(engine): State<AppState<S>>,
) -> Result<Json<Value>> {
    let query = parse_query(params)?;
    let options = FindOptions {
        include_archived: query.archived,
        subtree: query.subtree,
        limit: query.limit,
        skip: query.skip,
        filters: query.filters.clone(),
    };
    let elements = engine
        .find(
            &user,
            &org,
            &project,
            &branch,
            Some(vec![element.clone()]),
            options,
        )
        .await?;
    if elements.is_empty() {
        return Err(Error::not_found(format!(
            "element '{}' not found",
            element
        )));
    }
    let mut shaped = shape(&engine, &org, &project, &branch, elements, &query).await?;
    // Single-element GETs (without subtree) unwrap to one object.
    let value = match shaped.as_array_mut() {
        Some(items) if items.len() == 1 && !query.subtree => items.remove(0),
        _ => shaped,
    };
    Ok(Json(value))
}

pub async fn search_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(engine): State<AppState<S>>,
) -> Result<Json<Value>> {
    let query = parse_query(params)?;
    let text = query
        .q
        .clone()
        .ok_or_else(|| Error::data_format("search requires a 'q' query parameter"))?;
    let options = SearchOptions {
        include_archived: query.archived,
        limit: query.limit,
        skip: query.skip,
        filters: query.filters.clone(),
    };
    let elements = engine
        .search(&user, &org, &project, &branch, &text, options)
        .await?;
    let shaped = shape(&engine, &org, &project, &branch, elements, &query).await?;
    Ok(Json(shaped))
}

pub async fn post_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let payload: Vec<NewElement> = one_or_many(body)?;
    let created = engine
        .create(&user, &org, &project, &branch, payload)
        .await?;
    Ok(Json(to_json(created)?))
}

pub async fn post_element<S: Store>(
    user: UserContext,
    Path((org, project, branch, element)): Path<(String, String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let payload = with_path_id(body, &element)?;
    let mut created = engine
        .create(&user, &org, &project, &branch, vec![payload])
        .await?;
    Ok(Json(serde_json::to_value(created.pop()).map_err(anyhow::Error::from)?))
}

pub async fn patch_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let updates: Vec<ElementUpdate> = one_or_many(body)?;
    let updated = engine
        .update(&user, &org, &project, &branch, updates)
        .await?;
    Ok(Json(to_json(updated)?))
}

pub async fn patch_element<S: Store>(
    user: UserContext,
    Path((org, project, branch, element)): Path<(String, String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let update = with_path_id(body, &element)?;
    let mut updated = engine
        .update(&user, &org, &project, &branch, vec![update])
        .await?;
    Ok(Json(serde_json::to_value(updated.pop()).map_err(anyhow::Error::from)?))
}

pub async fn put_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let payload: Vec<NewElement> = one_or_many(body)?;
    let replaced = engine
        .create_or_replace(&user, &org, &project, &branch, payload)
        .await?;
    Ok(Json(to_json(replaced)?))
}

pub async fn put_element<S: Store>(
    user: UserContext,
    Path((org, project, branch, element)): Path<(String, String, String, String)>,
    State(engine): State<AppState<S>>,
    RequestJson(body): RequestJson<Value>,
) -> Result<Json<Value>> {
    let payload = with_path_id(body, &element)?;
    let mut replaced = engine
        .create_or_replace(&user, &org, &project, &branch, vec![payload])
        .await?;
    Ok(Json(serde_json::to_value(replaced.pop()).map_err(anyhow::Error::from)?))
}

pub async fn delete_elements<S: Store>(
    user: UserContext,
    Path((org, project, branch)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(engine): State<AppState<S>>,
    body: Option<RequestJson<Value>>,
) -> Result<Json<Vec<Id>>> {
    let ids: Vec<Id> = match body {
        Some(RequestJson(Value::Array(items))) => items
            .into_iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    Error::data_format("delete payload must be an array of element ids")
                })
            })
            .collect::<Result<_>>()?,
        Some(RequestJson(Value::String(id))) => vec![id],
        Some(_) => {
            return Err(Error::data_format(
                "delete payload must be an array of element ids",
            ))
        }
        None => parse_query(params)?
            .ids
            .ok_or_else(|| Error::data_format("no element ids provided"))?,
    };
    let deleted = engine.remove(&user, &org, &project, &branch, ids).await?;
    Ok(Json(deleted))
}

pub async fn delete_element<S: Store>(
    user: UserContext,
    Path((org, project, branch, element)): Path<(String, String, String, String)>,
    State(engine): State<AppState<S>>,
) -> Result<Json<Vec<Id>>> {
    let deleted = engine
        .remove(&user, &org, &project, &branch, vec![element])
        .await?;
    Ok(Json(deleted))
}

fn with_path_id<T: serde::de::DeserializeOwned>(mut body: Value, element: &str) -> Result<T> {
    let Some(object) = body.as_object_mut() else {
        return Err(Error::data_format("payload must be a JSON object"));
    };
    match object.get("id").and_then(Value::as_str) {
        None => {
            object.insert("id".to_string(), Value::String(element.to_string()));
        }
        Some(id) if id == element => {}
        Some(id) => {
            return Err(Error::data_format(format!(
                "element id '{}' does not match URL id '{}'",
                id, element
            )))
        }
    }
    serde_json::from_value(body)
        .map_err(|e| Error::data_format(format!("invalid element payload: {}", e)))
}

fn to_json(elements: Vec<Element>) -> Result<Value> {
    Ok(serde_json::to_value(elements).map_err(anyhow::Error::from)?)
}

/// Apply the `fields` projection and `populate` options to an element set.
/// This is response shaping only; the engine always returns full documents.
async fn shape<S: Store>(
    engine: &ElementEngine<S>,
    org: &str,
    project: &str,
    branch: &str,
    elements: Vec<Element>,
    query: &ElementQuery,
) -> Result<Value> {
    let mut docs: Vec<Value> = elements
        .iter()
        .map(|e| serde_json::to_value(e).map_err(anyhow::Error::from))
        .collect::<std::result::Result<_, _>>()?;

    if let Some(populate) = &query.populate {
        let relations: Vec<&str> = populate.split(',').map(str::trim).collect();
        populate_relations(engine, org, project, branch, &elements, &mut docs, &relations)
            .await?;
    }
    if let Some(fields) = &query.fields {
        for doc in &mut docs {
            apply_fields(doc, fields);
        }
    }
    Ok(Value::Array(docs))
}

fn apply_fields(doc: &mut Value, fields: &str) {
    let Some(object) = doc.as_object_mut() else {
        return;
    };
    let entries: Vec<&str> = fields.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
    let excluding = entries.iter().all(|f| f.starts_with('-'));
    if excluding {
        for entry in entries {
            object.remove(entry.trim_start_matches('-'));
        }
    } else {
        let keep: Vec<&str> = entries
            .iter()
            .filter(|f| !f.starts_with('-'))
            .copied()
            .collect();
        object.retain(|key, _| key == "id" || keep.contains(&key.as_str()));
    }
}

/// Resolve requested relationship fields into embedded documents. Forward
/// references (`parent`/`source`/`target`) resolve in one lookup; the
/// derived inverses (`contains`/`source_of`/`target_of`) each take one
/// query keyed on the shown element ids.
async fn populate_relations<S: Store>(
    engine: &ElementEngine<S>,
    org: &str,
    project: &str,
    branch: &str,
    elements: &[Element],
    docs: &mut [Value],
    relations: &[&str],
) -> Result<()> {
    let store = engine.store();
    let project_key = crate::model::project_id(org, project);
    let scope = ElementFilter::new(project_key, branch).archived(true);
    let shown_ids: Vec<Id> = elements.iter().map(|e| e.id.clone()).collect();

    for relation in relations {
        match *relation {
            "parent" | "source" | "target" => {
                let refs: Vec<Id> = elements
                    .iter()
                    .filter_map(|e| match *relation {
                        "parent" => e.parent.clone(),
                        "source" => e.source.clone(),
                        _ => e.target.clone(),
                    })
                    .collect();
                if refs.is_empty() {
                    continue;
                }
                let found = crate::store::batch::find_by_ids(&*store, &scope, refs).await?;
                let by_id = jmi::by_id_ref(&found);
                for (element, doc) in elements.iter().zip(docs.iter_mut()) {
                    let reference = match *relation {
                        "parent" => &element.parent,
                        "source" => &element.source,
                        _ => &element.target,
                    };
                    if let (Some(id), Some(object)) = (reference, doc.as_object_mut()) {
                        if let Some(resolved) = by_id.get(id.as_str()) {
                            object.insert(
                                relation.to_string(),
                                serde_json::to_value(resolved).map_err(anyhow::Error::from)?,
                            );
                        }
                    }
                }
            }
            "contains" | "source_of" | "target_of" => {
                let mut filter = scope.clone();
                match *relation {
                    "contains" => filter.parents = Some(shown_ids.clone()),
                    "source_of" => filter.sources = Some(shown_ids.clone()),
                    _ => filter.targets = Some(shown_ids.clone()),
                }
                let related = store.find_elements(&filter).await?;
                for (element, doc) in elements.iter().zip(docs.iter_mut()) {
                    let members: Vec<Value> = related
                        .iter()
                        .filter(|r| {
                            let link = match *relation {
                                "contains" => &r.parent,
                                "source_of" => &r.source,
                                _ => &r.target,
                            };
                            link.as_deref() == Some(element.id.as_str())
                        })
                        .map(|r| serde_json::to_value(r).map_err(anyhow::Error::from))
                        .collect::<std::result::Result<_, _>>()?;
                    if let Some(object) = doc.as_object_mut() {
                        object.insert(relation.to_string(), Value::Array(members));
                    }
                }
            }
            other => {
                return Err(Error::data_format(format!(
                    "unrecognized populate field '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_parsing_splits_options_from_filters() {
        let mut params = HashMap::new();
        params.insert("ids".to_string(), "e1, e2".to_string());
        params.insert("archived".to_string(), "true".to_string());
        params.insert("type".to_string(), "block".to_string());
        params.insert("custom.color".to_string(), "red".to_string());

        let query = parse_query(params).unwrap();
        assert_eq!(query.ids, Some(vec!["e1".to_string(), "e2".to_string()]));
        assert!(query.archived);
        assert_eq!(query.filters["type"], json!("block"));
        assert_eq!(query.filters["custom.color"], json!("red"));
    }

    #[test]
    fn query_parsing_rejects_unknown_options() {
        let mut params = HashMap::new();
        params.insert("colour".to_string(), "red".to_string());
        assert!(matches!(
            parse_query(params).unwrap_err(),
            Error::DataFormat(_)
        ));
    }

    #[test]
    fn fields_projection_includes_and_excludes() {
        let mut doc = json!({"id": "e1", "name": "Widget", "documentation": "d", "branch": "master"});
        apply_fields(&mut doc, "name");
        assert_eq!(doc, json!({"id": "e1", "name": "Widget"}));

        let mut doc = json!({"id": "e1", "name": "Widget", "documentation": "d"});
        apply_fields(&mut doc, "-documentation");
        assert_eq!(doc, json!({"id": "e1", "name": "Widget"}));
    }

    #[test]
    fn one_or_many_accepts_both_shapes() {
        let single: Vec<NewElement> = one_or_many(json!({"id": "e1"})).unwrap();
        assert_eq!(single.len(), 1);
        let many: Vec<NewElement> =
            one_or_many(json!([{"id": "e1"}, {"id": "e2"}])).unwrap();
        assert_eq!(many.len(), 2);
        assert!(one_or_many::<NewElement>(json!("nope")).is_err());
    }

    #[test]
    fn path_id_is_injected_and_checked() {
        let update: ElementUpdate =
            with_path_id(json!({"name": "Widget"}), "e1").unwrap();
        assert_eq!(update.id, "e1");
        assert!(with_path_id::<ElementUpdate>(json!({"id": "e2"}), "e1").is_err());
    }
}
