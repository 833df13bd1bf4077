use crate::model::{Element, Id};
use std::collections::HashMap;

/// Convert a flat element list into a map keyed by id for O(1) lookup.
pub fn by_id(elements: Vec<Element>) -> HashMap<Id, Element> {
    elements.into_iter().map(|e| (e.id.clone(), e)).collect()
}

/// Borrowing variant for lookups that do not need ownership.
pub fn by_id_ref(elements: &[Element]) -> HashMap<&str, &Element> {
    elements.iter().map(|e| (e.id.as_str(), e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::element_id;
    use chrono::Utc;

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

    #[test]
    fn keys_by_full_id() {
        let map = by_id(vec![element("e1"), element("e2")]);
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("org:proj:master:e1"));
        let elements = [element("e1")];
        let refs = by_id_ref(&elements);
        assert_eq!(refs["org:proj:master:e1"].name, "e1");
    }
}
