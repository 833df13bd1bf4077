pub type Id = String;

/// Delimiter between the org/project/branch/element segments of a
/// fully-qualified id.
pub const ID_DELIMITER: char = ':';

/// The only branch this engine currently serves.
pub const MASTER_BRANCH: &str = "master";

/// Local id of the branch root element. Every element's ancestor chain
/// terminates here.
pub const ROOT_MODEL: &str = "model";

/// Reserved local ids that may never be archived, replaced, reparented or
/// deleted.
pub const ROOT_ELEMENTS: &[&str] = &["model", "__mbee__", "holding_bin", "undefined"];

/// Join non-empty id segments with the delimiter, in order.
pub fn build_id(segments: &[&str]) -> Id {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(&ID_DELIMITER.to_string())
}

/// Split a delimited id back into its segments.
pub fn parse_id(id: &str) -> Vec<&str> {
    id.split(ID_DELIMITER).collect()
}

/// Fully-qualified element id: `org:project:branch:local`.
pub fn element_id(org: &str, project: &str, branch: &str, local: &str) -> Id {
    build_id(&[org, project, branch, local])
}

/// Fully-qualified project id: `org:project`.
pub fn project_id(org: &str, project: &str) -> Id {
    build_id(&[org, project])
}

/// The local (last) segment of a fully-qualified id.
pub fn local_id(id: &str) -> &str {
    id.rsplit(ID_DELIMITER).next().unwrap_or(id)
}

/// Whether a fully-qualified or local id names a protected root element.
pub fn is_root_element(id: &str) -> bool {
    ROOT_ELEMENTS.contains(&local_id(id))
}
