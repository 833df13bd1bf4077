use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

/// The requesting principal. `admin` is the global flag that bypasses
/// per-project permission checks (and is required for createOrReplace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    #[serde(default)]
    pub admin: bool,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            admin: true,
        }
    }

    /// System principal for internal operations (seeding, migrations).
    pub fn system() -> Self {
        Self::admin("system")
    }

    /// Default principal for development/testing.
    pub fn default_user() -> Self {
        Self::new("dev-user")
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::default_user()
    }
}

/// Axum extractor for UserContext from request headers.
///
/// Authentication itself lives upstream; by the time a request reaches this
/// service a trusted proxy has resolved the session into:
/// - X-User-Id: principal identifier
/// - X-User-Admin: "true" when the principal is a global admin
///
/// For development, requests with no headers fall back to the default user.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        if let Some(user_id) = extract_header_value(headers, "x-user-id") {
            let admin = extract_header_value(headers, "x-user-admin")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);
            Ok(UserContext { user_id, admin })
        } else {
            Ok(UserContext::default_user())
        }
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn header_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("alice"),
        );
        headers.insert(
            HeaderName::from_static("x-user-admin"),
            HeaderValue::from_static("TRUE"),
        );

        assert_eq!(
            extract_header_value(&headers, "x-user-id"),
            Some("alice".to_string())
        );
        assert_eq!(
            extract_header_value(&headers, "x-user-admin"),
            Some("TRUE".to_string())
        );
    }

    #[test]
    fn admin_constructor_sets_flag() {
        assert!(UserContext::admin("root").admin);
        assert!(!UserContext::new("alice").admin);
    }
}
