use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the element engine. Every public operation resolves to
/// exactly one of these kinds; the HTTP layer maps kinds to status codes and
/// nothing below the handlers ever leaks a raw store error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or invalid-typed input: bad branch, missing id, source
    /// without target, unparseable payloads.
    #[error("{0}")]
    DataFormat(String),

    /// The caller lacks the capability required by the operation.
    #[error("{0}")]
    Permission(String),

    /// Well-formed input forbidden by domain rules: duplicate ids, protected
    /// root mutation, circular reparent, non-whitelisted cross-project refs.
    #[error("{0}")]
    Operation(String),

    /// A referenced project, element, parent, source or target does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Underlying store or filesystem failure, including unique-index races
    /// that slip past the advisory pre-checks.
    #[error("internal error: {0}")]
    Database(#[from] anyhow::Error),
}

impl Error {
    pub fn data_format(msg: impl Into<String>) -> Self {
        Self::DataFormat(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::DataFormat(_) => StatusCode::BAD_REQUEST,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::Operation(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal detail stays in the log, not the response body.
        let message = match &self {
            Self::Database(source) => {
                log::error!("store failure: {source:#}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
