use lambda_http::http::StatusCode;
use std::fmt;
use thiserror::Error;

/// A single violated field, reported inside [`ApiError::Validation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Service-level failure. Every variant maps to one HTTP status and a
/// `{ "message": ... }` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{entity} validation failed: {}", join_fields(.errors))]
    Validation {
        entity: &'static str,
        errors: Vec<FieldError>,
    },
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("Admin access required")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{0} was modified concurrently, reload and retry")]
    VersionConflict(&'static str),
    #[error("Not found")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("internal error: {0}")]
    Internal(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ApiError {
    pub fn validation(entity: &'static str, errors: Vec<FieldError>) -> Self {
        ApiError::Validation { entity, errors }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. }
            | ApiError::InvalidBody(_)
            | ApiError::Conflict(_)
            | ApiError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated | ApiError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::RouteNotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::VersionConflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand to the client. Internal detail is replaced.
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidBody(err.to_string())
    }
}

/// Result alias used by every service operation.
pub type ApiResult<T> = Result<T, ApiError>;
