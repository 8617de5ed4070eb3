//! Mapping from library errors to HTTP responses

use axum::{http::StatusCode, Json};
use libpostify::error::{IdentityError, MediaError};
use libpostify::PostifyError;
use serde_json::{json, Value};
use tracing::error;

/// Handler error: a status and a `{"error": ...}` body
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

pub fn not_found(what: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("{} not found", what))
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("Request failed: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Status for a library error surfaced from a handler
pub fn from_postify(e: PostifyError) -> ApiError {
    match e {
        PostifyError::InvalidInput(msg) => bad_request(msg),
        PostifyError::NotFound(what) => not_found(&what),
        PostifyError::Identity(
            inner @ (IdentityError::InvalidCredentials | IdentityError::InvalidSession),
        ) => api_error(StatusCode::UNAUTHORIZED, inner.to_string()),
        PostifyError::Identity(
            inner @ (IdentityError::UsernameTaken | IdentityError::Validation(_)),
        ) => bad_request(inner.to_string()),
        PostifyError::Media(inner @ MediaError::UnsupportedType(_)) => {
            api_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, inner.to_string())
        }
        other => internal(other),
    }
}
