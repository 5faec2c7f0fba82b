//! Defines the custom `ApiError` type for the HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{config::ConfigError, engine::notification_engine::EngineError};

/// A custom error type for the API that can be converted into an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Represents an unauthorized request.
    Unauthorized,

    /// Represents a resource that could not be found.
    NotFound(String),

    /// Represents a validation error for an unprocessable entity.
    UnprocessableEntity(String),

    /// Represents a conflict with the target's current state.
    Conflict(String),

    /// Represents a generic internal server error.
    InternalServerError(String),
}

/// Converts an `EngineError` into an `ApiError`.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            EngineError::InvalidState(message) => ApiError::Conflict(message),
            EngineError::Config(ConfigError::Persistence(e)) =>
                ApiError::InternalServerError(e.to_string()),
            EngineError::Config(e) => ApiError::UnprocessableEntity(e.to_string()),
            EngineError::UnknownChannel(channel) =>
                ApiError::UnprocessableEntity(format!("Unknown channel '{}'", channel)),
            EngineError::InvalidRequest(message) => ApiError::UnprocessableEntity(message),
            EngineError::Persistence(e) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

/// Implements the conversion from `ApiError` into an `axum` response.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Unauthorized =>
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" })),
            ApiError::InternalServerError(err) => {
                tracing::error!("Internal server error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred" }),
                )
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::UnprocessableEntity(message) =>
                (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": message })),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, json!({ "error": message })),
        };

        (status, Json(body)).into_response()
    }
}
