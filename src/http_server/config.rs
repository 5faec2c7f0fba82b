use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, ApiState};

/// Rebuilds the engine configuration from file settings and stored
/// overrides. A rejected reload keeps the previous configuration.
pub async fn reload_config(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let config = state.engine.reload_config().await?;
    Ok((StatusCode::OK, Json(json!({ "config": config.as_ref() }))))
}

/// Body of a configuration override request.
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    /// The new value, as it would appear in the JSON form of the section.
    pub value: Value,
}

/// Stores an override of one tunable and returns the resulting
/// configuration.
pub async fn set_config_override(
    State(state): State<ApiState>,
    Path((config_type, config_key)): Path<(String, String)>,
    Json(body): Json<OverrideRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.engine.set_config_override(&config_type, &config_key, &body.value).await?;
    Ok((StatusCode::OK, Json(json!({ "config": config.as_ref() }))))
}
