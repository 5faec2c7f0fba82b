//! Handlers for batch-related endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::{ApiError, ApiState};

/// Retrieves a batch with its members.
pub async fn get_batch(
    State(state): State<ApiState>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state.engine.get_batch(batch_id).await?;
    Ok((StatusCode::OK, Json(json!({ "batch": batch }))))
}

/// Flushes a batch immediately. Flushing a batch that is no longer open
/// changes nothing and reports its status.
pub async fn send_batch_now(
    State(state): State<ApiState>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.engine.send_batch_now(batch_id).await?;
    Ok((StatusCode::OK, Json(outcome)))
}

/// Cancels an open batch.
pub async fn cancel_batch(
    State(state): State<ApiState>,
    Path(batch_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.cancel_batch(batch_id).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "cancelled" }))))
}
