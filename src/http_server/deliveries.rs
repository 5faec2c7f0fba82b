//! Handlers for delivery-related endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use super::{ApiError, ApiState};

/// Retrieves a delivery record.
pub async fn get_delivery(
    State(state): State<ApiState>,
    Path(delivery_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = state.engine.get_delivery(delivery_id).await?;
    Ok((StatusCode::OK, Json(json!({ "delivery": delivery }))))
}

/// Cancels a pending or retrying delivery.
pub async fn cancel_delivery(
    State(state): State<ApiState>,
    Path(delivery_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.cancel_delivery(delivery_id).await?;
    Ok((StatusCode::OK, Json(json!({ "status": "cancelled" }))))
}
