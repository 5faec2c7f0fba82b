//! Handler for submitting notification requests.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::{ApiError, ApiState};
use crate::models::NotificationRequest;

/// Persists, throttles and admits a notification request.
pub async fn submit_notification(
    State(state): State<ApiState>,
    Json(payload): Json<NotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.engine.submit(payload).await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
