use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::{ApiError, ApiState};

/// Returns the rate state and recent throttle events for a recipient on a
/// channel.
pub async fn get_throttle_metrics(
    State(state): State<ApiState>,
    Path((user_id, channel)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.engine.get_throttle_metrics(&user_id, &channel).await?;
    Ok((StatusCode::OK, Json(status)))
}
