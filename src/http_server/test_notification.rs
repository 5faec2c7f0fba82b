use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use super::{ApiError, ApiState};
use crate::engine::notification_engine::TestNotification;

/// Reports the throttle decision for the recipient and sends a test message
/// directly through the channel sender.
pub async fn run_test_notification(
    State(state): State<ApiState>,
    Json(payload): Json<TestNotification>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.engine.run_test_notification(payload).await?;
    Ok((StatusCode::OK, Json(report)))
}
