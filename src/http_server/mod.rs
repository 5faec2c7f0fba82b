//! Admin HTTP API.
//!
//! Read endpoints are always mounted. Endpoints that change state are only
//! mounted when an API key is configured, and require it as a bearer token.

mod auth;
mod batches;
mod config;
mod deliveries;
mod error;
mod notifications;
mod test_notification;
mod throttle;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
pub use error::ApiError;
use serde_json::json;
use thiserror::Error;

use crate::{config::AppConfig, engine::notification_engine::NotificationEngine};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The engine the handlers operate on.
    pub engine: Arc<NotificationEngine>,
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured listen address is not a socket address.
    #[error("Invalid server.listen_address '{0}'")]
    InvalidAddress(String),

    /// Binding or serving failed.
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Builds the router for the given state.
pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/batches/{id}", get(batches::get_batch))
        .route("/deliveries/{id}", get(deliveries::get_delivery))
        .route("/throttle/{user_id}/{channel}", get(throttle::get_throttle_metrics));

    if state.config.server.api_key.is_some() {
        let protected = Router::new()
            .route("/notifications", post(notifications::submit_notification))
            .route("/batches/{id}/send", post(batches::send_batch_now))
            .route("/batches/{id}/cancel", post(batches::cancel_batch))
            .route("/deliveries/{id}/cancel", post(deliveries::cancel_delivery))
            .route("/test-notification", post(test_notification::run_test_notification))
            .route("/config/reload", post(config::reload_config))
            .route("/config/{config_type}/{config_key}", put(config::set_config_override))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth));
        router = router.merge(protected);
    } else {
        tracing::warn!("No API key configured, write endpoints are disabled.");
    }

    router.with_state(state)
}

/// Runs the HTTP server based on the provided application configuration.
pub async fn run_server_from_config(
    config: Arc<AppConfig>,
    engine: Arc<NotificationEngine>,
) -> Result<(), ServerError> {
    let addr: SocketAddr = config
        .server
        .listen_address
        .parse()
        .map_err(|_| ServerError::InvalidAddress(config.server.listen_address.clone()))?;

    let app = create_router(ApiState { config, engine });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Admin API listening.");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
