//! The Supervisor module manages the lifecycle of the Herald process.
//!
//! It owns the engine, the periodic sweeper and the admin HTTP server,
//! listens for shutdown signals and runs a final flush before exiting.
//!
//! ## Responsibilities
//!
//! - **Initialization**: The `SupervisorBuilder` wires the store, channel
//!   senders, configuration manager and engine together.
//! - **Lifecycle Management**: The `Supervisor` starts the sweeper and the
//!   HTTP server and watches their health.
//! - **Graceful Shutdown**: On `SIGINT`/`SIGTERM` every open batch is flushed
//!   and due deliveries are attempted, bounded by `shutdown_timeout`.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{AppConfig, ConfigError},
    engine::{notification_engine::NotificationEngine, sweeper::Sweeper},
    http_server,
    persistence::SqliteMetricsStore,
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// A metrics store was not provided to the `SupervisorBuilder`.
    #[error("Missing metrics store for Supervisor")]
    MissingStore,

    /// The engine configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The store backing the engine.
    store: Arc<SqliteMetricsStore>,

    /// The notification engine.
    engine: Arc<NotificationEngine>,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// A set of all spawned tasks that the supervisor is actively managing.
    join_set: tokio::task::JoinSet<()>,
}

impl Supervisor {
    /// Creates a new Supervisor instance.
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<SqliteMetricsStore>,
        engine: Arc<NotificationEngine>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// The engine run by this supervisor.
    pub fn engine(&self) -> Arc<NotificationEngine> {
        Arc::clone(&self.engine)
    }

    /// A token that stops the supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Starts the supervisor and all its managed services, and returns once
    /// shutdown has completed.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();

        // Spawn a task to listen for shutdown signals.
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to register SIGTERM handler.");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
                _ = cancellation_token.cancelled() => {}
            }

            cancellation_token.cancel();
        });

        if self.config.server.enabled {
            let server_config = Arc::clone(&self.config);
            let server_engine = Arc::clone(&self.engine);
            let http_cancellation_token = self.cancellation_token.clone();
            self.join_set.spawn(async move {
                tokio::select! {
                    result = http_server::run_server_from_config(server_config, server_engine) => {
                        if let Err(e) = result {
                            tracing::error!(error = %e, "HTTP server failed. Initiating shutdown.");
                            http_cancellation_token.cancel();
                        }
                    },
                    _ = http_cancellation_token.cancelled() => {
                        tracing::info!("HTTP server received shutdown signal.");
                    }
                }
            });
        }

        let sweeper = Sweeper::new(
            Arc::clone(&self.engine),
            self.config.sweep_interval_secs,
            self.cancellation_token.clone(),
        );
        self.join_set.spawn(async move {
            sweeper.run().await;
        });

        tracing::info!(channels = ?self.engine.channels(), "Supervisor started.");

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        self.join_set.shutdown().await;
        tracing::info!("All supervised tasks have completed.");

        let shutdown_timeout = self.config.shutdown_timeout;
        let cleanup_logic = async {
            let report = self.engine.shutdown_flush().await;
            tracing::info!(
                flushed_batches = report.flushed_batches.len(),
                attempted = report.deliveries.attempted.len(),
                "Final flush completed."
            );
        };

        if tokio::time::timeout(shutdown_timeout, cleanup_logic).await.is_err() {
            tracing::warn!(
                "Final flush did not complete within the timeout of {:?}. Continuing shutdown.",
                shutdown_timeout
            );
        }
        self.store.close().await;

        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }
}
