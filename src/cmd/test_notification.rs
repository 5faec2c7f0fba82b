//! Sends a test notification through a configured channel sender and prints
//! the report as JSON.

use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use crate::{
    channels::ChannelRegistry,
    clock::SystemClock,
    config::{AppConfig, ConfigError, ConfigManager},
    engine::notification_engine::{EngineError, NotificationEngine, TestNotification},
    models::Severity,
    persistence::{SqliteMetricsStore, error::PersistenceError},
};

/// Errors raised by the `test-notification` subcommand.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// The store could not be opened.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// The engine rejected the test.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    /// The report could not be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Arguments of the `test-notification` subcommand.
#[derive(Parser, Debug)]
pub struct TestNotificationArgs {
    /// Channel to send on.
    #[arg(short, long)]
    pub channel: String,
    /// Recipient to send to.
    #[arg(short, long)]
    pub recipient: String,
    /// Subject of the test message.
    #[arg(short, long)]
    pub subject: Option<String>,
    /// Severity used for the throttle decision.
    #[arg(long, default_value = "medium")]
    pub severity: Severity,
    /// Priority score used for the throttle decision.
    #[arg(long, default_value_t = 50)]
    pub priority_score: u8,
    /// Directory containing `app.yaml`.
    #[arg(long)]
    pub config_dir: Option<String>,
}

/// Runs the subcommand.
pub async fn execute(args: TestNotificationArgs) -> Result<(), Error> {
    let config = AppConfig::new(args.config_dir.as_deref())?;

    let store = Arc::new(SqliteMetricsStore::new(&config.database_url).await?);
    store.run_migrations().await?;

    let config_manager = Arc::new(ConfigManager::new(config.engine.clone(), store.clone()).await?);
    let engine = NotificationEngine::new(
        store.clone(),
        ChannelRegistry::with_log_senders(config.channels.clone()),
        config_manager,
        Arc::new(SystemClock::new()),
    );

    let report = engine
        .run_test_notification(TestNotification {
            channel: args.channel,
            recipient_id: args.recipient,
            subject: args.subject,
            body: None,
            severity: args.severity,
            priority_score: args.priority_score,
            config: None,
        })
        .await;
    store.close().await;

    println!("{}", serde_json::to_string_pretty(&report?)?);
    Ok(())
}
