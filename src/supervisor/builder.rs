//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use super::{Supervisor, SupervisorError};
use crate::{
    channels::ChannelRegistry,
    clock::{Clock, SystemClock},
    config::{AppConfig, ConfigManager},
    engine::notification_engine::NotificationEngine,
    persistence::SqliteMetricsStore,
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<SqliteMetricsStore>>,
    channels: Option<ChannelRegistry>,
    clock: Option<Arc<dyn Clock>>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the metrics store (database connection) for the `Supervisor`.
    pub fn store(mut self, store: Arc<SqliteMetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the channel senders. Defaults to a log sender for each channel
    /// listed in the configuration.
    pub fn channels(mut self, channels: ChannelRegistry) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Sets the time source. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    ///
    /// Stored configuration overrides are applied on top of the file
    /// configuration here, so an invalid override stops startup.
    pub async fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let store = self.store.ok_or(SupervisorError::MissingStore)?;
        let channels = self
            .channels
            .unwrap_or_else(|| ChannelRegistry::with_log_senders(config.channels.clone()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        tracing::debug!("Loading engine configuration overrides...");
        let config_manager = Arc::new(ConfigManager::new(config.engine.clone(), store.clone()).await?);

        let engine = NotificationEngine::new(store.clone(), channels, config_manager, clock);
        Ok(Supervisor::new(Arc::new(config), store, Arc::new(engine)))
    }
}
