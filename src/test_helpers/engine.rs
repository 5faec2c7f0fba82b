use std::sync::Arc;

use crate::{
    channels::{ChannelRegistry, ChannelSender},
    clock::Clock,
    config::{ConfigManager, EngineConfig},
    engine::notification_engine::NotificationEngine,
    persistence::SqliteMetricsStore,
};

/// Creates a migrated in-memory store.
pub async fn create_test_store() -> Arc<SqliteMetricsStore> {
    let store = SqliteMetricsStore::new("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");
    store.run_migrations().await.expect("Failed to run migrations");
    Arc::new(store)
}

/// Creates an engine over a fresh in-memory store with `sender` registered
/// for each of `channels`.
pub async fn create_test_engine(
    config: EngineConfig,
    channels: &[&str],
    sender: Arc<dyn ChannelSender>,
    clock: Arc<dyn Clock>,
) -> (Arc<NotificationEngine>, Arc<SqliteMetricsStore>) {
    let store = create_test_store().await;
    let mut registry = ChannelRegistry::new();
    for channel in channels {
        registry.register(*channel, Arc::clone(&sender));
    }
    let manager = Arc::new(
        ConfigManager::new(config, store.clone())
            .await
            .expect("Failed to create config manager"),
    );
    let engine = NotificationEngine::new(store.clone(), registry, manager, clock);
    (Arc::new(engine), store)
}
