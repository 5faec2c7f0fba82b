//! Holds the active engine configuration snapshot and rebuilds it on reload.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ConfigError, EngineConfig};
use crate::persistence::traits::MetricsStore;

/// A single stored override from the `notification_config` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverride {
    /// The section the override targets (`batching`, `throttling`,
    /// `delivery`).
    pub config_type: String,
    /// The field within the section.
    pub config_key: String,
    /// A JSON literal holding the new value.
    pub config_value: String,
}

/// Owns the immutable configuration snapshot shared by every evaluation
/// cycle.
///
/// Callers take a snapshot with [`ConfigManager::snapshot`] and keep using it
/// for the whole cycle. A reload builds a new snapshot from the file
/// configuration plus stored overrides and swaps it in atomically; snapshots
/// already handed out are never mutated.
pub struct ConfigManager {
    /// Configuration as loaded from file and environment.
    base: EngineConfig,
    /// The active snapshot.
    current: ArcSwap<EngineConfig>,
    /// Source of stored overrides.
    store: Arc<dyn MetricsStore>,
}

impl ConfigManager {
    /// Creates a manager and applies any stored overrides.
    pub async fn new(base: EngineConfig, store: Arc<dyn MetricsStore>) -> Result<Self, ConfigError> {
        base.validate()?;
        let manager = Self { current: ArcSwap::from_pointee(base.clone()), base, store };
        manager.reload().await?;
        Ok(manager)
    }

    /// Returns the active snapshot.
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.load_full()
    }

    /// Rebuilds the snapshot from the base configuration and the stored
    /// overrides. On failure the previous snapshot stays active.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn reload(&self) -> Result<Arc<EngineConfig>, ConfigError> {
        let overrides = self.store.get_config_overrides().await?;
        let config = match apply_overrides(&self.base, &overrides) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                tracing::error!(error = %e, "Configuration reload rejected, keeping previous snapshot.");
                return Err(e);
            }
        };
        self.current.store(Arc::clone(&config));
        tracing::info!(overrides = overrides.len(), "Engine configuration loaded.");
        Ok(config)
    }

    /// Validates and stores an override, then reloads.
    pub async fn set_override(
        &self,
        config_override: ConfigOverride,
    ) -> Result<Arc<EngineConfig>, ConfigError> {
        let mut overrides = self.store.get_config_overrides().await?;
        overrides.retain(|o| {
            o.config_type != config_override.config_type
                || o.config_key != config_override.config_key
        });
        overrides.push(config_override.clone());
        apply_overrides(&self.base, &overrides)?;

        self.store.set_config_override(&config_override).await?;
        self.reload().await
    }
}

/// Layers stored overrides over `base` and validates the result.
pub fn apply_overrides(
    base: &EngineConfig,
    overrides: &[ConfigOverride],
) -> Result<EngineConfig, ConfigError> {
    let mut value =
        serde_json::to_value(base).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    for o in overrides {
        let reject = |message: &str| ConfigError::Override {
            config_type: o.config_type.clone(),
            config_key: o.config_key.clone(),
            message: message.to_string(),
        };

        let section = value
            .get_mut(o.config_type.as_str())
            .and_then(Value::as_object_mut)
            .ok_or_else(|| reject("unknown section"))?;
        if !section.contains_key(&o.config_key) {
            return Err(reject("unknown key"));
        }
        let parsed: Value =
            serde_json::from_str(&o.config_value).map_err(|e| reject(&e.to_string()))?;
        section.insert(o.config_key.clone(), parsed);
    }

    let config: EngineConfig =
        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
