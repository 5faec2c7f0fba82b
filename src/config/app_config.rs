use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use super::{
    ConfigError, EngineConfig, ServerConfig, deserialize_duration_from_seconds,
    serialize_duration_to_seconds,
};

/// Provides the default value for shutdown_timeout.
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default value for sweep_interval_secs.
fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

/// Provides the default set of channels served by the log sender.
fn default_channels() -> Vec<String> {
    vec!["email".to_string(), "slack".to_string(), "teams".to_string()]
}

/// Application configuration for Herald.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Database URL for the SQLite database.
    pub database_url: String,

    /// The interval between periodic sweeps (batch-age flush, retries,
    /// expiry).
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_sweep_interval"
    )]
    pub sweep_interval_secs: Duration,

    /// The maximum time in seconds to wait for graceful shutdown.
    #[serde(
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds",
        default = "default_shutdown_timeout"
    )]
    pub shutdown_timeout: Duration,

    /// Channel names the process accepts.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Engine tunables as loaded from file and environment.
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            sweep_interval_secs: default_sweep_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            channels: default_channels(),
            server: ServerConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Creates a new `AppConfig` by reading `app.yaml` from the configuration
    /// directory, layered with `HERALD__`-prefixed environment variables.
    pub fn new(config_dir: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir_str = config_dir.unwrap_or("configs");
        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/app.yaml", config_dir_str)))
            .add_source(Environment::with_prefix("HERALD").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.engine.validate()?;
        Ok(config)
    }
}
