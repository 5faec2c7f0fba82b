//! Error types for configuration loading and validation.

use thiserror::Error;

use crate::persistence::error::PersistenceError;

/// Errors raised while loading, validating or reloading configuration.
///
/// These are fatal at startup. On reload the previous snapshot stays in
/// effect.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A tunable holds a value outside its permitted range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A stored override could not be applied.
    #[error("Invalid override {config_type}.{config_key}: {message}")]
    Override {
        /// The section the override targets.
        config_type: String,
        /// The key within the section.
        config_key: String,
        /// Why the override was rejected.
        message: String,
    },

    /// Stored overrides could not be read.
    #[error("Failed to read configuration overrides: {0}")]
    Persistence(#[from] PersistenceError),
}
