//! Configuration module for Herald.

mod app_config;
mod engine;
mod error;
mod helpers;
mod manager;
mod server;

pub use app_config::AppConfig;
pub use engine::{BatchingConfig, DeliveryConfig, EngineConfig, ThrottlingConfig};
pub use error::ConfigError;
pub use helpers::{deserialize_duration_from_seconds, serialize_duration_to_seconds};
pub use manager::{ConfigManager, ConfigOverride};
pub use server::ServerConfig;
