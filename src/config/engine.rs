//! Tunables for the admission, batching and delivery engine.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Upper bound for minute-valued windows and delays (one week).
const MAX_WINDOW_MINUTES: u32 = 7 * 24 * 60;

/// Upper bound for `delivery.max_delay_seconds` (one week).
const MAX_RETRY_DELAY_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for `delivery.expiry_hours` (one year).
const MAX_EXPIRY_HOURS: u32 = 365 * 24;

fn default_true() -> bool {
    true
}

fn default_max_batch_size() -> u32 {
    10
}

fn default_max_batch_delay_minutes() -> u32 {
    30
}

fn default_rate_limit_per_hour() -> u32 {
    50
}

fn default_rate_limit_per_day() -> u32 {
    200
}

fn default_cooldown_minutes() -> u32 {
    5
}

fn default_burst_limit() -> u32 {
    10
}

fn default_burst_window_minutes() -> u32 {
    15
}

fn default_exempt_priority_threshold() -> u8 {
    80
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_seconds() -> u64 {
    5
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_seconds() -> u64 {
    3600
}

fn default_expiry_hours() -> u32 {
    24
}

/// Settings that control how allowed notifications are consolidated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchingConfig {
    /// Master switch. When off every allowed notification is sent on its own.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Member count at which an open batch is flushed synchronously.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: u32,

    /// Maximum age of an open batch before the sweep flushes it.
    #[serde(default = "default_max_batch_delay_minutes")]
    pub max_batch_delay_minutes: u32,

    /// Send exempt notifications immediately instead of batching them.
    #[serde(default)]
    pub priority_override: bool,

    /// Group batches by recipient.
    #[serde(default = "default_true")]
    pub group_by_user: bool,

    /// Group batches by severity.
    #[serde(default = "default_true")]
    pub group_by_severity: bool,

    /// Group batches by channel.
    #[serde(default = "default_true")]
    pub group_by_channel: bool,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: default_max_batch_size(),
            max_batch_delay_minutes: default_max_batch_delay_minutes(),
            priority_override: false,
            group_by_user: true,
            group_by_severity: true,
            group_by_channel: true,
        }
    }
}

impl BatchingConfig {
    /// Time after creation at which an open batch becomes due.
    pub fn max_batch_delay(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.max_batch_delay_minutes))
    }
}

/// Rate limits applied per (recipient, channel).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThrottlingConfig {
    /// Master switch. When off every request is allowed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cap within a fixed one-hour window.
    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,

    /// Cap within a fixed 24-hour window.
    #[serde(default = "default_rate_limit_per_day")]
    pub rate_limit_per_day: u32,

    /// Minimum spacing between consecutive allowed notifications.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,

    /// Cap within the short burst window.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,

    /// Length of the burst window.
    #[serde(default = "default_burst_window_minutes")]
    pub burst_window_minutes: u32,

    /// Requests scoring at or above `exempt_priority_threshold` bypass limits.
    #[serde(default = "default_true")]
    pub exempt_high_priority: bool,

    /// Critical requests bypass limits.
    #[serde(default = "default_true")]
    pub exempt_critical_severity: bool,

    /// Priority score treated as "high priority" for exemption.
    #[serde(default = "default_exempt_priority_threshold")]
    pub exempt_priority_threshold: u8,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_per_hour: default_rate_limit_per_hour(),
            rate_limit_per_day: default_rate_limit_per_day(),
            cooldown_minutes: default_cooldown_minutes(),
            burst_limit: default_burst_limit(),
            burst_window_minutes: default_burst_window_minutes(),
            exempt_high_priority: true,
            exempt_critical_severity: true,
            exempt_priority_threshold: default_exempt_priority_threshold(),
        }
    }
}

impl ThrottlingConfig {
    /// Minimum spacing between allowed notifications.
    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.cooldown_minutes))
    }

    /// Length of the burst window.
    pub fn burst_window(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.burst_window_minutes))
    }
}

/// Retry and expiry policy for the delivery state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryConfig {
    /// Failures tolerated before a delivery becomes terminally `failed`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry.
    #[serde(default = "default_initial_delay_seconds")]
    pub initial_delay_seconds: u64,

    /// Growth factor applied per retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single retry delay.
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,

    /// Hours after creation at which an undelivered record expires.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_seconds: default_initial_delay_seconds(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_seconds: default_max_delay_seconds(),
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl DeliveryConfig {
    /// Computes the wait before the next attempt after `retry_count` prior
    /// retries: `min(initial * multiplier ^ retry_count, max)`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let delay = self.initial_delay_seconds as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_seconds as f64);
        Duration::try_from_secs_f64(capped.max(0.0))
            .unwrap_or(Duration::from_secs(self.max_delay_seconds))
    }

    /// Lifetime of a delivery record.
    pub fn expiry(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.expiry_hours))
    }
}

/// A complete, immutable snapshot of the engine tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Batching section.
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Throttling section.
    #[serde(default)]
    pub throttling: ThrottlingConfig,

    /// Delivery section.
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl EngineConfig {
    /// Checks every tunable against its permitted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.batching.max_batch_size == 0 {
            return invalid("batching.max_batch_size must be at least 1");
        }
        if self.batching.max_batch_delay_minutes > MAX_WINDOW_MINUTES {
            return invalid("batching.max_batch_delay_minutes must not exceed one week");
        }
        if self.throttling.cooldown_minutes > MAX_WINDOW_MINUTES {
            return invalid("throttling.cooldown_minutes must not exceed one week");
        }
        if self.throttling.rate_limit_per_hour == 0 {
            return invalid("throttling.rate_limit_per_hour must be at least 1");
        }
        if self.throttling.rate_limit_per_day == 0 {
            return invalid("throttling.rate_limit_per_day must be at least 1");
        }
        if self.throttling.burst_limit == 0 {
            return invalid("throttling.burst_limit must be at least 1");
        }
        if self.throttling.burst_window_minutes == 0
            || self.throttling.burst_window_minutes > MAX_WINDOW_MINUTES
        {
            return invalid("throttling.burst_window_minutes must be between 1 and one week");
        }
        if self.throttling.exempt_priority_threshold > 100 {
            return invalid("throttling.exempt_priority_threshold must be within 0..=100");
        }
        if !self.delivery.backoff_multiplier.is_finite() || self.delivery.backoff_multiplier < 1.0 {
            return invalid("delivery.backoff_multiplier must be a finite number >= 1.0");
        }
        if self.delivery.initial_delay_seconds > self.delivery.max_delay_seconds {
            return invalid("delivery.initial_delay_seconds must not exceed max_delay_seconds");
        }
        if self.delivery.max_delay_seconds > MAX_RETRY_DELAY_SECONDS {
            return invalid("delivery.max_delay_seconds must not exceed one week");
        }
        if self.delivery.expiry_hours == 0 || self.delivery.expiry_hours > MAX_EXPIRY_HOURS {
            return invalid("delivery.expiry_hours must be between 1 and one year");
        }
        Ok(())
    }
}
