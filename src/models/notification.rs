//! Data models for incoming notification requests.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThrottlingConfig;

/// Severity assigned by the upstream change classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational change.
    Low,
    /// Noteworthy change.
    Medium,
    /// Significant change.
    High,
    /// Change requiring immediate attention.
    Critical,
}

impl Severity {
    /// Returns the lowercase name used in storage and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// One candidate alert produced by the classifier. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// The recipient the alert is addressed to.
    pub recipient_id: String,
    /// The delivery channel (e.g. `email`, `slack`).
    pub channel: String,
    /// Classifier severity.
    pub severity: Severity,
    /// Classifier priority in `0..=100`.
    pub priority_score: u8,
    /// Short human-readable subject.
    pub subject: String,
    /// Rendered message body.
    pub body: String,
    /// When the classifier produced the request.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Whether the request bypasses throttling under `config`.
    pub fn is_priority_exempt(&self, config: &ThrottlingConfig) -> bool {
        self.is_critical_exempt(config) || self.is_high_priority_exempt(config)
    }

    pub(crate) fn is_critical_exempt(&self, config: &ThrottlingConfig) -> bool {
        config.exempt_critical_severity && self.severity == Severity::Critical
    }

    pub(crate) fn is_high_priority_exempt(&self, config: &ThrottlingConfig) -> bool {
        config.exempt_high_priority && self.priority_score >= config.exempt_priority_threshold
    }

    /// Checks field ranges that the type system does not enforce.
    pub fn validate(&self) -> Result<(), String> {
        if self.priority_score > 100 {
            return Err(format!("priority_score {} is outside 0..=100", self.priority_score));
        }
        if self.recipient_id.trim().is_empty() {
            return Err("recipient_id must not be empty".to_string());
        }
        if self.channel.trim().is_empty() {
            return Err("channel must not be empty".to_string());
        }
        Ok(())
    }
}

/// Admission status of a persisted notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Persisted, not yet evaluated.
    Received,
    /// Suppressed by a rate limit.
    Throttled,
    /// Waiting in an open batch.
    Queued,
    /// Handed to the delivery orchestrator, alone or as part of a batch.
    Dispatched,
    /// Its batch was cancelled before flushing.
    Cancelled,
}

impl NotificationStatus {
    /// Returns the lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Received => "received",
            NotificationStatus::Throttled => "throttled",
            NotificationStatus::Queued => "queued",
            NotificationStatus::Dispatched => "dispatched",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(NotificationStatus::Received),
            "throttled" => Ok(NotificationStatus::Throttled),
            "queued" => Ok(NotificationStatus::Queued),
            "dispatched" => Ok(NotificationStatus::Dispatched),
            "cancelled" => Ok(NotificationStatus::Cancelled),
            other => Err(format!("unknown notification status '{}'", other)),
        }
    }
}

/// A notification request as persisted, with its admission outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNotification {
    /// Store-assigned identifier.
    pub id: i64,
    /// The original request.
    #[serde(flatten)]
    pub request: NotificationRequest,
    /// The batch the notification was folded into, if any.
    pub batch_id: Option<i64>,
    /// Current admission status.
    pub status: NotificationStatus,
    /// Reason code when throttled.
    pub throttle_reason: Option<String>,
}
