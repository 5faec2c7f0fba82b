//! Rate-limit state, decisions and their audit records.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::NotificationRequest;

/// Fixed-window rate state for one (recipient, channel) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleMetric {
    /// The recipient this metric tracks.
    pub recipient_id: String,
    /// The channel this metric tracks.
    pub channel: String,
    /// Allowed notifications in the current hour window.
    pub hourly_count: u32,
    /// Start of the current hour window.
    pub hour_window_start: DateTime<Utc>,
    /// Allowed notifications in the current day window.
    pub daily_count: u32,
    /// Start of the current day window.
    pub day_window_start: DateTime<Utc>,
    /// When the last notification allowed for an immediate send passed.
    pub last_notification_time: Option<DateTime<Utc>>,
    /// Notifications in the current burst window.
    pub burst_count: u32,
    /// Start of the current burst window.
    pub burst_window_start: DateTime<Utc>,
}

impl ThrottleMetric {
    /// Creates an empty metric whose windows all start at `now`.
    pub fn new(recipient_id: &str, channel: &str, now: DateTime<Utc>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            channel: channel.to_string(),
            hourly_count: 0,
            hour_window_start: now,
            daily_count: 0,
            day_window_start: now,
            last_notification_time: None,
            burst_count: 0,
            burst_window_start: now,
        }
    }
}

/// Why a request was throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    /// The previous allowed notification is too recent.
    CooldownActive,
    /// Too many notifications within the burst window.
    BurstLimitExceeded,
    /// The hourly cap is reached.
    HourlyLimitExceeded,
    /// The daily cap is reached.
    DailyLimitExceeded,
}

impl ThrottleReason {
    /// Returns the reason code recorded in audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleReason::CooldownActive => "cooldown_active",
            ThrottleReason::BurstLimitExceeded => "burst_limit_exceeded",
            ThrottleReason::HourlyLimitExceeded => "hourly_limit_exceeded",
            ThrottleReason::DailyLimitExceeded => "daily_limit_exceeded",
        }
    }
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowReason {
    /// All limits had headroom.
    WithinLimits,
    /// Throttling is switched off.
    ThrottlingDisabled,
    /// Critical severity exemption.
    CriticalSeverity,
    /// High priority exemption.
    HighPriority,
}

impl AllowReason {
    /// Returns the reason code recorded in audit events.
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowReason::WithinLimits => "within_limits",
            AllowReason::ThrottlingDisabled => "throttling_disabled",
            AllowReason::CriticalSeverity => "critical_severity",
            AllowReason::HighPriority => "high_priority",
        }
    }

    /// Whether the request bypassed the limits through an exemption.
    pub fn is_exemption(&self) -> bool {
        matches!(self, AllowReason::CriticalSeverity | AllowReason::HighPriority)
    }
}

/// Outcome of evaluating one request against its rate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum ThrottleDecision {
    /// Send (or batch) the notification.
    Allow(AllowReason),
    /// Suppress the notification.
    Throttle(ThrottleReason),
}

impl ThrottleDecision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allow(_))
    }

    /// The audit event type for this decision.
    pub fn event_type(&self) -> ThrottleEventType {
        match self {
            ThrottleDecision::Allow(reason) if reason.is_exemption() => ThrottleEventType::Exempted,
            ThrottleDecision::Allow(_) => ThrottleEventType::Allowed,
            ThrottleDecision::Throttle(_) => ThrottleEventType::Throttled,
        }
    }

    /// The reason code recorded in audit events.
    pub fn reason(&self) -> &'static str {
        match self {
            ThrottleDecision::Allow(reason) => reason.as_str(),
            ThrottleDecision::Throttle(reason) => reason.as_str(),
        }
    }
}

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleEventType {
    /// Allowed within limits.
    Allowed,
    /// Allowed through an exemption.
    Exempted,
    /// Suppressed.
    Throttled,
}

impl ThrottleEventType {
    /// Returns the lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleEventType::Allowed => "allowed",
            ThrottleEventType::Exempted => "exempted",
            ThrottleEventType::Throttled => "throttled",
        }
    }
}

impl FromStr for ThrottleEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(ThrottleEventType::Allowed),
            "exempted" => Ok(ThrottleEventType::Exempted),
            "throttled" => Ok(ThrottleEventType::Throttled),
            other => Err(format!("unknown throttle event type '{}'", other)),
        }
    }
}

/// Append-only audit record of one throttle decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleEvent {
    /// The recipient the decision applied to.
    pub recipient_id: String,
    /// The channel the decision applied to.
    pub channel: String,
    /// Kind of decision.
    pub event_type: ThrottleEventType,
    /// Reason code.
    pub reason: String,
    /// Snapshot of the evaluated request.
    pub notification_data: Value,
    /// When the decision was made.
    pub created_at: DateTime<Utc>,
}

impl ThrottleEvent {
    /// Builds the audit record for `decision` on `request`.
    pub fn record(
        request: &NotificationRequest,
        notification_id: Option<i64>,
        decision: &ThrottleDecision,
        now: DateTime<Utc>,
    ) -> Self {
        let mut notification_data = serde_json::to_value(request).unwrap_or(Value::Null);
        if let (Some(id), Value::Object(map)) = (notification_id, &mut notification_data) {
            map.insert("notification_id".to_string(), Value::from(id));
        }
        Self {
            recipient_id: request.recipient_id.clone(),
            channel: request.channel.clone(),
            event_type: decision.event_type(),
            reason: decision.reason().to_string(),
            notification_data,
            created_at: now,
        }
    }
}
