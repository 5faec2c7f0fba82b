//! Batches that consolidate several notifications into one delivery.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NotificationRequest, Severity};
use crate::config::BatchingConfig;

const WILDCARD: &str = "*";

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Accepting new members.
    Open,
    /// Finalized into a delivery.
    Flushed,
    /// Abandoned by an operator.
    Cancelled,
}

impl BatchStatus {
    /// Returns the lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "open",
            BatchStatus::Flushed => "flushed",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(BatchStatus::Open),
            "flushed" => Ok(BatchStatus::Flushed),
            "cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

/// The dimensions a batch is grouped by. A `None` dimension is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupingKey {
    /// Recipient, when grouping by user.
    pub recipient_id: Option<String>,
    /// Channel, when grouping by channel.
    pub channel: Option<String>,
    /// Severity, when grouping by severity.
    pub severity: Option<Severity>,
}

impl GroupingKey {
    /// Derives the key for `request` from the enabled grouping dimensions.
    pub fn for_request(request: &NotificationRequest, config: &BatchingConfig) -> Self {
        Self {
            recipient_id: config.group_by_user.then(|| request.recipient_id.clone()),
            channel: config.group_by_channel.then(|| request.channel.clone()),
            severity: config.group_by_severity.then_some(request.severity),
        }
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.recipient_id.as_deref().unwrap_or(WILDCARD),
            self.channel.as_deref().unwrap_or(WILDCARD),
            self.severity.map(|s| s.as_str()).unwrap_or(WILDCARD)
        )
    }
}

/// An accumulator for consolidated delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBatch {
    /// Store-assigned identifier.
    pub id: i64,
    /// The grouping key this batch collects for.
    pub key: GroupingKey,
    /// Lifecycle status.
    pub status: BatchStatus,
    /// Highest priority score among members.
    pub priority_score: u8,
    /// Number of members.
    pub member_count: u32,
    /// When the batch was opened.
    pub created_at: DateTime<Utc>,
    /// When the batch becomes due for a time-based flush.
    pub scheduled_for: DateTime<Utc>,
    /// When the batch was flushed.
    pub sent_at: Option<DateTime<Utc>>,
    /// Subject of the consolidated message, set on flush.
    pub consolidated_subject: Option<String>,
    /// Body of the consolidated message, set on flush.
    pub consolidated_message: Option<String>,
}

impl NotificationBatch {
    /// Whether the batch still accepts members.
    pub fn is_open(&self) -> bool {
        self.status == BatchStatus::Open
    }

    /// Whether the time-based flush is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.scheduled_for <= now
    }
}

/// Parameters for opening a new batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    /// The grouping key.
    pub key: GroupingKey,
    /// When the batch is opened.
    pub created_at: DateTime<Utc>,
    /// When the batch becomes due.
    pub scheduled_for: DateTime<Utc>,
}

/// The consolidated message produced when a batch is flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Summary subject.
    pub subject: String,
    /// Summary body.
    pub message: String,
    /// Number of members the summary was built from. Finalizing fails if
    /// the batch grew in the meantime.
    pub member_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::NotificationRequestBuilder;

    #[test]
    fn test_grouping_key_uses_enabled_dimensions() {
        let request = NotificationRequestBuilder::new("u1")
            .channel("slack")
            .severity(Severity::High)
            .build();

        let key = GroupingKey::for_request(&request, &BatchingConfig::default());
        assert_eq!(key.to_string(), "u1|slack|high");

        let config = BatchingConfig {
            group_by_severity: false,
            group_by_channel: false,
            ..Default::default()
        };
        let key = GroupingKey::for_request(&request, &config);
        assert_eq!(key.recipient_id.as_deref(), Some("u1"));
        assert_eq!(key.channel, None);
        assert_eq!(key.to_string(), "u1|*|*");
    }

    #[test]
    fn test_batch_status_parsing() {
        assert_eq!("open".parse::<BatchStatus>().unwrap(), BatchStatus::Open);
        assert_eq!("flushed".parse::<BatchStatus>().unwrap(), BatchStatus::Flushed);
        assert_eq!("cancelled".parse::<BatchStatus>().unwrap(), BatchStatus::Cancelled);
        assert!("closed".parse::<BatchStatus>().is_err());
    }
}
