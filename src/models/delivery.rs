//! The delivery state machine and the payloads exchanged with channel senders.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// States of a delivery record.
///
/// ```text
/// pending -> sending -> delivered | bounced | failed
/// failed -> retrying -> sending          (while retry_count < max_retries)
/// pending | retrying -> cancelled
/// pending | retrying -> expired          (past expires_at)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created, first attempt not yet made.
    Pending,
    /// An attempt is in flight.
    Sending,
    /// The channel accepted the message.
    Delivered,
    /// The channel permanently rejected the recipient.
    Bounced,
    /// Retries are exhausted.
    Failed,
    /// Waiting for the next scheduled attempt.
    Retrying,
    /// Cancelled by an operator.
    Cancelled,
    /// Not delivered before `expires_at`.
    Expired,
}

impl DeliveryStatus {
    /// Returns the lowercase name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Bounced => "bounced",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Cancelled => "cancelled",
            DeliveryStatus::Expired => "expired",
        }
    }

    /// Whether no further transition is possible.
    ///
    /// `Failed` is only ever persisted once retries are exhausted; a failure
    /// with retries left is stored as `Retrying`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Bounced
                | DeliveryStatus::Failed
                | DeliveryStatus::Cancelled
                | DeliveryStatus::Expired
        )
    }

    /// Whether an attempt may start from this state.
    pub fn is_sendable(&self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::Retrying)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Pending, Sending)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Sending, Delivered)
                | (Sending, Bounced)
                | (Sending, Failed)
                | (Sending, Retrying)
                | (Sending, Expired)
                | (Failed, Retrying)
                | (Retrying, Sending)
                | (Retrying, Cancelled)
                | (Retrying, Expired)
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sending" => Ok(DeliveryStatus::Sending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "bounced" => Ok(DeliveryStatus::Bounced),
            "failed" => Ok(DeliveryStatus::Failed),
            "retrying" => Ok(DeliveryStatus::Retrying),
            "cancelled" => Ok(DeliveryStatus::Cancelled),
            "expired" => Ok(DeliveryStatus::Expired),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// What a delivery record delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum DeliverySubject {
    /// A single notification sent on its own.
    Notification(i64),
    /// A consolidated batch.
    Batch(i64),
}

impl DeliverySubject {
    /// The storage discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliverySubject::Notification(_) => "notification",
            DeliverySubject::Batch(_) => "batch",
        }
    }

    /// The referenced identifier.
    pub fn id(&self) -> i64 {
        match self {
            DeliverySubject::Notification(id) | DeliverySubject::Batch(id) => *id,
        }
    }

    /// Rebuilds a subject from its storage columns.
    pub fn from_parts(kind: &str, id: i64) -> Result<Self, String> {
        match kind {
            "notification" => Ok(DeliverySubject::Notification(id)),
            "batch" => Ok(DeliverySubject::Batch(id)),
            other => Err(format!("unknown delivery subject kind '{}'", other)),
        }
    }
}

/// The message handed to a channel sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    /// Message subject.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Recipient address or identifier.
    pub recipient_id: String,
    /// Channel name.
    pub channel: String,
}

/// The result reported by a channel sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    /// Whether the channel accepted the message.
    pub success: bool,
    /// Channel response details.
    #[serde(default)]
    pub response_data: Map<String, Value>,
    /// Failure description.
    pub error_message: Option<String>,
    /// Set when the channel permanently rejected the recipient.
    #[serde(default)]
    pub bounced: bool,
}

impl SendResult {
    /// An accepted send.
    pub fn success(response_data: Map<String, Value>) -> Self {
        Self { success: true, response_data, error_message: None, bounced: false }
    }

    /// A failed send that may be retried.
    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            response_data: Map::new(),
            error_message: Some(error_message.into()),
            bounced: false,
        }
    }

    /// A permanent rejection of the recipient.
    pub fn bounced(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            response_data: Map::new(),
            error_message: Some(error_message.into()),
            bounced: true,
        }
    }
}

/// A persisted delivery state machine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Store-assigned identifier.
    pub id: i64,
    /// The notification or batch being delivered.
    pub subject_ref: DeliverySubject,
    /// The message.
    pub deliverable: Deliverable,
    /// Current state.
    pub status: DeliveryStatus,
    /// Retries scheduled so far.
    pub retry_count: u32,
    /// When the next attempt is due.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the record expires if still undelivered.
    pub expires_at: DateTime<Utc>,
    /// When the message was delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// Send latency of the successful attempt.
    pub delivery_time_ms: Option<i64>,
    /// Channel response of the last attempt.
    pub response_data: Option<Value>,
    /// Error of the last failed attempt.
    pub error_message: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a delivery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDelivery {
    /// The notification or batch being delivered.
    pub subject_ref: DeliverySubject,
    /// The message.
    pub deliverable: Deliverable,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record expires.
    pub expires_at: DateTime<Utc>,
}

/// The state written when an attempt completes.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUpdate {
    /// The resulting state.
    pub status: DeliveryStatus,
    /// Retries scheduled so far.
    pub retry_count: u32,
    /// When the next attempt is due.
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// When the message was delivered.
    pub sent_at: Option<DateTime<Utc>>,
    /// Send latency.
    pub delivery_time_ms: Option<i64>,
    /// Channel response.
    pub response_data: Option<Value>,
    /// Failure description.
    pub error_message: Option<String>,
    /// When the update happened.
    pub updated_at: DateTime<Utc>,
}

/// Result of driving a delivery record through one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The channel accepted the message.
    Delivered {
        /// Send latency in milliseconds.
        delivery_time_ms: i64,
    },
    /// The channel permanently rejected the recipient.
    Bounced {
        /// Rejection reason.
        error_message: String,
    },
    /// The attempt failed and another one is scheduled.
    RetryScheduled {
        /// Retries scheduled so far.
        retry_count: u32,
        /// When the next attempt is due.
        next_attempt_at: DateTime<Utc>,
    },
    /// The attempt failed and retries are exhausted.
    Failed {
        /// Last failure description.
        error_message: String,
    },
    /// The record passed `expires_at` before it could be delivered.
    Expired,
    /// No attempt was made because the record is not in a sendable state
    /// (cancelled, already delivered, or claimed by another worker).
    Skipped {
        /// The state that prevented the attempt.
        status: DeliveryStatus,
    },
}
