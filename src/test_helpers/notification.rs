//! A builder for creating `NotificationRequest` instances in tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{NotificationRequest, Severity};

/// A builder for creating `NotificationRequest` instances in tests.
///
/// Defaults to a medium-severity email with a priority score below the
/// exemption threshold.
#[derive(Debug, Clone)]
pub struct NotificationRequestBuilder {
    recipient_id: String,
    channel: Option<String>,
    severity: Option<Severity>,
    priority_score: Option<u8>,
    subject: Option<String>,
    body: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl NotificationRequestBuilder {
    /// Creates a new `NotificationRequestBuilder` for `recipient_id`.
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            channel: None,
            severity: None,
            priority_score: None,
            subject: None,
            body: None,
            created_at: None,
        }
    }

    /// Sets the channel.
    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = Some(channel.to_string());
        self
    }

    /// Sets the severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Sets the priority score.
    pub fn priority_score(mut self, priority_score: u8) -> Self {
        self.priority_score = Some(priority_score);
        self
    }

    /// Sets the subject.
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Sets the classifier timestamp.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the `NotificationRequest`.
    pub fn build(self) -> NotificationRequest {
        NotificationRequest {
            recipient_id: self.recipient_id,
            channel: self.channel.unwrap_or_else(|| "email".to_string()),
            severity: self.severity.unwrap_or(Severity::Medium),
            priority_score: self.priority_score.unwrap_or(50),
            subject: self.subject.unwrap_or_else(|| "Ordinance amended".to_string()),
            body: self
                .body
                .unwrap_or_else(|| "Section 12 of the zoning ordinance was amended.".to_string()),
            created_at: self
                .created_at
                .unwrap_or_else(|| Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()),
        }
    }
}
