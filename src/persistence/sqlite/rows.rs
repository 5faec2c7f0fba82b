//! Row types for the SQLite tables and their conversion into domain models.

use serde_json::Value;

use super::from_millis;
use crate::{
    models::{
        BatchStatus, Deliverable, DeliveryRecord, DeliveryStatus, DeliverySubject, GroupingKey,
        NotificationBatch, NotificationRequest, NotificationStatus, Severity, StoredNotification,
        ThrottleEvent, ThrottleEventType, ThrottleMetric,
    },
    persistence::error::PersistenceError,
};

fn parse<T>(value: &str) -> Result<T, PersistenceError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse::<T>().map_err(PersistenceError::SerializationError)
}

fn to_u32(value: i64, column: &str) -> Result<u32, PersistenceError> {
    u32::try_from(value).map_err(|_| {
        PersistenceError::SerializationError(format!("{} out of range: {}", column, value))
    })
}

fn to_u8(value: i64, column: &str) -> Result<u8, PersistenceError> {
    u8::try_from(value).map_err(|_| {
        PersistenceError::SerializationError(format!("{} out of range: {}", column, value))
    })
}

#[derive(sqlx::FromRow)]
pub(super) struct NotificationRow {
    id: i64,
    recipient_id: String,
    channel: String,
    severity: String,
    priority_score: i64,
    subject: String,
    body: String,
    batch_id: Option<i64>,
    status: String,
    throttle_reason: Option<String>,
    created_at: i64,
}

impl TryFrom<NotificationRow> for StoredNotification {
    type Error = PersistenceError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(StoredNotification {
            id: row.id,
            request: NotificationRequest {
                recipient_id: row.recipient_id,
                channel: row.channel,
                severity: parse::<Severity>(&row.severity)?,
                priority_score: to_u8(row.priority_score, "priority_score")?,
                subject: row.subject,
                body: row.body,
                created_at: from_millis(row.created_at)?,
            },
            batch_id: row.batch_id,
            status: parse::<NotificationStatus>(&row.status)?,
            throttle_reason: row.throttle_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ThrottleMetricRow {
    user_id: String,
    channel: String,
    hourly_count: i64,
    hour_window_start: i64,
    daily_count: i64,
    day_window_start: i64,
    last_notification_time: Option<i64>,
    burst_count: i64,
    burst_start_time: i64,
}

impl TryFrom<ThrottleMetricRow> for ThrottleMetric {
    type Error = PersistenceError;

    fn try_from(row: ThrottleMetricRow) -> Result<Self, Self::Error> {
        Ok(ThrottleMetric {
            recipient_id: row.user_id,
            channel: row.channel,
            hourly_count: to_u32(row.hourly_count, "hourly_count")?,
            hour_window_start: from_millis(row.hour_window_start)?,
            daily_count: to_u32(row.daily_count, "daily_count")?,
            day_window_start: from_millis(row.day_window_start)?,
            last_notification_time: row.last_notification_time.map(from_millis).transpose()?,
            burst_count: to_u32(row.burst_count, "burst_count")?,
            burst_window_start: from_millis(row.burst_start_time)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ThrottleEventRow {
    user_id: String,
    channel: String,
    event_type: String,
    reason: String,
    notification_data: String,
    created_at: i64,
}

impl TryFrom<ThrottleEventRow> for ThrottleEvent {
    type Error = PersistenceError;

    fn try_from(row: ThrottleEventRow) -> Result<Self, Self::Error> {
        Ok(ThrottleEvent {
            recipient_id: row.user_id,
            channel: row.channel,
            event_type: parse::<ThrottleEventType>(&row.event_type)?,
            reason: row.reason,
            notification_data: serde_json::from_str(&row.notification_data)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct BatchRow {
    id: i64,
    user_id: Option<String>,
    channel: Option<String>,
    severity: Option<String>,
    status: String,
    priority_score: i64,
    batch_size: i64,
    created_at: i64,
    scheduled_for: i64,
    sent_at: Option<i64>,
    consolidated_subject: Option<String>,
    consolidated_message: Option<String>,
}

impl TryFrom<BatchRow> for NotificationBatch {
    type Error = PersistenceError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(NotificationBatch {
            id: row.id,
            key: GroupingKey {
                recipient_id: row.user_id,
                channel: row.channel,
                severity: row.severity.as_deref().map(parse::<Severity>).transpose()?,
            },
            status: parse::<BatchStatus>(&row.status)?,
            priority_score: to_u8(row.priority_score, "priority_score")?,
            member_count: to_u32(row.batch_size, "batch_size")?,
            created_at: from_millis(row.created_at)?,
            scheduled_for: from_millis(row.scheduled_for)?,
            sent_at: row.sent_at.map(from_millis).transpose()?,
            consolidated_subject: row.consolidated_subject,
            consolidated_message: row.consolidated_message,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DeliveryRow {
    id: i64,
    subject_kind: String,
    subject_id: i64,
    recipient_id: String,
    channel: String,
    subject: String,
    body: String,
    status: String,
    retry_count: i64,
    next_attempt_at: Option<i64>,
    expires_at: i64,
    sent_at: Option<i64>,
    delivery_time_ms: Option<i64>,
    response_data: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = PersistenceError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let response_data = row
            .response_data
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()?;
        Ok(DeliveryRecord {
            id: row.id,
            subject_ref: DeliverySubject::from_parts(&row.subject_kind, row.subject_id)
                .map_err(PersistenceError::SerializationError)?,
            deliverable: Deliverable {
                subject: row.subject,
                body: row.body,
                recipient_id: row.recipient_id,
                channel: row.channel,
            },
            status: parse::<DeliveryStatus>(&row.status)?,
            retry_count: to_u32(row.retry_count, "retry_count")?,
            next_attempt_at: row.next_attempt_at.map(from_millis).transpose()?,
            expires_at: from_millis(row.expires_at)?,
            sent_at: row.sent_at.map(from_millis).transpose()?,
            delivery_time_ms: row.delivery_time_ms,
            response_data,
            error_message: row.error_message,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}
