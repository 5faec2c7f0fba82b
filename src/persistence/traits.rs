//! The storage interface used by the engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use super::error::PersistenceError;
use crate::{
    config::ConfigOverride,
    models::{
        BatchStatus, BatchSummary, DeliveryRecord, DeliveryUpdate, NewBatch, NewDelivery,
        NotificationBatch, NotificationRequest, NotificationStatus, StoredNotification,
        ThrottleEvent, ThrottleMetric,
    },
};

/// Persisted throttle counters, batch state, delivery records and the
/// throttle audit log.
///
/// Every method that mutates more than one row does so atomically.
/// Conditional transitions report whether they applied instead of failing,
/// so that concurrent callers can tell a lost race from an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsStore: Send + Sync {
    // Notifications

    /// Persists a new request with status `received` and returns its id.
    async fn insert_notification(
        &self,
        request: &NotificationRequest,
    ) -> Result<i64, PersistenceError>;

    /// Retrieves a persisted notification.
    async fn get_notification(
        &self,
        id: i64,
    ) -> Result<Option<StoredNotification>, PersistenceError>;

    /// Records a throttle outcome on a notification.
    async fn mark_notification_throttled(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;

    /// Updates the admission status of a notification.
    async fn set_notification_status(
        &self,
        id: i64,
        status: NotificationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;

    // Throttling

    /// Retrieves the rate state for a (recipient, channel) pair.
    async fn get_throttle_metric(
        &self,
        recipient_id: &str,
        channel: &str,
    ) -> Result<Option<ThrottleMetric>, PersistenceError>;

    /// Upserts the rate state and appends the audit event in one transaction.
    async fn record_throttle_decision(
        &self,
        metric: &ThrottleMetric,
        event: &ThrottleEvent,
    ) -> Result<(), PersistenceError>;

    /// Lists the most recent audit events for a pair, newest first.
    async fn list_throttle_events(
        &self,
        recipient_id: &str,
        channel: &str,
        limit: u32,
    ) -> Result<Vec<ThrottleEvent>, PersistenceError>;

    // Batches

    /// Returns the open batch for a grouping key, creating it if none exists.
    /// Never creates a second open batch for the same key.
    async fn open_batch(&self, batch: &NewBatch) -> Result<NotificationBatch, PersistenceError>;

    /// Adds a notification to an open batch, raising the batch priority to
    /// `priority_score` if higher, and marks the notification `queued`.
    /// Fails with `Conflict` if the batch is no longer open.
    async fn append_to_batch(
        &self,
        batch_id: i64,
        notification_id: i64,
        priority_score: u8,
        now: DateTime<Utc>,
    ) -> Result<NotificationBatch, PersistenceError>;

    /// Retrieves a batch.
    async fn get_batch(&self, id: i64) -> Result<Option<NotificationBatch>, PersistenceError>;

    /// Lists the members of a batch in insertion order.
    async fn get_batch_members(
        &self,
        batch_id: i64,
    ) -> Result<Vec<StoredNotification>, PersistenceError>;

    /// Lists open batches scheduled at or before `now`.
    async fn list_due_batches(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationBatch>, PersistenceError>;

    /// Lists batches with the given status.
    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<NotificationBatch>, PersistenceError>;

    /// Marks an open batch flushed, stores its summary, creates its delivery
    /// records and marks its members `dispatched`, all in one transaction.
    /// Returns `None` without changes if the batch is not open or no longer
    /// has `summary.member_count` members.
    async fn finalize_batch(
        &self,
        batch_id: i64,
        summary: &BatchSummary,
        deliveries: &[NewDelivery],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<i64>>, PersistenceError>;

    /// Cancels an open batch and its members. Returns whether it applied.
    async fn cancel_batch(&self, batch_id: i64, now: DateTime<Utc>)
    -> Result<bool, PersistenceError>;

    // Deliveries

    /// Creates a `pending` delivery record due immediately and returns its id.
    async fn create_delivery(&self, delivery: &NewDelivery) -> Result<i64, PersistenceError>;

    /// Retrieves a delivery record.
    async fn get_delivery(&self, id: i64) -> Result<Option<DeliveryRecord>, PersistenceError>;

    /// Moves a `pending`/`retrying` record to `sending`. Returns whether it
    /// applied.
    async fn claim_delivery(&self, id: i64, now: DateTime<Utc>) -> Result<bool, PersistenceError>;

    /// Writes the outcome of an attempt to a `sending` record. Returns whether
    /// it applied.
    async fn complete_delivery(
        &self,
        id: i64,
        update: &DeliveryUpdate,
    ) -> Result<bool, PersistenceError>;

    /// Moves a `pending`/`retrying` record to `cancelled`. Returns whether it
    /// applied.
    async fn cancel_delivery(&self, id: i64, now: DateTime<Utc>)
    -> Result<bool, PersistenceError>;

    /// Moves every record whose `expires_at` is at or before `now` to
    /// `expired` and returns their ids. Applies to `pending`/`retrying`
    /// records and to `sending` records whose claim was last touched at or
    /// before `stale_claim_before`.
    async fn expire_deliveries(
        &self,
        now: DateTime<Utc>,
        stale_claim_before: DateTime<Utc>,
    ) -> Result<Vec<i64>, PersistenceError>;

    /// Lists `pending`/`retrying` records whose next attempt is due.
    async fn list_due_deliveries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, PersistenceError>;

    // Configuration

    /// Lists the stored configuration overrides.
    async fn get_config_overrides(&self) -> Result<Vec<ConfigOverride>, PersistenceError>;

    /// Inserts or replaces a configuration override.
    async fn set_config_override(
        &self,
        config_override: &ConfigOverride,
    ) -> Result<(), PersistenceError>;
}
