//! Implementation of the MetricsStore trait for SqliteMetricsStore

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    map_sqlx_error,
    rows::{BatchRow, DeliveryRow, NotificationRow, ThrottleEventRow, ThrottleMetricRow},
    to_millis,
};
use crate::{
    config::ConfigOverride,
    models::{
        BatchStatus, BatchSummary, DeliveryRecord, DeliveryStatus, DeliveryUpdate, NewBatch,
        NewDelivery, NotificationBatch, NotificationRequest, NotificationStatus,
        StoredNotification, ThrottleEvent, ThrottleMetric,
    },
    persistence::{error::PersistenceError, sqlite::SqliteMetricsStore, traits::MetricsStore},
};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, channel, severity, priority_score, subject, \
                                    body, batch_id, status, throttle_reason, created_at";

const BATCH_COLUMNS: &str = "id, user_id, channel, severity, status, priority_score, batch_size, \
                             created_at, scheduled_for, sent_at, consolidated_subject, \
                             consolidated_message";

const DELIVERY_COLUMNS: &str = "id, subject_kind, subject_id, recipient_id, channel, subject, \
                                body, status, retry_count, next_attempt_at, expires_at, sent_at, \
                                delivery_time_ms, response_data, error_message, created_at, \
                                updated_at";

/// Records past `expires_at` that are waiting, or whose `sending` claim was
/// abandoned. Binds `now` then the stale-claim cutoff.
const EXPIRABLE_PREDICATE: &str = "expires_at <= ? AND (status IN ('pending', 'retrying') OR \
                                   (status = 'sending' AND updated_at <= ?))";

const INSERT_DELIVERY: &str = "INSERT INTO delivery_records (subject_kind, subject_id, \
                               recipient_id, channel, subject, body, status, retry_count, \
                               next_attempt_at, expires_at, created_at, updated_at) VALUES (?, ?, \
                               ?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?)";

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, PersistenceError>
where
    T: TryFrom<R, Error = PersistenceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn bind_new_delivery<'q>(
    delivery: &'q NewDelivery,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let created_at = to_millis(delivery.created_at);
    sqlx::query(INSERT_DELIVERY)
        .bind(delivery.subject_ref.kind())
        .bind(delivery.subject_ref.id())
        .bind(&delivery.deliverable.recipient_id)
        .bind(&delivery.deliverable.channel)
        .bind(&delivery.deliverable.subject)
        .bind(&delivery.deliverable.body)
        .bind(created_at)
        .bind(to_millis(delivery.expires_at))
        .bind(created_at)
        .bind(created_at)
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    #[tracing::instrument(skip(self, request), level = "debug")]
    async fn insert_notification(
        &self,
        request: &NotificationRequest,
    ) -> Result<i64, PersistenceError> {
        let created_at = to_millis(request.created_at);
        let result = self
            .execute_query_with_error_handling(
                "insert notification",
                sqlx::query(
                    "INSERT INTO notifications (recipient_id, channel, severity, priority_score, \
                     subject, body, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, \
                     'received', ?, ?)",
                )
                .bind(&request.recipient_id)
                .bind(&request.channel)
                .bind(request.severity.as_str())
                .bind(i64::from(request.priority_score))
                .bind(&request.subject)
                .bind(&request.body)
                .bind(created_at)
                .bind(created_at)
                .execute(&self.pool),
            )
            .await?;
        let id = result.last_insert_rowid();
        tracing::debug!(notification_id = id, "Notification persisted.");
        Ok(id)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_notification(
        &self,
        id: i64,
    ) -> Result<Option<StoredNotification>, PersistenceError> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS);
        let row = self
            .execute_query_with_error_handling(
                "get notification",
                sqlx::query_as::<_, NotificationRow>(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        row.map(StoredNotification::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn mark_notification_throttled(
        &self,
        id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "mark notification throttled",
            sqlx::query(
                "UPDATE notifications SET status = 'throttled', throttled = 1, throttle_reason = \
                 ?, updated_at = ? WHERE id = ?",
            )
            .bind(reason)
            .bind(to_millis(now))
            .bind(id)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn set_notification_status(
        &self,
        id: i64,
        status: NotificationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "set notification status",
            sqlx::query("UPDATE notifications SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(to_millis(now))
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_throttle_metric(
        &self,
        recipient_id: &str,
        channel: &str,
    ) -> Result<Option<ThrottleMetric>, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "get throttle metric",
                sqlx::query_as::<_, ThrottleMetricRow>(
                    "SELECT user_id, channel, hourly_count, hour_window_start, daily_count, \
                     day_window_start, last_notification_time, burst_count, burst_start_time \
                     FROM throttle_metrics WHERE user_id = ? AND channel = ?",
                )
                .bind(recipient_id)
                .bind(channel)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(ThrottleMetric::try_from).transpose()
    }

    #[tracing::instrument(skip(self, metric, event), level = "debug", fields(recipient_id = %metric.recipient_id, channel = %metric.channel))]
    async fn record_throttle_decision(
        &self,
        metric: &ThrottleMetric,
        event: &ThrottleEvent,
    ) -> Result<(), PersistenceError> {
        let notification_data = serde_json::to_string(&event.notification_data)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO throttle_metrics (user_id, channel, hourly_count, hour_window_start, \
             daily_count, day_window_start, last_notification_time, burst_count, \
             burst_start_time) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT (user_id, channel) \
             DO UPDATE SET hourly_count = excluded.hourly_count, hour_window_start = \
             excluded.hour_window_start, daily_count = excluded.daily_count, day_window_start = \
             excluded.day_window_start, last_notification_time = excluded.last_notification_time, \
             burst_count = excluded.burst_count, burst_start_time = excluded.burst_start_time",
        )
        .bind(&metric.recipient_id)
        .bind(&metric.channel)
        .bind(i64::from(metric.hourly_count))
        .bind(to_millis(metric.hour_window_start))
        .bind(i64::from(metric.daily_count))
        .bind(to_millis(metric.day_window_start))
        .bind(metric.last_notification_time.map(to_millis))
        .bind(i64::from(metric.burst_count))
        .bind(to_millis(metric.burst_window_start))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO throttle_events (user_id, channel, event_type, reason, \
             notification_data, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.recipient_id)
        .bind(&event.channel)
        .bind(event.event_type.as_str())
        .bind(&event.reason)
        .bind(notification_data)
        .bind(to_millis(event.created_at))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_throttle_events(
        &self,
        recipient_id: &str,
        channel: &str,
        limit: u32,
    ) -> Result<Vec<ThrottleEvent>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "list throttle events",
                sqlx::query_as::<_, ThrottleEventRow>(
                    "SELECT user_id, channel, event_type, reason, notification_data, created_at \
                     FROM throttle_events WHERE user_id = ? AND channel = ? ORDER BY id DESC \
                     LIMIT ?",
                )
                .bind(recipient_id)
                .bind(channel)
                .bind(i64::from(limit))
                .fetch_all(&self.pool),
            )
            .await?;
        convert_all(rows)
    }

    #[tracing::instrument(skip(self, batch), level = "debug", fields(group_key = %batch.key))]
    async fn open_batch(&self, batch: &NewBatch) -> Result<NotificationBatch, PersistenceError> {
        let group_key = batch.key.to_string();

        // The partial unique index turns a second open batch for the key into
        // an ignored insert.
        self.execute_query_with_error_handling(
            "open batch",
            sqlx::query(
                "INSERT OR IGNORE INTO notification_batches (group_key, user_id, channel, \
                 severity, status, priority_score, batch_size, created_at, scheduled_for) VALUES \
                 (?, ?, ?, ?, 'open', 0, 0, ?, ?)",
            )
            .bind(&group_key)
            .bind(batch.key.recipient_id.as_deref())
            .bind(batch.key.channel.as_deref())
            .bind(batch.key.severity.map(|s| s.as_str()))
            .bind(to_millis(batch.created_at))
            .bind(to_millis(batch.scheduled_for))
            .execute(&self.pool),
        )
        .await?;

        let sql = format!(
            "SELECT {} FROM notification_batches WHERE group_key = ? AND status = 'open'",
            BATCH_COLUMNS
        );
        let row = self
            .execute_query_with_error_handling(
                "load open batch",
                sqlx::query_as::<_, BatchRow>(&sql).bind(&group_key).fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => NotificationBatch::try_from(row),
            // Flushed or cancelled between the insert and the read
            None => Err(PersistenceError::Conflict(format!(
                "open batch for group '{}' closed concurrently",
                group_key
            ))),
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn append_to_batch(
        &self,
        batch_id: i64,
        notification_id: i64,
        priority_score: u8,
        now: DateTime<Utc>,
    ) -> Result<NotificationBatch, PersistenceError> {
        let now_ms = to_millis(now);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let applied = sqlx::query(
            "UPDATE notification_batches SET batch_size = batch_size + 1, priority_score = \
             MAX(priority_score, ?) WHERE id = ? AND status = 'open'",
        )
        .bind(i64::from(priority_score))
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if applied == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(PersistenceError::Conflict(format!("batch {} is not open", batch_id)));
        }

        sqlx::query("INSERT INTO batch_notifications (batch_id, notification_id) VALUES (?, ?)")
            .bind(batch_id)
            .bind(notification_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE notifications SET batch_id = ?, is_batch = 1, status = 'queued', updated_at = ? \
             WHERE id = ?",
        )
        .bind(batch_id)
        .bind(now_ms)
        .bind(notification_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let sql = format!("SELECT {} FROM notification_batches WHERE id = ?", BATCH_COLUMNS);
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        NotificationBatch::try_from(row)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_batch(&self, id: i64) -> Result<Option<NotificationBatch>, PersistenceError> {
        let sql = format!("SELECT {} FROM notification_batches WHERE id = ?", BATCH_COLUMNS);
        let row = self
            .execute_query_with_error_handling(
                "get batch",
                sqlx::query_as::<_, BatchRow>(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        row.map(NotificationBatch::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_batch_members(
        &self,
        batch_id: i64,
    ) -> Result<Vec<StoredNotification>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE id IN (SELECT notification_id FROM \
             batch_notifications WHERE batch_id = ?) ORDER BY id",
            NOTIFICATION_COLUMNS
        );
        let rows = self
            .execute_query_with_error_handling(
                "get batch members",
                sqlx::query_as::<_, NotificationRow>(&sql).bind(batch_id).fetch_all(&self.pool),
            )
            .await?;
        convert_all(rows)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_due_batches(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationBatch>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM notification_batches WHERE status = 'open' AND scheduled_for <= ? \
             ORDER BY scheduled_for, id",
            BATCH_COLUMNS
        );
        let rows = self
            .execute_query_with_error_handling(
                "list due batches",
                sqlx::query_as::<_, BatchRow>(&sql).bind(to_millis(now)).fetch_all(&self.pool),
            )
            .await?;
        convert_all(rows)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<NotificationBatch>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM notification_batches WHERE status = ? ORDER BY id",
            BATCH_COLUMNS
        );
        let rows = self
            .execute_query_with_error_handling(
                "list batches by status",
                sqlx::query_as::<_, BatchRow>(&sql).bind(status.as_str()).fetch_all(&self.pool),
            )
            .await?;
        convert_all(rows)
    }

    #[tracing::instrument(skip(self, summary, deliveries), level = "debug")]
    async fn finalize_batch(
        &self,
        batch_id: i64,
        summary: &BatchSummary,
        deliveries: &[NewDelivery],
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<i64>>, PersistenceError> {
        let now_ms = to_millis(now);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let applied = sqlx::query(
            "UPDATE notification_batches SET status = 'flushed', sent_at = ?, \
             consolidated_subject = ?, consolidated_message = ? WHERE id = ? AND status = 'open' \
             AND batch_size = ?",
        )
        .bind(now_ms)
        .bind(&summary.subject)
        .bind(&summary.message)
        .bind(batch_id)
        .bind(i64::from(summary.member_count))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if applied == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            tracing::debug!(batch_id, "Batch not finalized, no longer open or membership changed.");
            return Ok(None);
        }

        let mut ids = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let result =
                bind_new_delivery(delivery).execute(&mut *tx).await.map_err(map_sqlx_error)?;
            ids.push(result.last_insert_rowid());
        }

        sqlx::query(
            "UPDATE notifications SET status = 'dispatched', batch_size = ?, updated_at = ? WHERE \
             batch_id = ?",
        )
        .bind(i64::from(summary.member_count))
        .bind(now_ms)
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        tracing::debug!(batch_id, deliveries = ids.len(), "Batch finalized.");
        Ok(Some(ids))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn cancel_batch(
        &self,
        batch_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let applied = sqlx::query(
            "UPDATE notification_batches SET status = 'cancelled' WHERE id = ? AND status = 'open'",
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if applied == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE notifications SET status = 'cancelled', updated_at = ? WHERE batch_id = ?",
        )
        .bind(to_millis(now))
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, delivery), level = "debug")]
    async fn create_delivery(&self, delivery: &NewDelivery) -> Result<i64, PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "create delivery",
                bind_new_delivery(delivery).execute(&self.pool),
            )
            .await?;
        Ok(result.last_insert_rowid())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_delivery(&self, id: i64) -> Result<Option<DeliveryRecord>, PersistenceError> {
        let sql = format!("SELECT {} FROM delivery_records WHERE id = ?", DELIVERY_COLUMNS);
        let row = self
            .execute_query_with_error_handling(
                "get delivery",
                sqlx::query_as::<_, DeliveryRow>(&sql).bind(id).fetch_optional(&self.pool),
            )
            .await?;
        row.map(DeliveryRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn claim_delivery(&self, id: i64, now: DateTime<Utc>) -> Result<bool, PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "claim delivery",
                sqlx::query(
                    "UPDATE delivery_records SET status = 'sending', updated_at = ? WHERE id = ? \
                     AND status IN ('pending', 'retrying')",
                )
                .bind(to_millis(now))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self, update), level = "debug", fields(status = %update.status))]
    async fn complete_delivery(
        &self,
        id: i64,
        update: &DeliveryUpdate,
    ) -> Result<bool, PersistenceError> {
        if !DeliveryStatus::Sending.can_transition_to(update.status) {
            return Err(PersistenceError::InvalidInput(format!(
                "an attempt cannot complete as '{}'",
                update.status
            )));
        }
        let response_data = update.response_data.as_ref().map(serde_json::to_string).transpose()?;

        let result = self
            .execute_query_with_error_handling(
                "complete delivery",
                sqlx::query(
                    "UPDATE delivery_records SET status = ?, retry_count = ?, next_attempt_at = ?, \
                     sent_at = ?, delivery_time_ms = ?, response_data = ?, error_message = ?, \
                     updated_at = ? WHERE id = ? AND status = 'sending'",
                )
                .bind(update.status.as_str())
                .bind(i64::from(update.retry_count))
                .bind(update.next_attempt_at.map(to_millis))
                .bind(update.sent_at.map(to_millis))
                .bind(update.delivery_time_ms)
                .bind(response_data)
                .bind(update.error_message.as_deref())
                .bind(to_millis(update.updated_at))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn cancel_delivery(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "cancel delivery",
                sqlx::query(
                    "UPDATE delivery_records SET status = 'cancelled', next_attempt_at = NULL, \
                     updated_at = ? WHERE id = ? AND status IN ('pending', 'retrying')",
                )
                .bind(to_millis(now))
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn expire_deliveries(
        &self,
        now: DateTime<Utc>,
        stale_claim_before: DateTime<Utc>,
    ) -> Result<Vec<i64>, PersistenceError> {
        let now_ms = to_millis(now);
        let stale_ms = to_millis(stale_claim_before);
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let ids: Vec<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM delivery_records WHERE {} ORDER BY id",
            EXPIRABLE_PREDICATE
        ))
        .bind(now_ms)
        .bind(stale_ms)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if !ids.is_empty() {
            sqlx::query(&format!(
                "UPDATE delivery_records SET status = 'expired', next_attempt_at = NULL, \
                 updated_at = ? WHERE {}",
                EXPIRABLE_PREDICATE
            ))
            .bind(now_ms)
            .bind(now_ms)
            .bind(stale_ms)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Expired undelivered records.");
        }
        Ok(ids)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn list_due_deliveries(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeliveryRecord>, PersistenceError> {
        let sql = format!(
            "SELECT {} FROM delivery_records WHERE status IN ('pending', 'retrying') AND \
             next_attempt_at <= ? ORDER BY next_attempt_at, id",
            DELIVERY_COLUMNS
        );
        let rows = self
            .execute_query_with_error_handling(
                "list due deliveries",
                sqlx::query_as::<_, DeliveryRow>(&sql).bind(to_millis(now)).fetch_all(&self.pool),
            )
            .await?;
        convert_all(rows)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn get_config_overrides(&self) -> Result<Vec<ConfigOverride>, PersistenceError> {
        let rows: Vec<(String, String, String)> = self
            .execute_query_with_error_handling(
                "get config overrides",
                sqlx::query_as(
                    "SELECT config_type, config_key, config_value FROM notification_config ORDER \
                     BY config_type, config_key",
                )
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(|(config_type, config_key, config_value)| ConfigOverride {
                config_type,
                config_key,
                config_value,
            })
            .collect())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn set_config_override(
        &self,
        config_override: &ConfigOverride,
    ) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "set config override",
            sqlx::query(
                "INSERT OR REPLACE INTO notification_config (config_type, config_key, \
                 config_value) VALUES (?, ?, ?)",
            )
            .bind(&config_override.config_type)
            .bind(&config_override.config_key)
            .bind(&config_override.config_value)
            .execute(&self.pool),
        )
        .await?;
        tracing::info!(
            config_type = %config_override.config_type,
            config_key = %config_override.config_key,
            "Configuration override stored."
        );
        Ok(())
    }
}

