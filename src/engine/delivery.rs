//! The delivery state machine.
//!
//! ```text
//! pending -> sending -> delivered | bounced
//!                    -> retrying -> sending ...   (while retry_count < max_retries)
//!                    -> failed                    (retries exhausted)
//! pending | retrying -> cancelled | expired
//! sending (claim abandoned) -> expired
//! ```
//!
//! Retries are cooperative: a failed attempt only records `next_attempt_at`
//! and the periodic sweep picks the record up again once it is due. A record
//! left in `sending` by a crash or a failed store write expires once it is
//! past `expires_at` and its claim is older than [`STALE_CLAIM_MINUTES`].

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, TimeDelta, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use serde_json::Value;

use crate::{
    channels::{ChannelRegistry, ChannelSendError},
    clock::Clock,
    config::DeliveryConfig,
    models::{
        Deliverable, DeliveryOutcome, DeliveryStatus, DeliverySubject, DeliveryUpdate,
        NewDelivery, SendResult,
    },
    persistence::{error::PersistenceError, traits::MetricsStore},
};

/// Maximum number of due deliveries attempted concurrently by one sweep.
const SWEEP_CONCURRENCY: usize = 8;

/// Age after which a `sending` claim counts as abandoned.
pub const STALE_CLAIM_MINUTES: i64 = 15;

fn stale_claim_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now - TimeDelta::minutes(STALE_CLAIM_MINUTES)
}

/// What a delivery sweep did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliverySweepReport {
    /// Records moved to `expired`.
    pub expired: Vec<i64>,
    /// Records attempted and the outcome of each attempt.
    pub attempted: Vec<(i64, DeliveryOutcome)>,
    /// Records whose attempt failed with an internal error.
    pub errors: usize,
}

/// The delivery record created for a notification or batch and the outcome
/// of its first attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryAttempt {
    /// The delivery record.
    pub delivery_id: i64,
    /// `None` when the attempt could not be made; the record stays due and
    /// the next sweep picks it up.
    pub outcome: Option<DeliveryOutcome>,
}

/// Result of a single send made outside the state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectSend {
    /// The sender's result. A sender error is folded into a failed result.
    pub result: SendResult,
    /// Wall-clock send latency.
    pub delivery_time_ms: i64,
}

/// Drives delivery records through send attempts.
pub struct DeliveryOrchestrator {
    store: Arc<dyn MetricsStore>,
    channels: Arc<ChannelRegistry>,
    clock: Arc<dyn Clock>,
}

impl DeliveryOrchestrator {
    /// Creates a new DeliveryOrchestrator.
    pub fn new(
        store: Arc<dyn MetricsStore>,
        channels: Arc<ChannelRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, channels, clock }
    }

    /// Builds the parameters of a new record for `deliverable`.
    pub fn new_delivery(
        subject_ref: DeliverySubject,
        deliverable: Deliverable,
        config: &DeliveryConfig,
        now: DateTime<Utc>,
    ) -> NewDelivery {
        let expires_at = now.checked_add_signed(config.expiry()).unwrap_or(DateTime::<Utc>::MAX_UTC);
        NewDelivery { subject_ref, deliverable, created_at: now, expires_at }
    }

    /// Creates a `pending` record that is due immediately.
    pub async fn enqueue(
        &self,
        subject_ref: DeliverySubject,
        deliverable: Deliverable,
        config: &DeliveryConfig,
        now: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let id = self
            .store
            .create_delivery(&Self::new_delivery(subject_ref, deliverable, config, now))
            .await?;
        tracing::debug!(delivery_id = id, subject = ?subject_ref, "Delivery record created.");
        Ok(id)
    }

    /// Makes one attempt at delivering record `id`.
    ///
    /// The claim that moves the record to `sending` is the last check before
    /// the send: a record cancelled or expired before it is never sent, and a
    /// record claimed by a concurrent sweep is skipped.
    #[tracing::instrument(skip(self, config), level = "debug")]
    pub async fn attempt(
        &self,
        id: i64,
        config: &DeliveryConfig,
    ) -> Result<DeliveryOutcome, PersistenceError> {
        let now = self.clock.now();
        let record = self
            .store
            .get_delivery(id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("delivery {}", id)))?;

        if !record.status.is_sendable() {
            return Ok(DeliveryOutcome::Skipped { status: record.status });
        }

        if record.expires_at <= now {
            let expired = self.store.expire_deliveries(now, stale_claim_before(now)).await?;
            if expired.contains(&id) {
                tracing::warn!(delivery_id = id, "Delivery expired before it could be sent.");
                return Ok(DeliveryOutcome::Expired);
            }
            return self.skipped(id).await;
        }

        if !self.store.claim_delivery(id, now).await? {
            return self.skipped(id).await;
        }

        let started = Instant::now();
        let sent = self.send(&record.deliverable).await;
        let delivery_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let finished = self.clock.now();

        let (update, outcome) = match sent {
            Ok(result) if result.success => (
                DeliveryUpdate {
                    status: DeliveryStatus::Delivered,
                    retry_count: record.retry_count,
                    next_attempt_at: None,
                    sent_at: Some(finished),
                    delivery_time_ms: Some(delivery_time_ms),
                    response_data: Some(Value::Object(result.response_data)),
                    error_message: None,
                    updated_at: finished,
                },
                DeliveryOutcome::Delivered { delivery_time_ms },
            ),
            Ok(result) if result.bounced => {
                let error_message =
                    result.error_message.unwrap_or_else(|| "recipient rejected".to_string());
                (
                    DeliveryUpdate {
                        status: DeliveryStatus::Bounced,
                        retry_count: record.retry_count,
                        next_attempt_at: None,
                        sent_at: None,
                        delivery_time_ms: None,
                        response_data: Some(Value::Object(result.response_data)),
                        error_message: Some(error_message.clone()),
                        updated_at: finished,
                    },
                    DeliveryOutcome::Bounced { error_message },
                )
            }
            Ok(result) => {
                let error_message =
                    result.error_message.unwrap_or_else(|| "send failed".to_string());
                Self::failure(record.retry_count, error_message, config, finished)
            }
            Err(e) => Self::failure(record.retry_count, e.to_string(), config, finished),
        };

        if !self.store.complete_delivery(id, &update).await? {
            tracing::warn!(delivery_id = id, "Delivery left the sending state during the attempt.");
        }

        match &outcome {
            DeliveryOutcome::Delivered { delivery_time_ms } => {
                tracing::info!(delivery_id = id, delivery_time_ms, "Delivery succeeded.");
            }
            DeliveryOutcome::RetryScheduled { retry_count, next_attempt_at } => {
                tracing::warn!(delivery_id = id, retry_count, %next_attempt_at, "Delivery failed, retry scheduled.");
            }
            DeliveryOutcome::Failed { error_message } => {
                tracing::error!(delivery_id = id, %error_message, "Delivery failed, retries exhausted.");
            }
            DeliveryOutcome::Bounced { error_message } => {
                tracing::warn!(delivery_id = id, %error_message, "Delivery bounced.");
            }
            _ => {}
        }
        Ok(outcome)
    }

    /// Builds the update for a failed attempt: a scheduled retry while
    /// retries remain, otherwise terminal failure.
    fn failure(
        retry_count: u32,
        error_message: String,
        config: &DeliveryConfig,
        now: DateTime<Utc>,
    ) -> (DeliveryUpdate, DeliveryOutcome) {
        if retry_count >= config.max_retries {
            return (
                DeliveryUpdate {
                    status: DeliveryStatus::Failed,
                    retry_count,
                    next_attempt_at: None,
                    sent_at: None,
                    delivery_time_ms: None,
                    response_data: None,
                    error_message: Some(error_message.clone()),
                    updated_at: now,
                },
                DeliveryOutcome::Failed { error_message },
            );
        }

        let delay = TimeDelta::from_std(config.backoff_delay(retry_count)).unwrap_or(TimeDelta::MAX);
        let next_attempt_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let retry_count = retry_count + 1;
        (
            DeliveryUpdate {
                status: DeliveryStatus::Retrying,
                retry_count,
                next_attempt_at: Some(next_attempt_at),
                sent_at: None,
                delivery_time_ms: None,
                response_data: None,
                error_message: Some(error_message),
                updated_at: now,
            },
            DeliveryOutcome::RetryScheduled { retry_count, next_attempt_at },
        )
    }

    /// Attempts record `id`, logging instead of returning internal errors.
    pub async fn deliver(&self, id: i64, config: &DeliveryConfig) -> DeliveryAttempt {
        match self.attempt(id, config).await {
            Ok(outcome) => DeliveryAttempt { delivery_id: id, outcome: Some(outcome) },
            Err(e) => {
                tracing::error!(delivery_id = id, error = %e, "Delivery attempt failed, leaving it to the sweep.");
                DeliveryAttempt { delivery_id: id, outcome: None }
            }
        }
    }

    async fn skipped(&self, id: i64) -> Result<DeliveryOutcome, PersistenceError> {
        let status = self
            .store
            .get_delivery(id)
            .await?
            .map(|r| r.status)
            .ok_or_else(|| PersistenceError::NotFound(format!("delivery {}", id)))?;
        Ok(DeliveryOutcome::Skipped { status })
    }

    async fn send(&self, deliverable: &Deliverable) -> Result<SendResult, ChannelSendError> {
        match self.channels.get(&deliverable.channel) {
            Some(sender) => sender.send(deliverable).await,
            None => Err(ChannelSendError::Transport(format!(
                "no sender registered for channel '{}'",
                deliverable.channel
            ))),
        }
    }

    /// Sends `deliverable` once, bypassing delivery records entirely.
    pub async fn send_direct(&self, deliverable: &Deliverable) -> DirectSend {
        let started = Instant::now();
        let result = match self.send(deliverable).await {
            Ok(result) => result,
            Err(e) => SendResult::failure(e.to_string()),
        };
        let delivery_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        DirectSend { result, delivery_time_ms }
    }

    /// Expires overdue records, then attempts every due record. One record's
    /// error is logged and does not stop the sweep.
    #[tracing::instrument(skip(self, config), level = "debug")]
    pub async fn process_due(&self, config: &DeliveryConfig) -> DeliverySweepReport {
        let now = self.clock.now();
        let mut report = DeliverySweepReport::default();

        match self.store.expire_deliveries(now, stale_claim_before(now)).await {
            Ok(expired) => report.expired = expired,
            Err(e) => {
                tracing::error!(error = %e, "Failed to expire overdue deliveries.");
                report.errors += 1;
            }
        }

        let due = match self.store.list_due_deliveries(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list due deliveries.");
                report.errors += 1;
                return report;
            }
        };

        let results: Vec<(i64, Result<DeliveryOutcome, PersistenceError>)> =
            stream::iter(due.into_iter().map(|record| async move {
                (record.id, self.attempt(record.id, config).await)
            }))
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok(outcome) => report.attempted.push((id, outcome)),
                Err(e) => {
                    tracing::error!(delivery_id = id, error = %e, "Delivery attempt failed.");
                    report.errors += 1;
                }
            }
        }
        report.attempted.sort_by_key(|(id, _)| *id);
        report
    }

    /// Cancels a `pending` or `retrying` record. Returns whether it applied.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn cancel(&self, id: i64) -> Result<bool, PersistenceError> {
        let cancelled = self.store.cancel_delivery(id, self.clock.now()).await?;
        if cancelled {
            tracing::info!(delivery_id = id, "Delivery cancelled.");
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        channels::MockChannelSender,
        persistence::SqliteMetricsStore,
        test_helpers::{MockClock, RecordingSender, create_test_store},
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn deliverable(channel: &str) -> Deliverable {
        Deliverable {
            subject: "Permit approved".to_string(),
            body: "Permit 42 was approved".to_string(),
            recipient_id: "u1".to_string(),
            channel: channel.to_string(),
        }
    }

    #[test]
    fn test_out_of_range_durations_saturate() {
        let config = DeliveryConfig {
            expiry_hours: u32::MAX,
            max_delay_seconds: u64::MAX,
            ..Default::default()
        };

        let new = DeliveryOrchestrator::new_delivery(
            DeliverySubject::Notification(1),
            deliverable("email"),
            &config,
            t0(),
        );
        assert_eq!(new.expires_at, DateTime::<Utc>::MAX_UTC);

        let (update, outcome) =
            DeliveryOrchestrator::failure(0, "timeout".to_string(), &config, t0());
        assert_eq!(update.next_attempt_at, Some(t0() + TimeDelta::seconds(5)));
        assert!(matches!(outcome, DeliveryOutcome::RetryScheduled { retry_count: 1, .. }));

        let config = DeliveryConfig { max_retries: u32::MAX, ..config };
        let (update, _) = DeliveryOrchestrator::failure(200, "timeout".to_string(), &config, t0());
        let next = update.next_attempt_at.unwrap();
        assert!(next > t0());
    }

    async fn setup(
        sender: Arc<RecordingSender>,
    ) -> (DeliveryOrchestrator, Arc<SqliteMetricsStore>, MockClock) {
        let store = create_test_store().await;
        let clock = MockClock::new(t0());
        let mut channels = ChannelRegistry::new();
        channels.register("email", sender);
        let orchestrator = DeliveryOrchestrator::new(
            store.clone(),
            Arc::new(channels),
            Arc::new(clock.clone()),
        );
        (orchestrator, store, clock)
    }

    #[tokio::test]
    async fn test_successful_attempt_records_delivery() {
        let sender = Arc::new(RecordingSender::new());
        let (orchestrator, store, _clock) = setup(sender.clone()).await;
        let config = DeliveryConfig::default();

        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();
        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));

        let record = store.get_delivery(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert_eq!(record.sent_at, Some(t0()));
        assert!(record.delivery_time_ms.is_some());
        assert_eq!(sender.sent().len(), 1);

        // Delivered is terminal
        let again = orchestrator.attempt(id, &config).await.unwrap();
        assert_eq!(again, DeliveryOutcome::Skipped { status: DeliveryStatus::Delivered });
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_backoff_schedule_then_terminal_failure() {
        let sender = Arc::new(RecordingSender::failing(4));
        let (orchestrator, store, clock) = setup(sender.clone()).await;
        let config = DeliveryConfig::default();

        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();

        let mut expected_at = t0();
        for (retry_count, delay) in [(1, 5), (2, 10), (3, 20)] {
            clock.set(expected_at);
            let outcome = orchestrator.attempt(id, &config).await.unwrap();
            expected_at += TimeDelta::seconds(delay);
            assert_eq!(
                outcome,
                DeliveryOutcome::RetryScheduled { retry_count, next_attempt_at: expected_at }
            );
        }

        clock.set(expected_at);
        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));

        let record = store.get_delivery(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.retry_count, 3);
        assert_eq!(record.next_attempt_at, None);
        assert_eq!(sender.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_bounce_is_terminal() {
        let mut mock = MockChannelSender::new();
        mock.expect_send().times(1).returning(|_| Ok(SendResult::bounced("no such mailbox")));
        let store = create_test_store().await;
        let mut channels = ChannelRegistry::new();
        channels.register("email", Arc::new(mock));
        let orchestrator =
            DeliveryOrchestrator::new(store.clone(), Arc::new(channels), Arc::new(MockClock::new(t0())));
        let config = DeliveryConfig::default();

        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();
        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Bounced { error_message: "no such mailbox".into() });
        assert_eq!(store.get_delivery(id).await.unwrap().unwrap().status, DeliveryStatus::Bounced);
    }

    #[tokio::test]
    async fn test_sender_error_counts_as_failure() {
        let mut mock = MockChannelSender::new();
        mock.expect_send()
            .returning(|_| Err(ChannelSendError::Transport("connection reset".into())));
        let store = create_test_store().await;
        let mut channels = ChannelRegistry::new();
        channels.register("email", Arc::new(mock));
        let orchestrator =
            DeliveryOrchestrator::new(store.clone(), Arc::new(channels), Arc::new(MockClock::new(t0())));
        let config = DeliveryConfig::default();

        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();
        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::RetryScheduled { retry_count: 1, .. }));

        let record = store.get_delivery(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Retrying);
        assert_eq!(record.error_message.as_deref(), Some("Transport error: connection reset"));
    }

    #[tokio::test]
    async fn test_unknown_channel_is_retried() {
        let (orchestrator, store, _clock) = setup(Arc::new(RecordingSender::new())).await;
        let config = DeliveryConfig::default();
        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("pager"), &config, t0())
            .await
            .unwrap();

        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::RetryScheduled { .. }));
        let record = store.get_delivery(id).await.unwrap().unwrap();
        assert!(record.error_message.unwrap().contains("pager"));
    }

    #[tokio::test]
    async fn test_cancelled_retry_never_sends() {
        let sender = Arc::new(RecordingSender::failing(1));
        let (orchestrator, _store, clock) = setup(sender.clone()).await;
        let config = DeliveryConfig::default();

        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();
        orchestrator.attempt(id, &config).await.unwrap();
        assert!(orchestrator.cancel(id).await.unwrap());
        assert!(!orchestrator.cancel(id).await.unwrap());

        clock.advance(TimeDelta::minutes(1));
        let report = orchestrator.process_due(&config).await;
        assert!(report.attempted.is_empty());
        let outcome = orchestrator.attempt(id, &config).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Skipped { status: DeliveryStatus::Cancelled });
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_process_due_expires_then_retries() {
        let sender = Arc::new(RecordingSender::failing(1));
        let (orchestrator, store, clock) = setup(sender.clone()).await;
        let config = DeliveryConfig::default();

        let retried = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();
        orchestrator.attempt(retried, &config).await.unwrap();

        let stale_created = t0() - TimeDelta::hours(25);
        let stale = orchestrator
            .enqueue(DeliverySubject::Notification(2), deliverable("email"), &config, stale_created)
            .await
            .unwrap();

        // Not yet due
        let report = orchestrator.process_due(&config).await;
        assert_eq!(report.expired, vec![stale]);
        assert!(report.attempted.is_empty());
        assert_eq!(store.get_delivery(stale).await.unwrap().unwrap().status, DeliveryStatus::Expired);

        clock.advance(TimeDelta::seconds(5));
        let report = orchestrator.process_due(&config).await;
        assert_eq!(report.attempted.len(), 1);
        assert!(matches!(report.attempted[0], (id, DeliveryOutcome::Delivered { .. }) if id == retried));
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_attempt_on_expired_record() {
        let sender = Arc::new(RecordingSender::new());
        let (orchestrator, _store, clock) = setup(sender.clone()).await;
        let config = DeliveryConfig::default();
        let id = orchestrator
            .enqueue(DeliverySubject::Notification(1), deliverable("email"), &config, t0())
            .await
            .unwrap();

        clock.advance(TimeDelta::hours(24));
        assert_eq!(orchestrator.attempt(id, &config).await.unwrap(), DeliveryOutcome::Expired);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_direct_reports_failure() {
        let (orchestrator, _store, _clock) = setup(Arc::new(RecordingSender::new())).await;
        let direct = orchestrator.send_direct(&deliverable("sms")).await;
        assert!(!direct.result.success);

        let direct = orchestrator.send_direct(&deliverable("email")).await;
        assert!(direct.result.success);
    }

    #[tokio::test]
    async fn test_attempt_missing_record() {
        let (orchestrator, _store, _clock) = setup(Arc::new(RecordingSender::new())).await;
        let result = orchestrator.attempt(99, &DeliveryConfig::default()).await;
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }
}
