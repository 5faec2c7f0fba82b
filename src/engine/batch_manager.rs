//! Consolidation of allowed notifications into batches.
//!
//! An allowed notification is either sent on its own (batching disabled, or
//! an exempt request with `priority_override`) or appended to the single open
//! batch for its grouping key. A batch is flushed when it reaches
//! `max_batch_size`, when the sweep finds it past `scheduled_for`, or on
//! operator request. Flushing a batch that is no longer open is a no-op.
//!
//! Admission and flushing for one grouping key are serialized by a per-key
//! lock. Sends always happen after the lock is released.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use super::delivery::{DeliveryAttempt, DeliveryOrchestrator};
use crate::{
    config::EngineConfig,
    models::{
        BatchStatus, BatchSummary, Deliverable, DeliverySubject, GroupingKey, NewBatch,
        NewDelivery, NotificationBatch, NotificationRequest, NotificationStatus, Severity,
        StoredNotification,
    },
    persistence::{error::PersistenceError, traits::MetricsStore},
};

/// Attempts made when a conditional batch update loses a race with another
/// process.
const MAX_CONFLICT_RETRIES: usize = 3;

/// What happened to an admitted notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// Delivered on its own, bypassing batching.
    SentImmediately {
        /// The delivery created for the notification.
        delivery: DeliveryAttempt,
    },
    /// Waiting in an open batch.
    Queued {
        /// The batch the notification joined.
        batch_id: i64,
    },
    /// Joined a batch that reached its size limit and was flushed.
    Flushed {
        /// The flushed batch.
        batch_id: i64,
        /// The deliveries created for the batch.
        deliveries: Vec<DeliveryAttempt>,
    },
}

/// Result of a flush request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// The batch was open and has been flushed.
    Flushed {
        /// The deliveries created for the batch.
        deliveries: Vec<DeliveryAttempt>,
    },
    /// The batch was no longer open; nothing changed.
    NotOpen {
        /// Its current status.
        status: BatchStatus,
    },
}

/// Whether an allowed request joins a batch rather than being sent on its
/// own.
pub fn is_batched(request: &NotificationRequest, config: &EngineConfig) -> bool {
    config.batching.enabled
        && !(config.batching.priority_override && request.is_priority_exempt(&config.throttling))
}

/// Builds the consolidated subject and body for a set of notifications.
fn summarize(members: &[&StoredNotification]) -> (String, String) {
    let top = members.iter().map(|m| m.request.severity).max().unwrap_or(Severity::Low);
    let subject = match members.len() {
        1 => format!("[{}] 1 notification", top.as_str().to_uppercase()),
        n => format!("[{}] {} notifications", top.as_str().to_uppercase(), n),
    };
    let body = members
        .iter()
        .map(|m| format!("- [{}] {}: {}", m.request.severity, m.request.subject, m.request.body))
        .collect::<Vec<_>>()
        .join("\n");
    (subject, body)
}

/// Splits a batch into one deliverable per distinct (recipient, channel)
/// among its members, in order of first appearance. With grouping by user
/// and channel enabled there is exactly one.
fn consolidate(members: &[StoredNotification]) -> (BatchSummary, Vec<Deliverable>) {
    let all: Vec<&StoredNotification> = members.iter().collect();
    let (subject, message) = summarize(&all);
    let summary = BatchSummary {
        subject,
        message,
        member_count: u32::try_from(members.len()).unwrap_or(u32::MAX),
    };

    let mut addresses: Vec<(&str, &str)> = Vec::new();
    for m in members {
        let address = (m.request.recipient_id.as_str(), m.request.channel.as_str());
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    let deliverables = addresses
        .into_iter()
        .map(|(recipient_id, channel)| {
            let group: Vec<&StoredNotification> = members
                .iter()
                .filter(|m| m.request.recipient_id == recipient_id && m.request.channel == channel)
                .collect();
            let (subject, body) = summarize(&group);
            Deliverable {
                subject,
                body,
                recipient_id: recipient_id.to_string(),
                channel: channel.to_string(),
            }
        })
        .collect();

    (summary, deliverables)
}

/// Groups allowed notifications into batches and flushes them.
pub struct BatchManager {
    store: Arc<dyn MetricsStore>,
    orchestrator: Arc<DeliveryOrchestrator>,

    /// A map of grouping keys to their locks to prevent racing admissions
    /// and flushes.
    group_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BatchManager {
    /// Creates a new BatchManager.
    pub fn new(store: Arc<dyn MetricsStore>, orchestrator: Arc<DeliveryOrchestrator>) -> Self {
        Self { store, orchestrator, group_locks: DashMap::new() }
    }

    /// Gets or creates the lock for a grouping key.
    fn get_group_lock(&self, group_key: &str) -> Arc<Mutex<()>> {
        self.group_locks
            .entry(group_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Admits an allowed notification.
    #[tracing::instrument(skip(self, notification, config), level = "debug", fields(notification_id = notification.id))]
    pub async fn admit(
        &self,
        notification: &StoredNotification,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, PersistenceError> {
        let request = &notification.request;
        if !is_batched(request, config) {
            return self.send_immediately(notification, config, now).await;
        }

        let key = GroupingKey::for_request(request, &config.batching);
        let lock = self.get_group_lock(&key.to_string());
        let guard = lock.lock().await;

        let batch = self.append(notification, key, config, now).await?;
        tracing::debug!(batch_id = batch.id, member_count = batch.member_count, "Notification queued.");

        if batch.member_count < config.batching.max_batch_size {
            return Ok(AdmissionOutcome::Queued { batch_id: batch.id });
        }

        tracing::info!(batch_id = batch.id, member_count = batch.member_count, "Batch full, flushing.");
        let finalized = self.finalize(batch.id, config, now).await?;
        drop(guard);

        match finalized {
            Ok(delivery_ids) => Ok(AdmissionOutcome::Flushed {
                batch_id: batch.id,
                deliveries: self.deliver_all(delivery_ids, config).await,
            }),
            // Flushed by another process in the meantime
            Err(_) => Ok(AdmissionOutcome::Queued { batch_id: batch.id }),
        }
    }

    /// Appends to the open batch for `key`, creating it if needed.
    async fn append(
        &self,
        notification: &StoredNotification,
        key: GroupingKey,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<NotificationBatch, PersistenceError> {
        let new_batch = NewBatch {
            key,
            created_at: now,
            scheduled_for: now
                .checked_add_signed(config.batching.max_batch_delay())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match self.store.open_batch(&new_batch).await {
                Ok(open) => {
                    self.store
                        .append_to_batch(open.id, notification.id, notification.request.priority_score, now)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Err(PersistenceError::Conflict(reason)) if attempt < MAX_CONFLICT_RETRIES => {
                    tracing::debug!(%reason, attempt, "Open batch closed concurrently, retrying.");
                }
                other => return other,
            }
        }
    }

    async fn send_immediately(
        &self,
        notification: &StoredNotification,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, PersistenceError> {
        let request = &notification.request;
        let deliverable = Deliverable {
            subject: request.subject.clone(),
            body: request.body.clone(),
            recipient_id: request.recipient_id.clone(),
            channel: request.channel.clone(),
        };
        let delivery_id = self
            .orchestrator
            .enqueue(DeliverySubject::Notification(notification.id), deliverable, &config.delivery, now)
            .await?;
        self.store.set_notification_status(notification.id, NotificationStatus::Dispatched, now).await?;
        tracing::debug!(delivery_id, "Notification bypassed batching.");

        let delivery = self.orchestrator.deliver(delivery_id, &config.delivery).await;
        Ok(AdmissionOutcome::SentImmediately { delivery })
    }

    /// Finalizes an open batch while its group lock is held. Returns the
    /// created delivery ids, or the batch status if it was no longer open.
    async fn finalize(
        &self,
        batch_id: i64,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Result<Vec<i64>, BatchStatus>, PersistenceError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let batch = self
                .store
                .get_batch(batch_id)
                .await?
                .ok_or_else(|| PersistenceError::NotFound(format!("batch {}", batch_id)))?;
            if !batch.is_open() {
                return Ok(Err(batch.status));
            }

            let members = self.store.get_batch_members(batch_id).await?;
            let (summary, deliverables) = consolidate(&members);
            let deliveries: Vec<NewDelivery> = deliverables
                .into_iter()
                .map(|d| {
                    DeliveryOrchestrator::new_delivery(
                        DeliverySubject::Batch(batch_id),
                        d,
                        &config.delivery,
                        now,
                    )
                })
                .collect();

            if let Some(ids) = self.store.finalize_batch(batch_id, &summary, &deliveries, now).await? {
                tracing::info!(batch_id, members = members.len(), deliveries = ids.len(), "Batch flushed.");
                return Ok(Ok(ids));
            }
            tracing::debug!(batch_id, "Batch changed while flushing, re-reading.");
        }
        Err(PersistenceError::Conflict(format!("batch {} kept changing while flushing", batch_id)))
    }

    async fn deliver_all(&self, ids: Vec<i64>, config: &EngineConfig) -> Vec<DeliveryAttempt> {
        let mut attempts = Vec::with_capacity(ids.len());
        for id in ids {
            attempts.push(self.orchestrator.deliver(id, &config.delivery).await);
        }
        attempts
    }

    /// Flushes batch `batch_id` regardless of its size or age. Idempotent:
    /// a batch that is not open is left unchanged.
    #[tracing::instrument(skip(self, config), level = "debug")]
    pub async fn flush(
        &self,
        batch_id: i64,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<FlushOutcome, PersistenceError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("batch {}", batch_id)))?;
        if !batch.is_open() {
            return Ok(FlushOutcome::NotOpen { status: batch.status });
        }

        let lock = self.get_group_lock(&batch.key.to_string());
        let guard = lock.lock().await;
        let finalized = self.finalize(batch_id, config, now).await?;
        drop(guard);

        match finalized {
            Ok(ids) => Ok(FlushOutcome::Flushed { deliveries: self.deliver_all(ids, config).await }),
            Err(status) => Ok(FlushOutcome::NotOpen { status }),
        }
    }

    /// Flushes every open batch whose `scheduled_for` is at or before `now`,
    /// or every open batch when `force` is set. Returns the ids of the
    /// batches flushed; one batch's error is logged and the rest continue.
    #[tracing::instrument(skip(self, config), level = "debug")]
    pub async fn flush_due(&self, config: &EngineConfig, now: DateTime<Utc>, force: bool) -> Vec<i64> {
        let candidates = if force {
            self.store.list_batches_by_status(BatchStatus::Open).await
        } else {
            self.store.list_due_batches(now).await
        };
        let candidates = match candidates {
            Ok(batches) => batches,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list batches due for flushing.");
                return Vec::new();
            }
        };

        let mut flushed = Vec::new();
        for batch in candidates {
            match self.flush(batch.id, config, now).await {
                Ok(FlushOutcome::Flushed { .. }) => flushed.push(batch.id),
                Ok(FlushOutcome::NotOpen { .. }) => {}
                Err(e) => {
                    tracing::error!(batch_id = batch.id, error = %e, "Failed to flush batch.");
                }
            }
        }
        if !flushed.is_empty() {
            tracing::info!(count = flushed.len(), force, "Flushed due batches.");
        }
        flushed
    }

    /// Cancels an open batch and its members. Returns whether it applied.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn cancel(&self, batch_id: i64, now: DateTime<Utc>) -> Result<bool, PersistenceError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("batch {}", batch_id)))?;

        let lock = self.get_group_lock(&batch.key.to_string());
        let _guard = lock.lock().await;
        let cancelled = self.store.cancel_batch(batch_id, now).await?;
        if cancelled {
            tracing::info!(batch_id, members = batch.member_count, "Batch cancelled.");
        }
        Ok(cancelled)
    }
}
