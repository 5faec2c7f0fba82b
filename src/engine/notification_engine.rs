//! The entry point used by the HTTP API, the CLI and the sweeper.
//!
//! `NotificationEngine` wires the throttle service, batch manager and
//! delivery orchestrator together. Each call takes one configuration
//! snapshot and uses it for the whole call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    batch_manager::{self, AdmissionOutcome, BatchManager, FlushOutcome},
    delivery::{DeliveryOrchestrator, DeliverySweepReport, DirectSend},
    throttle::ThrottleService,
};
use crate::{
    channels::ChannelRegistry,
    clock::Clock,
    config::{ConfigError, ConfigManager, ConfigOverride, EngineConfig, ThrottlingConfig},
    models::{
        Deliverable, DeliveryRecord, NotificationBatch, NotificationRequest, NotificationStatus,
        Severity, StoredNotification, ThrottleDecision, ThrottleEvent, ThrottleMetric,
    },
    persistence::{error::PersistenceError, traits::MetricsStore},
};

/// Number of audit events returned with throttle metrics.
const RECENT_EVENTS_LIMIT: u32 = 20;

/// Errors that can occur within the NotificationEngine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error occurred in the metrics store
    #[error("Persistence error: {0}")]
    Persistence(PersistenceError),

    /// The referenced batch, delivery or notification does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not allowed in the target's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No sender is registered for the channel
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// The request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<PersistenceError> for EngineError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Persistence(other),
        }
    }
}

/// Result of submitting a notification request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// The persisted notification.
    pub notification_id: i64,
    /// The throttle decision.
    pub decision: ThrottleDecision,
    /// What happened after the request was allowed. `None` when throttled.
    pub admission: Option<AdmissionOutcome>,
}

/// Rate state of one (recipient, channel) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStatus {
    /// The recipient.
    pub recipient_id: String,
    /// The channel.
    pub channel: String,
    /// Persisted counters, `None` before the first request.
    pub metric: Option<ThrottleMetric>,
    /// The limits in force.
    pub limits: ThrottlingConfig,
    /// Most recent audit events, newest first.
    pub recent_events: Vec<ThrottleEvent>,
}

/// A batch with its members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchDetails {
    /// The batch.
    #[serde(flatten)]
    pub batch: NotificationBatch,
    /// Its members in insertion order.
    pub members: Vec<StoredNotification>,
}

fn default_test_severity() -> Severity {
    Severity::Medium
}

fn default_test_priority() -> u8 {
    50
}

/// Parameters of a test notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestNotification {
    /// Channel to send on.
    pub channel: String,
    /// Recipient to send to.
    pub recipient_id: String,
    /// Subject of the test message.
    #[serde(default)]
    pub subject: Option<String>,
    /// Body of the test message.
    #[serde(default)]
    pub body: Option<String>,
    /// Severity used for the dry-run throttle decision.
    #[serde(default = "default_test_severity")]
    pub severity: Severity,
    /// Priority used for the dry-run throttle decision.
    #[serde(default = "default_test_priority")]
    pub priority_score: u8,
    /// Configuration to evaluate against instead of the active one.
    #[serde(default)]
    pub config: Option<EngineConfig>,
}

/// What a test notification did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestNotificationReport {
    /// The decision the configuration would produce for a real request,
    /// evaluated against current counters without changing them.
    pub throttle_decision: ThrottleDecision,
    /// Current counters for the pair.
    pub current_metric: Option<ThrottleMetric>,
    /// The message that was sent.
    pub deliverable: Deliverable,
    /// The send result and latency.
    pub send: DirectSend,
}

/// What a sweep pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Batches flushed.
    pub flushed_batches: Vec<i64>,
    /// Delivery expiry and retry work.
    pub deliveries: DeliverySweepReport,
}

/// Admission, batching and delivery of notifications.
pub struct NotificationEngine {
    store: Arc<dyn MetricsStore>,
    config: Arc<ConfigManager>,
    clock: Arc<dyn Clock>,
    channels: Arc<ChannelRegistry>,
    throttle: ThrottleService,
    batches: BatchManager,
    orchestrator: Arc<DeliveryOrchestrator>,
}

impl NotificationEngine {
    /// Creates a new NotificationEngine.
    pub fn new(
        store: Arc<dyn MetricsStore>,
        channels: ChannelRegistry,
        config: Arc<ConfigManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let channels = Arc::new(channels);
        let orchestrator = Arc::new(DeliveryOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&channels),
            Arc::clone(&clock),
        ));
        Self {
            throttle: ThrottleService::new(Arc::clone(&store)),
            batches: BatchManager::new(Arc::clone(&store), Arc::clone(&orchestrator)),
            store,
            config,
            clock,
            channels,
            orchestrator,
        }
    }

    /// Returns the active configuration snapshot.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.snapshot()
    }

    /// The registered channel names.
    pub fn channels(&self) -> Vec<String> {
        self.channels.channels()
    }

    fn ensure_channel(&self, channel: &str) -> Result<(), EngineError> {
        if self.channels.contains(channel) {
            Ok(())
        } else {
            Err(EngineError::UnknownChannel(channel.to_string()))
        }
    }

    /// Persists, throttles and admits a notification request.
    #[tracing::instrument(skip(self, request), level = "info", fields(recipient_id = %request.recipient_id, channel = %request.channel))]
    pub async fn submit(&self, request: NotificationRequest) -> Result<SubmitOutcome, EngineError> {
        request.validate().map_err(EngineError::InvalidRequest)?;
        self.ensure_channel(&request.channel)?;

        let config = self.config.snapshot();
        let now = self.clock.now();

        let notification_id = self.store.insert_notification(&request).await?;
        let batched = batch_manager::is_batched(&request, &config);
        let decision = self
            .throttle
            .check(&request, Some(notification_id), &config.throttling, batched, now)
            .await?;

        if let ThrottleDecision::Throttle(reason) = decision {
            self.store.mark_notification_throttled(notification_id, reason.as_str(), now).await?;
            return Ok(SubmitOutcome { notification_id, decision, admission: None });
        }

        let stored = StoredNotification {
            id: notification_id,
            request,
            batch_id: None,
            status: NotificationStatus::Received,
            throttle_reason: None,
        };
        let admission = self.batches.admit(&stored, &config, now).await?;
        Ok(SubmitOutcome { notification_id, decision, admission: Some(admission) })
    }

    /// Flushes a batch immediately, regardless of size or age.
    pub async fn send_batch_now(&self, batch_id: i64) -> Result<FlushOutcome, EngineError> {
        let config = self.config.snapshot();
        Ok(self.batches.flush(batch_id, &config, self.clock.now()).await?)
    }

    /// Cancels an open batch and its queued members.
    pub async fn cancel_batch(&self, batch_id: i64) -> Result<(), EngineError> {
        if self.batches.cancel(batch_id, self.clock.now()).await? {
            return Ok(());
        }
        let status = self
            .store
            .get_batch(batch_id)
            .await?
            .map(|b| b.status.as_str())
            .unwrap_or("missing");
        Err(EngineError::InvalidState(format!(
            "batch {} is {}, only open batches can be cancelled",
            batch_id, status
        )))
    }

    /// Cancels a `pending` or `retrying` delivery.
    pub async fn cancel_delivery(&self, delivery_id: i64) -> Result<(), EngineError> {
        let record = self
            .store
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("delivery {}", delivery_id)))?;
        if self.orchestrator.cancel(delivery_id).await? {
            return Ok(());
        }
        let status = self
            .store
            .get_delivery(delivery_id)
            .await?
            .map(|r| r.status)
            .unwrap_or(record.status);
        Err(EngineError::InvalidState(format!(
            "delivery {} is {}, only pending or retrying deliveries can be cancelled",
            delivery_id, status
        )))
    }

    /// Returns the rate state and recent audit events of a pair.
    pub async fn get_throttle_metrics(
        &self,
        recipient_id: &str,
        channel: &str,
    ) -> Result<ThrottleStatus, EngineError> {
        let metric = self.throttle.get_metric(recipient_id, channel).await?;
        let recent_events =
            self.store.list_throttle_events(recipient_id, channel, RECENT_EVENTS_LIMIT).await?;
        Ok(ThrottleStatus {
            recipient_id: recipient_id.to_string(),
            channel: channel.to_string(),
            metric,
            limits: self.config.snapshot().throttling.clone(),
            recent_events,
        })
    }

    /// Returns a batch with its members.
    pub async fn get_batch(&self, batch_id: i64) -> Result<BatchDetails, EngineError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("batch {}", batch_id)))?;
        let members = self.store.get_batch_members(batch_id).await?;
        Ok(BatchDetails { batch, members })
    }

    /// Returns a delivery record.
    pub async fn get_delivery(&self, delivery_id: i64) -> Result<DeliveryRecord, EngineError> {
        self.store
            .get_delivery(delivery_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("delivery {}", delivery_id)))
    }

    /// Returns a persisted notification.
    pub async fn get_notification(&self, id: i64) -> Result<StoredNotification, EngineError> {
        self.store
            .get_notification(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("notification {}", id)))
    }

    /// Reports the throttle decision a configuration would produce for the
    /// recipient without changing any state, then sends a test message
    /// directly through the channel sender.
    #[tracing::instrument(skip(self, test), level = "info", fields(channel = %test.channel, recipient_id = %test.recipient_id))]
    pub async fn run_test_notification(
        &self,
        test: TestNotification,
    ) -> Result<TestNotificationReport, EngineError> {
        self.ensure_channel(&test.channel)?;
        let config = match test.config {
            Some(config) => {
                config.validate()?;
                Arc::new(config)
            }
            None => self.config.snapshot(),
        };
        let now = self.clock.now();

        let request = NotificationRequest {
            recipient_id: test.recipient_id,
            channel: test.channel,
            severity: test.severity,
            priority_score: test.priority_score,
            subject: test.subject.unwrap_or_else(|| "Test notification".to_string()),
            body: test.body.unwrap_or_else(|| {
                format!("This is a test notification sent at {}.", now.to_rfc3339())
            }),
            created_at: now,
        };
        request.validate().map_err(EngineError::InvalidRequest)?;

        let (throttle_decision, current_metric) =
            self.throttle
                .preview(&request, &config.throttling, batch_manager::is_batched(&request, &config), now)
                .await?;

        let deliverable = Deliverable {
            subject: request.subject,
            body: request.body,
            recipient_id: request.recipient_id,
            channel: request.channel,
        };
        let send = self.orchestrator.send_direct(&deliverable).await;
        tracing::info!(success = send.result.success, delivery_time_ms = send.delivery_time_ms, "Test notification sent.");

        Ok(TestNotificationReport { throttle_decision, current_metric, deliverable, send })
    }

    /// Runs one sweep: flushes due batches, then expires overdue deliveries
    /// and attempts due retries.
    pub async fn tick(&self) -> SweepReport {
        self.sweep(false).await
    }

    /// Flushes every open batch, then attempts every due delivery.
    pub async fn shutdown_flush(&self) -> SweepReport {
        tracing::info!("Flushing open batches before shutdown...");
        self.sweep(true).await
    }

    async fn sweep(&self, force: bool) -> SweepReport {
        let config = self.config.snapshot();
        let flushed_batches = self.batches.flush_due(&config, self.clock.now(), force).await;
        let deliveries = self.orchestrator.process_due(&config.delivery).await;
        SweepReport { flushed_batches, deliveries }
    }

    /// Rebuilds the configuration snapshot from file settings and stored
    /// overrides.
    pub async fn reload_config(&self) -> Result<Arc<EngineConfig>, EngineError> {
        Ok(self.config.reload().await?)
    }

    /// Stores an override of one tunable and makes it active. An override
    /// that would produce an invalid configuration is rejected and nothing
    /// is stored.
    #[tracing::instrument(skip(self, value), level = "info")]
    pub async fn set_config_override(
        &self,
        config_type: &str,
        config_key: &str,
        value: &serde_json::Value,
    ) -> Result<Arc<EngineConfig>, EngineError> {
        let config_override = ConfigOverride {
            config_type: config_type.to_string(),
            config_key: config_key.to_string(),
            config_value: value.to_string(),
        };
        Ok(self.config.set_override(config_override).await?)
    }
}
