//! The Sweeper periodically flushes aged batches, expires overdue delivery
//! records and attempts due retries.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use super::notification_engine::NotificationEngine;

/// The Sweeper service.
pub struct Sweeper {
    /// The engine the sweep runs against.
    engine: Arc<NotificationEngine>,
    /// Time between sweeps.
    interval: Duration,
    /// A token used to signal a graceful shutdown.
    cancellation_token: CancellationToken,
}

impl Sweeper {
    /// Creates a new Sweeper instance.
    pub fn new(
        engine: Arc<NotificationEngine>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { engine, interval, cancellation_token }
    }

    /// Starts the long-running service loop.
    pub async fn run(self) {
        loop {
            let delay = tokio::time::sleep(self.interval);

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Sweeper cancellation signal received, shutting down...");
                    break;
                }

                _ = delay => {
                    tracing::debug!("Running sweep...");
                    let report = self.engine.tick().await;
                    if !report.flushed_batches.is_empty()
                        || !report.deliveries.expired.is_empty()
                        || !report.deliveries.attempted.is_empty()
                    {
                        tracing::info!(
                            flushed_batches = report.flushed_batches.len(),
                            expired = report.deliveries.expired.len(),
                            attempted = report.deliveries.attempted.len(),
                            errors = report.deliveries.errors,
                            "Sweep completed."
                        );
                    }
                }
            }
        }
        tracing::info!("Sweeper has shut down.");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{
        config::EngineConfig,
        test_helpers::{MockClock, NotificationRequestBuilder, RecordingSender, create_test_engine},
    };

    #[tokio::test]
    async fn test_sweeper_flushes_aged_batch_and_stops_on_cancel() {
        let clock = MockClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
        let sender = Arc::new(RecordingSender::new());
        let (engine, _store) = create_test_engine(
            EngineConfig::default(),
            &["email"],
            sender.clone(),
            Arc::new(clock.clone()),
        )
        .await;

        engine.submit(NotificationRequestBuilder::new("u1").build()).await.unwrap();
        clock.advance(TimeDelta::minutes(31));

        let token = CancellationToken::new();
        let sweeper = Sweeper::new(Arc::clone(&engine), Duration::from_millis(10), token.clone());
        let handle = tokio::spawn(sweeper.run());

        for _ in 0..100 {
            if !sender.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sender.sent().len(), 1);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
