//! Rate limiting of notification requests per (recipient, channel).
//!
//! [`evaluate`] is a pure function over a [`ThrottleMetric`]; the
//! [`ThrottleService`] wraps it with loading, persisting and per-key locking.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    config::ThrottlingConfig,
    models::{
        AllowReason, NotificationRequest, ThrottleDecision, ThrottleEvent, ThrottleMetric,
        ThrottleReason,
    },
    persistence::{error::PersistenceError, traits::MetricsStore},
};

/// Resets a fixed window whose start is older than `length`.
fn roll_window(count: &mut u32, start: &mut DateTime<Utc>, length: TimeDelta, now: DateTime<Utc>) {
    if now - *start > length {
        *count = 0;
        *start = now;
    }
}

/// Evaluates `request` against `metric` and updates `metric` in place.
///
/// Checks run in order and the first match wins: exemption, cooldown, burst,
/// hourly, daily. A window that has run out resets before its limit is
/// checked. Counters incremented by an earlier check are kept even when a
/// later check throttles. Exempt requests still advance the counters but are
/// never blocked.
///
/// Cooldown spaces sends, so a request headed for a batch (`batched`) is
/// neither checked against it nor restarts it.
pub fn evaluate(
    request: &NotificationRequest,
    metric: &mut ThrottleMetric,
    config: &ThrottlingConfig,
    batched: bool,
    now: DateTime<Utc>,
) -> ThrottleDecision {
    if !config.enabled {
        return ThrottleDecision::Allow(AllowReason::ThrottlingDisabled);
    }

    let exemption = if request.is_critical_exempt(config) {
        Some(AllowReason::CriticalSeverity)
    } else if request.is_high_priority_exempt(config) {
        Some(AllowReason::HighPriority)
    } else {
        None
    };

    if let Some(reason) = exemption {
        roll_window(&mut metric.burst_count, &mut metric.burst_window_start, config.burst_window(), now);
        roll_window(&mut metric.hourly_count, &mut metric.hour_window_start, TimeDelta::hours(1), now);
        roll_window(&mut metric.daily_count, &mut metric.day_window_start, TimeDelta::days(1), now);
        metric.burst_count = metric.burst_count.saturating_add(1);
        metric.hourly_count = metric.hourly_count.saturating_add(1);
        metric.daily_count = metric.daily_count.saturating_add(1);
        if !batched {
            metric.last_notification_time = Some(now);
        }
        return ThrottleDecision::Allow(reason);
    }

    if let Some(last) = metric.last_notification_time.filter(|_| !batched) {
        if now - last < config.cooldown() {
            return ThrottleDecision::Throttle(ThrottleReason::CooldownActive);
        }
    }

    let windows = [
        (
            &mut metric.burst_count,
            &mut metric.burst_window_start,
            config.burst_window(),
            config.burst_limit,
            ThrottleReason::BurstLimitExceeded,
        ),
        (
            &mut metric.hourly_count,
            &mut metric.hour_window_start,
            TimeDelta::hours(1),
            config.rate_limit_per_hour,
            ThrottleReason::HourlyLimitExceeded,
        ),
        (
            &mut metric.daily_count,
            &mut metric.day_window_start,
            TimeDelta::days(1),
            config.rate_limit_per_day,
            ThrottleReason::DailyLimitExceeded,
        ),
    ];

    for (count, start, length, limit, reason) in windows {
        roll_window(count, start, length, now);
        if count.saturating_add(1) > limit {
            return ThrottleDecision::Throttle(reason);
        }
        *count += 1;
    }

    if !batched {
        metric.last_notification_time = Some(now);
    }
    ThrottleDecision::Allow(AllowReason::WithinLimits)
}

/// Applies [`evaluate`] to persisted metrics, serialized per
/// (recipient, channel).
pub struct ThrottleService {
    store: Arc<dyn MetricsStore>,

    /// A map of (recipient, channel) pairs to their locks to prevent lost
    /// counter updates.
    metric_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ThrottleService {
    /// Creates a new ThrottleService.
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store, metric_locks: DashMap::new() }
    }

    /// Gets or creates the lock for a (recipient, channel) pair.
    fn get_metric_lock(&self, recipient_id: &str, channel: &str) -> Arc<Mutex<()>> {
        self.metric_locks
            .entry((recipient_id.to_string(), channel.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Evaluates `request`, persists the updated metric and appends exactly
    /// one audit event.
    #[tracing::instrument(skip(self, request, config), level = "debug", fields(recipient_id = %request.recipient_id, channel = %request.channel))]
    pub async fn check(
        &self,
        request: &NotificationRequest,
        notification_id: Option<i64>,
        config: &ThrottlingConfig,
        batched: bool,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, PersistenceError> {
        let lock = self.get_metric_lock(&request.recipient_id, &request.channel);
        let _guard = lock.lock().await;

        let mut metric = self
            .store
            .get_throttle_metric(&request.recipient_id, &request.channel)
            .await?
            .unwrap_or_else(|| ThrottleMetric::new(&request.recipient_id, &request.channel, now));

        let decision = evaluate(request, &mut metric, config, batched, now);
        let event = ThrottleEvent::record(request, notification_id, &decision, now);
        self.store.record_throttle_decision(&metric, &event).await?;

        match decision {
            ThrottleDecision::Throttle(reason) => {
                tracing::info!(%reason, notification_id, "Notification throttled.");
            }
            ThrottleDecision::Allow(reason) => {
                tracing::debug!(reason = reason.as_str(), notification_id, "Notification allowed.");
            }
        }
        Ok(decision)
    }

    /// Reports the decision `config` would produce for `request` against the
    /// current metric, without persisting anything.
    pub async fn preview(
        &self,
        request: &NotificationRequest,
        config: &ThrottlingConfig,
        batched: bool,
        now: DateTime<Utc>,
    ) -> Result<(ThrottleDecision, Option<ThrottleMetric>), PersistenceError> {
        let current = self.store.get_throttle_metric(&request.recipient_id, &request.channel).await?;
        let mut metric = current
            .clone()
            .unwrap_or_else(|| ThrottleMetric::new(&request.recipient_id, &request.channel, now));
        Ok((evaluate(request, &mut metric, config, batched, now), current))
    }

    /// Returns the persisted rate state for a pair.
    pub async fn get_metric(
        &self,
        recipient_id: &str,
        channel: &str,
    ) -> Result<Option<ThrottleMetric>, PersistenceError> {
        self.store.get_throttle_metric(recipient_id, channel).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        models::{Severity, ThrottleEventType},
        persistence::traits::MockMetricsStore,
        test_helpers::NotificationRequestBuilder,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn no_cooldown() -> ThrottlingConfig {
        ThrottlingConfig { cooldown_minutes: 0, ..Default::default() }
    }

    fn ordinary() -> NotificationRequest {
        NotificationRequestBuilder::new("u1").priority_score(10).build()
    }

    #[test]
    fn test_first_request_is_allowed_and_counted() {
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        let decision = evaluate(&ordinary(), &mut metric, &ThrottlingConfig::default(), false, t0());

        assert_eq!(decision, ThrottleDecision::Allow(AllowReason::WithinLimits));
        assert_eq!(metric.burst_count, 1);
        assert_eq!(metric.hourly_count, 1);
        assert_eq!(metric.daily_count, 1);
        assert_eq!(metric.last_notification_time, Some(t0()));
    }

    #[test]
    fn test_cooldown_boundary() {
        let config = ThrottlingConfig::default();
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        assert!(evaluate(&ordinary(), &mut metric, &config, false, t0()).is_allowed());

        let four_minutes = t0() + TimeDelta::minutes(4);
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, four_minutes),
            ThrottleDecision::Throttle(ThrottleReason::CooldownActive)
        );

        let five_minutes = t0() + TimeDelta::minutes(5);
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, five_minutes),
            ThrottleDecision::Allow(AllowReason::WithinLimits)
        );
    }

    #[test]
    fn test_cooldown_does_not_advance_counters() {
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        evaluate(&ordinary(), &mut metric, &ThrottlingConfig::default(), false, t0());
        evaluate(&ordinary(), &mut metric, &ThrottlingConfig::default(), false, t0() + TimeDelta::minutes(1));
        assert_eq!(metric.hourly_count, 1);
        assert_eq!(metric.burst_count, 1);
    }

    #[test]
    fn test_eleventh_request_in_burst_window_is_throttled() {
        let config = no_cooldown();
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for i in 0..10 {
            let now = t0() + TimeDelta::minutes(i);
            assert!(evaluate(&ordinary(), &mut metric, &config, false, now).is_allowed(), "request {}", i + 1);
        }
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::minutes(14)),
            ThrottleDecision::Throttle(ThrottleReason::BurstLimitExceeded)
        );
        assert!(metric.hourly_count < config.rate_limit_per_hour);
    }

    #[test]
    fn test_burst_window_resets_after_it_elapses() {
        let config = no_cooldown();
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for _ in 0..10 {
            evaluate(&ordinary(), &mut metric, &config, false, t0());
        }
        // Exactly the window length is not yet past it
        assert!(!evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::minutes(15)).is_allowed());

        let later = t0() + TimeDelta::minutes(15) + TimeDelta::seconds(1);
        assert!(evaluate(&ordinary(), &mut metric, &config, false, later).is_allowed());
        assert_eq!(metric.burst_count, 1);
        assert_eq!(metric.burst_window_start, later);
    }

    #[test]
    fn test_fifty_first_request_in_hour_is_throttled() {
        let config = ThrottlingConfig { burst_limit: 1000, ..no_cooldown() };
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for i in 0..50 {
            let now = t0() + TimeDelta::seconds(i * 60);
            assert!(evaluate(&ordinary(), &mut metric, &config, false, now).is_allowed(), "request {}", i + 1);
        }
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::minutes(59)),
            ThrottleDecision::Throttle(ThrottleReason::HourlyLimitExceeded)
        );
    }

    #[test]
    fn test_daily_limit() {
        let config = ThrottlingConfig {
            burst_limit: 1000,
            rate_limit_per_hour: 1000,
            rate_limit_per_day: 3,
            ..no_cooldown()
        };
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for i in 0..3 {
            assert!(evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::hours(i * 2)).is_allowed());
        }
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::hours(7)),
            ThrottleDecision::Throttle(ThrottleReason::DailyLimitExceeded)
        );
        // Earlier windows kept the increment made before the daily check failed
        assert_eq!(metric.daily_count, 3);
        assert_eq!(metric.burst_count, 1);

        let next_day = t0() + TimeDelta::days(1) + TimeDelta::minutes(1);
        assert!(evaluate(&ordinary(), &mut metric, &config, false, next_day).is_allowed());
        assert_eq!(metric.daily_count, 1);
    }

    #[test]
    fn test_exempt_requests_are_never_throttled() {
        let config = ThrottlingConfig { burst_limit: 1, rate_limit_per_hour: 1, ..Default::default() };
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        let critical = NotificationRequestBuilder::new("u1").severity(Severity::Critical).build();
        let urgent = NotificationRequestBuilder::new("u1").priority_score(95).build();

        for _ in 0..5 {
            assert_eq!(
                evaluate(&critical, &mut metric, &config, false, t0()),
                ThrottleDecision::Allow(AllowReason::CriticalSeverity)
            );
            assert_eq!(
                evaluate(&urgent, &mut metric, &config, false, t0()),
                ThrottleDecision::Allow(AllowReason::HighPriority)
            );
        }
        // Counters still reflect the traffic
        assert_eq!(metric.hourly_count, 10);
        // And they block ordinary requests afterwards
        assert!(!evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::minutes(10)).is_allowed());
    }

    #[test]
    fn test_disabled_throttling_allows_without_counting() {
        let config = ThrottlingConfig { enabled: false, ..Default::default() };
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for _ in 0..100 {
            assert_eq!(
                evaluate(&ordinary(), &mut metric, &config, false, t0()),
                ThrottleDecision::Allow(AllowReason::ThrottlingDisabled)
            );
        }
        assert_eq!(metric, ThrottleMetric::new("u1", "email", t0()));
    }

    #[test]
    fn test_batched_requests_skip_cooldown() {
        let config = ThrottlingConfig::default();
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        assert!(evaluate(&ordinary(), &mut metric, &config, false, t0()).is_allowed());

        let one_minute = t0() + TimeDelta::minutes(1);
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, true, one_minute),
            ThrottleDecision::Allow(AllowReason::WithinLimits)
        );
        assert_eq!(metric.burst_count, 2);
        // Batched admissions do not restart the cooldown
        assert_eq!(metric.last_notification_time, Some(t0()));

        let two_minutes = t0() + TimeDelta::minutes(2);
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, two_minutes),
            ThrottleDecision::Throttle(ThrottleReason::CooldownActive)
        );
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, false, t0() + TimeDelta::minutes(5)),
            ThrottleDecision::Allow(AllowReason::WithinLimits)
        );
    }

    #[test]
    fn test_batched_requests_still_hit_burst_limit() {
        let config = ThrottlingConfig::default();
        let mut metric = ThrottleMetric::new("u1", "email", t0());
        for i in 0..10 {
            let now = t0() + TimeDelta::minutes(i);
            assert!(evaluate(&ordinary(), &mut metric, &config, true, now).is_allowed());
        }
        assert_eq!(
            evaluate(&ordinary(), &mut metric, &config, true, t0() + TimeDelta::minutes(10)),
            ThrottleDecision::Throttle(ThrottleReason::BurstLimitExceeded)
        );
        assert!(metric.last_notification_time.is_none());
    }

    #[tokio::test]
    async fn test_check_writes_exactly_one_event() {
        let mut store = MockMetricsStore::new();
        store.expect_get_throttle_metric().times(1).returning(|_, _| Ok(None));
        store
            .expect_record_throttle_decision()
            .times(1)
            .withf(|metric, event| {
                metric.hourly_count == 1 && event.event_type == ThrottleEventType::Allowed
            })
            .returning(|_, _| Ok(()));

        let service = ThrottleService::new(Arc::new(store));
        let decision = service.check(&ordinary(), Some(1), &ThrottlingConfig::default(), false, t0()).await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_check_propagates_store_errors() {
        let mut store = MockMetricsStore::new();
        store
            .expect_get_throttle_metric()
            .returning(|_, _| Err(PersistenceError::OperationFailed("db down".into())));
        store.expect_record_throttle_decision().never();

        let service = ThrottleService::new(Arc::new(store));
        let result = service.check(&ordinary(), None, &ThrottlingConfig::default(), false, t0()).await;
        assert!(matches!(result, Err(PersistenceError::OperationFailed(_))));
    }

    #[test]
    fn test_get_metric_lock_is_shared_and_distinct() {
        let service = ThrottleService::new(Arc::new(MockMetricsStore::new()));
        let a1 = service.get_metric_lock("u1", "email");
        let a2 = service.get_metric_lock("u1", "email");
        let b = service.get_metric_lock("u1", "slack");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
