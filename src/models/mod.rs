//! Data models for the admission, batching and delivery engine.

pub mod batch;
pub mod delivery;
pub mod notification;
pub mod throttle;

pub use batch::{BatchStatus, BatchSummary, GroupingKey, NewBatch, NotificationBatch};
pub use delivery::{
    Deliverable, DeliveryOutcome, DeliveryRecord, DeliveryStatus, DeliverySubject,
    DeliveryUpdate, NewDelivery, SendResult,
};
pub use notification::{NotificationRequest, NotificationStatus, Severity, StoredNotification};
pub use throttle::{
    AllowReason, ThrottleDecision, ThrottleEvent, ThrottleEventType, ThrottleMetric,
    ThrottleReason,
};
