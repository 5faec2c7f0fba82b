//! A set of helpers for testing

mod clock;
mod engine;
mod notification;
mod sender;

pub use clock::MockClock;
pub use engine::{create_test_engine, create_test_store};
pub use notification::NotificationRequestBuilder;
pub use sender::RecordingSender;
