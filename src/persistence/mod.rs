//! Persisted engine state: throttle counters, batches, delivery records and
//! the throttle audit log.

pub mod error;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteMetricsStore;
