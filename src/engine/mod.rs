//! The Herald engine admits notification requests through the throttle,
//! consolidates them into batches and drives delivery records to a terminal
//! state.

pub mod batch_manager;
pub mod delivery;
pub mod notification_engine;
pub mod sweeper;
pub mod throttle;
