#![warn(missing_docs)]
//! Herald admits classified notification requests through per-recipient rate
//! limits, consolidates them into batches and drives each delivery through a
//! retrying state machine.

pub mod channels;
pub mod clock;
pub mod cmd;
pub mod config;
pub mod engine;
pub mod http_server;
pub mod models;
pub mod persistence;
pub mod supervisor;
pub mod test_helpers;
