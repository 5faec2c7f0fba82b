use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Map;

use crate::{
    channels::{ChannelSendError, ChannelSender},
    models::{Deliverable, SendResult},
};

/// A channel sender that records every message it is asked to send.
///
/// Built with [`RecordingSender::failing`] it reports a transport failure for
/// the first `n` sends and succeeds afterwards.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Deliverable>>,
    failures_left: Mutex<u32>,
}

impl RecordingSender {
    /// Creates a sender that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sender whose first `failures` sends fail.
    pub fn failing(failures: u32) -> Self {
        Self { sent: Mutex::new(Vec::new()), failures_left: Mutex::new(failures) }
    }

    /// Everything passed to `send`, in call order.
    pub fn sent(&self) -> Vec<Deliverable> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    async fn send(&self, deliverable: &Deliverable) -> Result<SendResult, ChannelSendError> {
        self.sent.lock().unwrap().push(deliverable.clone());

        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Ok(SendResult::failure("connection reset"));
        }
        Ok(SendResult::success(Map::new()))
    }
}
