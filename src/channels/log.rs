use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ChannelSendError, ChannelSender};
use crate::models::{Deliverable, SendResult};

/// A sender that writes each message to the log and standard output instead
/// of a real transport. Succeeds for every message addressed to its own
/// channel.
#[derive(Debug, Clone)]
pub struct LogSender {
    channel: String,
}

impl LogSender {
    /// Creates a new `LogSender` for `channel`.
    pub fn new(channel: impl Into<String>) -> Self {
        Self { channel: channel.into() }
    }
}

#[async_trait]
impl ChannelSender for LogSender {
    async fn send(&self, deliverable: &Deliverable) -> Result<SendResult, ChannelSendError> {
        if deliverable.channel != self.channel {
            return Err(ChannelSendError::Rejected(format!(
                "message for channel '{}' routed to the '{}' sender",
                deliverable.channel, self.channel
            )));
        }

        tracing::info!(
            channel = %self.channel,
            recipient_id = %deliverable.recipient_id,
            subject = %deliverable.subject,
            "Delivering message."
        );
        println!(
            "=== {} -> {} ===\n{}\n{}\n",
            self.channel, deliverable.recipient_id, deliverable.subject, deliverable.body
        );

        let mut response = Map::new();
        response.insert("sender".to_string(), Value::from("log"));
        response.insert("channel".to_string(), Value::from(self.channel.clone()));
        Ok(SendResult::success(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sender_succeeds() {
        let sender = LogSender::new("email");
        let deliverable = Deliverable {
            subject: "Zoning change".to_string(),
            body: "Parcel 12 rezoned".to_string(),
            recipient_id: "u1".to_string(),
            channel: "email".to_string(),
        };

        let result = sender.send(&deliverable).await.unwrap();
        assert!(result.success);
        assert_eq!(result.response_data["channel"], "email");
    }

    #[tokio::test]
    async fn test_log_sender_rejects_other_channels() {
        let sender = LogSender::new("slack");
        let deliverable = Deliverable {
            subject: "Zoning change".to_string(),
            body: "Parcel 12 rezoned".to_string(),
            recipient_id: "u1".to_string(),
            channel: "email".to_string(),
        };

        let result = sender.send(&deliverable).await;
        assert!(matches!(result, Err(ChannelSendError::Rejected(_))));
    }
}
