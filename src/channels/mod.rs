//! # Channel senders
//!
//! The transports that actually deliver a message (SMTP, chat webhooks, ...)
//! live outside the engine. The engine reaches them through the
//! [`ChannelSender`] trait, looked up by channel name in a
//! [`ChannelRegistry`].
//!
//! A sender reports the outcome of one attempt as a [`SendResult`]. Returning
//! an `Err` is treated exactly like an unsuccessful `SendResult`: the
//! delivery orchestrator records the message and schedules a retry. It never
//! interprets channel-specific error codes.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::{Deliverable, SendResult};

mod log;

pub use log::LogSender;

/// Any failure raised by a channel sender.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelSendError {
    /// The transport could not be reached or timed out.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport rejected the message.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Delivers one message on one channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Attempts to deliver `deliverable` once.
    async fn send(&self, deliverable: &Deliverable) -> Result<SendResult, ChannelSendError>;
}

/// Channel senders keyed by channel name.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    senders: HashMap<String, Arc<dyn ChannelSender>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a [`LogSender`] for each of `channels`.
    pub fn with_log_senders<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for channel in channels {
            let channel = channel.into();
            registry.register(channel.clone(), Arc::new(LogSender::new(channel)));
        }
        registry
    }

    /// Registers `sender` for `channel`, replacing any previous sender.
    pub fn register(&mut self, channel: impl Into<String>, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(channel.into(), sender);
    }

    /// Returns the sender for `channel`.
    pub fn get(&self, channel: &str) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(channel).cloned()
    }

    /// Whether a sender is registered for `channel`.
    pub fn contains(&self, channel: &str) -> bool {
        self.senders.contains_key(channel)
    }

    /// The registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry").field("channels", &self.channels()).finish()
    }
}
