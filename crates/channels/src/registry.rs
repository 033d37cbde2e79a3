//! Sender registry: channel name → outbound sender.
//!
//! The outbound worker only knows this registry; concrete adapters and
//! services register themselves under their channel name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::channel::OutboundSender;
use switchyard_core::error::ChannelError;
use switchyard_core::message::OutboundMessage;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct SenderRegistry {
    senders: RwLock<HashMap<String, Arc<dyn OutboundSender>>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the sender for `channel`.
    pub async fn register_sender(&self, channel: &str, sender: Arc<dyn OutboundSender>) {
        self.senders.write().await.insert(channel.to_string(), sender);
        info!(channel = %channel, "Registered sender");
    }

    /// Returns `false` if nothing was registered under `channel`.
    pub async fn unregister_sender(&self, channel: &str) -> bool {
        let removed = self.senders.write().await.remove(channel).is_some();
        if removed {
            info!(channel = %channel, "Unregistered sender");
        }
        removed
    }

    /// Deliver `message` through the sender registered for `channel`.
    pub async fn send(&self, channel: &str, message: &OutboundMessage) -> Result<(), ChannelError> {
        let sender = self
            .senders
            .read()
            .await
            .get(channel)
            .cloned()
            .ok_or_else(|| ChannelError::NoSenderRegistered(channel.to_string()))?;

        if message.channel != channel {
            return Err(ChannelError::ChannelMismatch {
                expected: channel.to_string(),
                got: message.channel.clone(),
            });
        }
        sender.send(message).await
    }

    /// Registered channel names, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl OutboundSender for SenderRegistry {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        SenderRegistry::send(self, &message.channel, message).await
    }
}
