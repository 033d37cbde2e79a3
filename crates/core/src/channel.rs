//! Channel traits: the boundary between transports and the pipeline.
//!
//! A channel adapter connects one agent to a messaging platform (Telegram,
//! the local console, the web panel). Inbound traffic is normalized into
//! [`InboundMessage`](crate::message::InboundMessage)s and published on the
//! bus; outbound traffic arrives through an [`OutboundSender`] registered
//! under the channel's name.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::message::OutboundMessage;

/// Anything that can deliver an outbound message for one channel name.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// A transport adapter bound to a single agent.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel name (e.g., "telegram").
    fn channel(&self) -> &str;

    /// The agent this adapter serves.
    fn agent_id(&self) -> &str;

    /// Begin ingestion. Calling it on a running adapter is a no-op.
    /// Fails when the adapter is misconfigured (e.g. missing credentials).
    async fn start(&self) -> Result<(), ChannelError>;

    /// Release ingestion resources. Idempotent.
    async fn stop(&self) -> Result<(), ChannelError>;

    /// Deliver one outbound message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError>;

    /// Reject messages addressed to another channel or agent.
    fn check_identity(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        if message.channel != self.channel() {
            return Err(ChannelError::ChannelMismatch {
                expected: self.channel().to_string(),
                got: message.channel.clone(),
            });
        }
        if message.agent_id != self.agent_id() {
            return Err(ChannelError::AgentMismatch {
                expected: self.agent_id().to_string(),
                got: message.agent_id.clone(),
            });
        }
        Ok(())
    }
}
