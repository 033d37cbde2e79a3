//! Sender for in-process channels (`web`, `console`).
//!
//! Callers on these channels read the reply from the bus response slot or
//! from the stored message log, so delivery is a no-op.

use async_trait::async_trait;
use switchyard_core::channel::OutboundSender;
use switchyard_core::error::ChannelError;
use switchyard_core::message::OutboundMessage;
use tracing::debug;

pub const WEB_CHANNEL: &str = "web";
pub const CONSOLE_CHANNEL: &str = "console";

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSender;

#[async_trait]
impl OutboundSender for LocalSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        debug!(
            channel = %message.channel,
            agent_id = %message.agent_id,
            chars = message.content.chars().count(),
            "Local channel reply discarded"
        );
        Ok(())
    }
}
