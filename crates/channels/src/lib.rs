//! Channel implementations for Switchyard.
//!
//! Each channel turns a transport into bus traffic and delivers replies
//! back through an [`OutboundSender`](switchyard_core::OutboundSender)
//! registered under its name.
//!
//! Available channels:
//! - **Local**: `web` and `console`, replies read in-process
//! - **Telegram**: Bot API long polling, one bot per agent
//! - **Registry**: channel name → sender routing for the outbound worker
//! - **Manager**: lifecycle of all of the above

pub mod local;
pub mod manager;
pub mod registry;
pub mod telegram;

pub use local::LocalSender;
pub use manager::ChannelManager;
pub use registry::SenderRegistry;
pub use telegram::{TelegramAdapter, TelegramAgentConfig, TelegramService};
