//! Telegram Bot API channel.
//!
//! One [`TelegramAdapter`] per agent, each long-polling its own bot. The
//! [`TelegramService`] owns all of them and is what gets registered under
//! the `telegram` channel name.

pub mod adapter;
pub mod api;
pub mod format;
pub mod service;

pub use adapter::TelegramAdapter;
pub use api::{HttpTelegramApi, TelegramApi};
pub use service::TelegramService;

use serde_json::Value;
use switchyard_config::{MIN_POLL_INTERVAL_SECONDS, MIN_POLL_TIMEOUT_SECONDS, TelegramConfig};

/// Channel name used on the bus and in the sender registry.
pub const CHANNEL_NAME: &str = "telegram";

/// Per-agent bot settings, parsed from the agent's channel binding.
#[derive(Clone, PartialEq)]
pub struct TelegramAgentConfig {
    pub bot_token: String,
    /// Empty means every chat is accepted.
    pub allowed_chat_ids: Vec<String>,
    pub poll_timeout_seconds: u64,
    pub poll_interval_seconds: f64,
    pub drop_pending_updates: bool,
    pub proxy: Option<String>,
}

impl std::fmt::Debug for TelegramAgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAgentConfig")
            .field("bot_token", &"[REDACTED]")
            .field("allowed_chat_ids", &self.allowed_chat_ids)
            .field("poll_timeout_seconds", &self.poll_timeout_seconds)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("drop_pending_updates", &self.drop_pending_updates)
            .field("proxy", &self.proxy.as_ref().map(|_| "[SET]"))
            .finish()
    }
}

impl TelegramAgentConfig {
    /// Parse a binding's JSON config, filling gaps from `[telegram]` and
    /// clamping the polling knobs to their minimums.
    pub fn from_channel_config(value: &Value, defaults: &TelegramConfig) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };

        let allowed_chat_ids = match value.get("allowed_chat_ids") {
            Some(Value::Array(items)) => items.iter().filter_map(chat_id_string).collect(),
            _ => Vec::new(),
        };

        let poll_timeout_seconds = value
            .get("poll_timeout_seconds")
            .and_then(Value::as_u64)
            .unwrap_or(defaults.poll_timeout_seconds)
            .max(MIN_POLL_TIMEOUT_SECONDS);

        let poll_interval_seconds = value
            .get("poll_interval_seconds")
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .unwrap_or(defaults.poll_interval_seconds)
            .max(MIN_POLL_INTERVAL_SECONDS);

        Self {
            bot_token: text("bot_token").unwrap_or_default(),
            allowed_chat_ids,
            poll_timeout_seconds,
            poll_interval_seconds,
            drop_pending_updates: value
                .get("drop_pending_updates")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.drop_pending_updates),
            proxy: text("proxy"),
        }
    }

    pub fn has_token(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }

    pub fn allows_chat(&self, chat_id: &str) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.iter().any(|id| id == chat_id)
    }
}

fn chat_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
