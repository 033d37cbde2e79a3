//! Message domain types.
//!
//! These are the value objects that flow through the pipeline:
//! an adapter receives an [`InboundMessage`], the worker runs a turn and
//! persists [`MessageRecord`]s, and the result leaves as an [`OutboundMessage`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form metadata attached to messages and records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Current time truncated to whole seconds, the resolution of persisted timestamps.
pub fn now_seconds() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_else(Utc::now)
}

/// The role of a message in the agent's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
    /// System instructions or synthetic triggers (scheduler, reminders)
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A normalized message arriving from any channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The agent this message is addressed to
    pub agent_id: String,

    /// Channel name (e.g. "telegram", "web", "console")
    pub channel: String,

    /// Transport-level sender identity
    pub sender_id: String,

    /// Transport-level conversation identity
    pub chat_id: String,

    /// The text content
    pub content: String,

    /// Transport message id, when the channel has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// When the message was received
    pub timestamp: DateTime<Utc>,

    /// Channel-specific extras (usernames, update ids, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
}

impl InboundMessage {
    pub fn new(
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            message_id: None,
            timestamp: now_seconds(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Addressing key for transport routing. History stays agent-wide.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A message leaving the agent towards a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub agent_id: String,
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
}

impl OutboundMessage {
    pub fn new(
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            message_id: Uuid::new_v4().to_string(),
            reply_to_message_id: None,
            timestamp: now_seconds(),
            metadata: Metadata::new(),
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_message_id = Some(message_id.into());
        self
    }
}

/// A persisted entry of an agent's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}
