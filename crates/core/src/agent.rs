//! Agent records and per-agent channel bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Active,
    Paused,
    Deleted,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Deleted => "deleted",
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "paused" => Ok(AgentStatus::Paused),
            "deleted" => Ok(AgentStatus::Deleted),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

/// A persistent agent: one identity, one continuous message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,

    /// Unique human-readable name
    pub name: String,

    /// Free-form persona appended to the system prompt
    #[serde(default)]
    pub persona: String,

    #[serde(default)]
    pub status: AgentStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn is_deleted(&self) -> bool {
        self.status == AgentStatus::Deleted
    }
}

/// Binding of an agent to a channel, with channel-specific JSON config
/// (for Telegram: bot token, allow-list, polling knobs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChannelRecord {
    pub agent_id: String,
    pub channel: String,
    pub enabled: bool,
    #[serde(default)]
    pub config: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
