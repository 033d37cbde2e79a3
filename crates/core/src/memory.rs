//! Memory records: named, summarized knowledge owned by an agent.
//!
//! The compactor archives old conversation ranges into one memory each;
//! other memories are written by the agent's own tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Metadata;

/// Highest allowed memory strength.
pub const MAX_STRENGTH: u8 = 5;

/// A persisted memory. `name` is unique per agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub summary: String,
    pub content: String,
    /// Retention weight in `0..=5`
    pub strength: u8,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Insert-or-replace payload keyed by `(agent_id, name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryUpsert {
    pub name: String,
    pub summary: String,
    pub content: String,
    pub strength: u8,
    pub updated_at: DateTime<Utc>,
}

impl MemoryUpsert {
    /// Clamp strength into the allowed range.
    pub fn clamped_strength(&self) -> u8 {
        self.strength.min(MAX_STRENGTH)
    }
}
