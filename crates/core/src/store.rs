//! Store trait: the persistence boundary of the pipeline.
//!
//! The dispatch core only needs a handful of operations (agent lookup,
//! ordered message log, memory upsert, due jobs); the remaining methods
//! serve the CLI and channel bootstrapping. Implementations live in
//! `switchyard-store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::agent::{AgentChannelRecord, AgentRecord, AgentStatus};
use crate::error::StoreError;
use crate::job::{JobStatus, NewScheduledJob, ScheduledJob};
use crate::memory::{MemoryRecord, MemoryUpsert};
use crate::message::{MessageRecord, Metadata, Role};

#[async_trait]
pub trait Store: Send + Sync {
    // --- Agents ---

    /// Create a new active agent. Names are unique.
    async fn create_agent(&self, name: &str, persona: &str) -> Result<AgentRecord, StoreError>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError>;

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError>;

    /// Returns `false` if the agent does not exist.
    async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, StoreError>;

    // --- Channel bindings ---

    async fn upsert_agent_channel(
        &self,
        agent_id: &str,
        channel: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn list_enabled_agent_channels(
        &self,
        channel: &str,
    ) -> Result<Vec<AgentChannelRecord>, StoreError>;

    // --- Message log ---

    /// All messages of an agent ordered by `(timestamp, insertion order)`.
    async fn list_messages_ordered(&self, agent_id: &str)
    -> Result<Vec<MessageRecord>, StoreError>;

    /// Append a message and return its id.
    async fn add_message(
        &self,
        agent_id: &str,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
        metadata: &Metadata,
    ) -> Result<String, StoreError>;

    /// Delete the given messages of an agent, returning how many were removed.
    async fn delete_messages(&self, agent_id: &str, ids: &[String]) -> Result<usize, StoreError>;

    // --- Memories ---

    /// Insert or replace the memory named `memory.name`; returns its id.
    async fn upsert_memory(&self, agent_id: &str, memory: &MemoryUpsert)
    -> Result<String, StoreError>;

    async fn get_memory(&self, agent_id: &str, name: &str)
    -> Result<Option<MemoryRecord>, StoreError>;

    async fn list_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, StoreError>;

    // --- Scheduled jobs ---

    async fn create_job(&self, job: &NewScheduledJob) -> Result<ScheduledJob, StoreError>;

    async fn list_jobs(&self, agent_id: &str) -> Result<Vec<ScheduledJob>, StoreError>;

    /// Active jobs whose `next_run_at <= now`, earliest first.
    async fn get_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError>;

    async fn update_job_after_run(
        &self,
        job_id: &str,
        next_run_at: Option<DateTime<Utc>>,
        status: JobStatus,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Returns `false` if no such job existed for the agent.
    async fn delete_job(&self, agent_id: &str, job_id: &str) -> Result<bool, StoreError>;
}
