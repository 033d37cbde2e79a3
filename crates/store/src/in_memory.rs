//! In-memory store: useful for testing and ephemeral sessions.
//!
//! Mirrors the SQLite semantics: messages sort by `(timestamp, insertion
//! sequence)`, memory names are unique per agent, and timestamps are kept
//! at whole-second resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchyard_core::agent::{AgentChannelRecord, AgentRecord, AgentStatus};
use switchyard_core::error::StoreError;
use switchyard_core::job::{JobStatus, NewScheduledJob, ScheduledJob};
use switchyard_core::memory::{MemoryRecord, MemoryUpsert};
use switchyard_core::message::{MessageRecord, Metadata, Role, now_seconds};
use switchyard_core::store::Store;
use tokio::sync::RwLock;
use uuid::Uuid;

fn truncate(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

#[derive(Default)]
struct Tables {
    agents: Vec<AgentRecord>,
    channels: Vec<AgentChannelRecord>,
    /// `(insertion sequence, record)`
    messages: Vec<(u64, MessageRecord)>,
    next_seq: u64,
    memories: HashMap<(String, String), MemoryRecord>,
    jobs: Vec<ScheduledJob>,
}

/// An in-memory store that keeps every table in a Vec or map.
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    /// Number of messages across all agents.
    pub async fn message_count(&self) -> usize {
        self.tables.read().await.messages.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_agent(&self, name: &str, persona: &str) -> Result<AgentRecord, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidRecord("agent name must not be empty".into()));
        }
        let mut tables = self.tables.write().await;
        if tables.agents.iter().any(|a| a.name == name) {
            return Err(StoreError::InvalidRecord(format!(
                "agent name '{name}' already exists"
            )));
        }
        let now = now_seconds();
        let record = AgentRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            persona: persona.trim().to_string(),
            status: AgentStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.agents.push(record.clone());
        Ok(record)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.agents.iter().find(|a| a.id == agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        Ok(self.tables.read().await.agents.clone())
    }

    async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.agents.iter_mut().find(|a| a.id == agent_id) {
            Some(agent) => {
                agent.status = status;
                agent.updated_at = now_seconds();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_agent_channel(
        &self,
        agent_id: &str,
        channel: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.agents.iter().any(|a| a.id == agent_id) {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }
        let record = AgentChannelRecord {
            agent_id: agent_id.to_string(),
            channel: channel.to_string(),
            enabled,
            config,
            updated_at: now_seconds(),
        };
        match tables
            .channels
            .iter_mut()
            .find(|c| c.agent_id == agent_id && c.channel == channel)
        {
            Some(existing) => *existing = record,
            None => tables.channels.push(record),
        }
        Ok(())
    }

    async fn list_enabled_agent_channels(
        &self,
        channel: &str,
    ) -> Result<Vec<AgentChannelRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .channels
            .iter()
            .filter(|c| c.channel == channel && c.enabled)
            .filter(|c| {
                tables
                    .agents
                    .iter()
                    .any(|a| a.id == c.agent_id && !a.is_deleted())
            })
            .cloned()
            .collect())
    }

    async fn list_messages_ordered(
        &self,
        agent_id: &str,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&(u64, MessageRecord)> = tables
            .messages
            .iter()
            .filter(|(_, m)| m.agent_id == agent_id)
            .collect();
        rows.sort_by_key(|(seq, m)| (m.timestamp, *seq));
        Ok(rows.into_iter().map(|(_, m)| m.clone()).collect())
    }

    async fn add_message(
        &self,
        agent_id: &str,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
        metadata: &Metadata,
    ) -> Result<String, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.agents.iter().any(|a| a.id == agent_id) {
            return Err(StoreError::NotFound(format!("agent {agent_id}")));
        }
        let id = Uuid::new_v4().to_string();
        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.messages.push((
            seq,
            MessageRecord {
                id: id.clone(),
                agent_id: agent_id.to_string(),
                timestamp: truncate(timestamp),
                role,
                content: content.to_string(),
                metadata: metadata.clone(),
            },
        ));
        Ok(id)
    }

    async fn delete_messages(&self, agent_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.messages.len();
        tables
            .messages
            .retain(|(_, m)| !(m.agent_id == agent_id && ids.contains(&m.id)));
        Ok(before - tables.messages.len())
    }

    async fn upsert_memory(
        &self,
        agent_id: &str,
        memory: &MemoryUpsert,
    ) -> Result<String, StoreError> {
        let mut tables = self.tables.write().await;
        let key = (agent_id.to_string(), memory.name.trim().to_string());
        let id = tables
            .memories
            .get(&key)
            .map(|m| m.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tables.memories.insert(
            key,
            MemoryRecord {
                id: id.clone(),
                agent_id: agent_id.to_string(),
                name: memory.name.trim().to_string(),
                summary: memory.summary.trim().to_string(),
                content: memory.content.trim().to_string(),
                strength: memory.clamped_strength(),
                updated_at: truncate(memory.updated_at),
                metadata: Metadata::new(),
            },
        );
        Ok(id)
    }

    async fn get_memory(
        &self,
        agent_id: &str,
        name: &str,
    ) -> Result<Option<MemoryRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .memories
            .get(&(agent_id.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<MemoryRecord> = tables
            .memories
            .values()
            .filter(|m| m.agent_id == agent_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn create_job(&self, job: &NewScheduledJob) -> Result<ScheduledJob, StoreError> {
        job.validate().map_err(StoreError::InvalidRecord)?;
        let now = now_seconds();
        let record = ScheduledJob {
            id: Uuid::new_v4().to_string(),
            agent_id: job.agent_id.clone(),
            description: job.description.trim().to_string(),
            instruction: job.instruction.trim().to_string(),
            job_type: job.job_type,
            cron_expr: job.cron_expr.as_ref().map(|c| c.trim().to_string()),
            next_run_at: Some(truncate(job.next_run_at)),
            last_run_at: None,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.jobs.push(record.clone());
        Ok(record)
    }

    async fn list_jobs(&self, agent_id: &str) -> Result<Vec<ScheduledJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<ScheduledJob> = tables
            .jobs
            .iter()
            .filter(|j| j.agent_id == agent_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.next_run_at.is_none(), j.next_run_at, j.created_at));
        Ok(jobs)
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError> {
        let tables = self.tables.read().await;
        let mut due: Vec<ScheduledJob> = tables
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Active)
            .filter(|j| j.next_run_at.is_some_and(|at| at <= now))
            .cloned()
            .collect();
        due.sort_by_key(|j| (j.next_run_at, j.created_at));
        Ok(due)
    }

    async fn update_job_after_run(
        &self,
        job_id: &str,
        next_run_at: Option<DateTime<Utc>>,
        status: JobStatus,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| StoreError::NotFound(format!("scheduled job {job_id}")))?;
        job.next_run_at = next_run_at.map(truncate);
        job.status = status;
        job.last_run_at = Some(truncate(last_run_at));
        job.updated_at = now_seconds();
        Ok(())
    }

    async fn delete_job(&self, agent_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.jobs.len();
        tables
            .jobs
            .retain(|j| !(j.agent_id == agent_id && j.id == job_id));
        Ok(tables.jobs.len() < before)
    }
}
