//! SQLite store.
//!
//! One database file holds every table the runtime needs:
//! - `agents` / `agent_channels`: identities and their channel bindings
//! - `messages`: the per-agent log, ordered by `(timestamp, rowid)`
//! - `memories`: named knowledge, unique per agent
//! - `scheduled_jobs`: one-time and cron jobs
//!
//! Timestamps are stored as unix seconds.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use switchyard_core::agent::{AgentChannelRecord, AgentRecord, AgentStatus};
use switchyard_core::error::StoreError;
use switchyard_core::job::{JobStatus, JobType, NewScheduledJob, ScheduledJob};
use switchyard_core::memory::{MemoryRecord, MemoryUpsert};
use switchyard_core::message::{MessageRecord, Metadata, Role, now_seconds};
use switchyard_core::store::Store;
use tracing::{debug, info};
use uuid::Uuid;

/// Rows deleted per statement, well under SQLite's bound-parameter limit.
const DELETE_CHUNK: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `":memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives and dies with its connection.
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path, "SQLite store initialized");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 10] = [
            (
                "agents table",
                r#"
                CREATE TABLE IF NOT EXISTS agents (
                    id          TEXT PRIMARY KEY,
                    name        TEXT NOT NULL UNIQUE,
                    persona     TEXT NOT NULL DEFAULT '',
                    status      TEXT NOT NULL DEFAULT 'active',
                    created_at  INTEGER NOT NULL,
                    updated_at  INTEGER NOT NULL,
                    CHECK (status IN ('active', 'paused', 'deleted'))
                )
                "#,
            ),
            (
                "agent_channels table",
                r#"
                CREATE TABLE IF NOT EXISTS agent_channels (
                    agent_id    TEXT NOT NULL,
                    channel     TEXT NOT NULL,
                    enabled     INTEGER NOT NULL DEFAULT 1,
                    config_json TEXT NOT NULL DEFAULT '{}',
                    updated_at  INTEGER NOT NULL,
                    PRIMARY KEY (agent_id, channel),
                    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    id          TEXT PRIMARY KEY,
                    agent_id    TEXT NOT NULL,
                    timestamp   INTEGER NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    meta_json   TEXT NOT NULL DEFAULT '{}',
                    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE,
                    CHECK (role IN ('user', 'assistant', 'tool', 'system'))
                )
                "#,
            ),
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    id          TEXT PRIMARY KEY,
                    agent_id    TEXT NOT NULL,
                    name        TEXT NOT NULL,
                    summary     TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    strength    INTEGER NOT NULL,
                    created_at  INTEGER NOT NULL,
                    updated_at  INTEGER NOT NULL,
                    meta_json   TEXT NOT NULL DEFAULT '{}',
                    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE,
                    CHECK (strength >= 0 AND strength <= 5),
                    UNIQUE (agent_id, name)
                )
                "#,
            ),
            (
                "scheduled_jobs table",
                r#"
                CREATE TABLE IF NOT EXISTS scheduled_jobs (
                    id          TEXT PRIMARY KEY,
                    agent_id    TEXT NOT NULL,
                    description TEXT NOT NULL,
                    instruction TEXT NOT NULL,
                    job_type    TEXT NOT NULL,
                    cron_expr   TEXT,
                    next_run_at INTEGER,
                    last_run_at INTEGER,
                    status      TEXT NOT NULL DEFAULT 'active',
                    created_at  INTEGER NOT NULL,
                    updated_at  INTEGER NOT NULL,
                    FOREIGN KEY (agent_id) REFERENCES agents(id) ON DELETE CASCADE,
                    CHECK (job_type IN ('once', 'recurring')),
                    CHECK (status IN ('active', 'paused', 'completed'))
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_agent_ts ON messages(agent_id, timestamp)",
            ),
            (
                "memories index",
                "CREATE INDEX IF NOT EXISTS idx_memories_agent_updated ON memories(agent_id, updated_at)",
            ),
            (
                "agent_channels index",
                "CREATE INDEX IF NOT EXISTS idx_agent_channels_channel ON agent_channels(channel, enabled)",
            ),
            (
                "jobs due index",
                "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_due ON scheduled_jobs(next_run_at) WHERE status = 'active'",
            ),
            (
                "jobs agent index",
                "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_agent ON scheduled_jobs(agent_id)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }
}

// --- Row helpers ---

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::InvalidRecord(format!("timestamp out of range: {secs}")))
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse().map_err(StoreError::InvalidRecord)
}

fn encode_metadata(metadata: &Metadata) -> Result<String, StoreError> {
    serde_json::to_string(metadata)
        .map_err(|e| StoreError::InvalidRecord(format!("metadata encode: {e}")))
}

fn decode_metadata(raw: &str) -> Metadata {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Metadata::new(),
    }
}

fn query_err(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::QueryFailed(format!("{context}: {e}"))
}

fn row_to_agent(row: &SqliteRow) -> Result<AgentRecord, StoreError> {
    let status: String = col(row, "status")?;
    Ok(AgentRecord {
        id: col(row, "id")?,
        name: col(row, "name")?,
        persona: col(row, "persona")?,
        status: parse_enum(&status)?,
        created_at: from_ts(col(row, "created_at")?)?,
        updated_at: from_ts(col(row, "updated_at")?)?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    let role: String = col(row, "role")?;
    let meta: String = col(row, "meta_json")?;
    Ok(MessageRecord {
        id: col(row, "id")?,
        agent_id: col(row, "agent_id")?,
        timestamp: from_ts(col(row, "timestamp")?)?,
        role: parse_enum::<Role>(&role)?,
        content: col(row, "content")?,
        metadata: decode_metadata(&meta),
    })
}

fn row_to_memory(row: &SqliteRow) -> Result<MemoryRecord, StoreError> {
    let strength: i64 = col(row, "strength")?;
    let meta: String = col(row, "meta_json")?;
    Ok(MemoryRecord {
        id: col(row, "id")?,
        agent_id: col(row, "agent_id")?,
        name: col(row, "name")?,
        summary: col(row, "summary")?,
        content: col(row, "content")?,
        strength: u8::try_from(strength)
            .map_err(|_| StoreError::InvalidRecord(format!("strength {strength}")))?,
        updated_at: from_ts(col(row, "updated_at")?)?,
        metadata: decode_metadata(&meta),
    })
}

fn row_to_job(row: &SqliteRow) -> Result<ScheduledJob, StoreError> {
    let job_type: String = col(row, "job_type")?;
    let status: String = col(row, "status")?;
    let next_run_at: Option<i64> = col(row, "next_run_at")?;
    let last_run_at: Option<i64> = col(row, "last_run_at")?;
    Ok(ScheduledJob {
        id: col(row, "id")?,
        agent_id: col(row, "agent_id")?,
        description: col(row, "description")?,
        instruction: col(row, "instruction")?,
        job_type: parse_enum::<JobType>(&job_type)?,
        cron_expr: col(row, "cron_expr")?,
        next_run_at: next_run_at.map(from_ts).transpose()?,
        last_run_at: last_run_at.map(from_ts).transpose()?,
        status: parse_enum::<JobStatus>(&status)?,
        created_at: from_ts(col(row, "created_at")?)?,
        updated_at: from_ts(col(row, "updated_at")?)?,
    })
}

const JOB_COLUMNS: &str = "id, agent_id, description, instruction, job_type, cron_expr, \
     next_run_at, last_run_at, status, created_at, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn create_agent(&self, name: &str, persona: &str) -> Result<AgentRecord, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidRecord("agent name must not be empty".into()));
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
        sqlx::query(
            "INSERT INTO agents (id, name, persona, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.persona)
        .bind(record.status.as_str())
        .bind(to_ts(now))
        .bind(to_ts(now))
        .execute(&self.pool)
        .await
        .map_err(query_err("create agent"))?;
        Ok(record)
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, persona, status, created_at, updated_at FROM agents WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("get agent"))?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, persona, status, created_at, updated_at FROM agents
             ORDER BY created_at, name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list agents"))?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn set_agent_status(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_ts(now_seconds()))
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(query_err("set agent status"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_agent_channel(
        &self,
        agent_id: &str,
        channel: &str,
        enabled: bool,
        config: serde_json::Value,
    ) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(&config)
            .map_err(|e| StoreError::InvalidRecord(format!("channel config: {e}")))?;
        sqlx::query(
            "INSERT INTO agent_channels (agent_id, channel, enabled, config_json, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(agent_id, channel) DO UPDATE SET
                enabled = excluded.enabled,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at",
        )
        .bind(agent_id)
        .bind(channel)
        .bind(enabled)
        .bind(config_json)
        .bind(to_ts(now_seconds()))
        .execute(&self.pool)
        .await
        .map_err(query_err("upsert agent channel"))?;
        Ok(())
    }

    async fn list_enabled_agent_channels(
        &self,
        channel: &str,
    ) -> Result<Vec<AgentChannelRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT c.agent_id, c.channel, c.enabled, c.config_json, c.updated_at
             FROM agent_channels c JOIN agents a ON a.id = c.agent_id
             WHERE c.channel = ? AND c.enabled = 1 AND a.status != 'deleted'
             ORDER BY c.agent_id",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list agent channels"))?;

        rows.iter()
            .map(|row| {
                let config_json: String = col(row, "config_json")?;
                Ok(AgentChannelRecord {
                    agent_id: col(row, "agent_id")?,
                    channel: col(row, "channel")?,
                    enabled: col(row, "enabled")?,
                    config: serde_json::from_str(&config_json)
                        .unwrap_or(serde_json::Value::Object(Default::default())),
                    updated_at: from_ts(col(row, "updated_at")?)?,
                })
            })
            .collect()
    }

    async fn list_messages_ordered(
        &self,
        agent_id: &str,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, timestamp, role, content, meta_json FROM messages
             WHERE agent_id = ? ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list messages"))?;
        rows.iter().map(row_to_message).collect()
    }

    async fn add_message(
        &self,
        agent_id: &str,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
        metadata: &Metadata,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO messages (id, agent_id, timestamp, role, content, meta_json)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(agent_id)
        .bind(to_ts(timestamp))
        .bind(role.as_str())
        .bind(content)
        .bind(encode_metadata(metadata)?)
        .execute(&self.pool)
        .await
        .map_err(query_err("add message"))?;
        Ok(id)
    }

    async fn delete_messages(&self, agent_id: &str, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_err("begin delete"))?;
        let mut removed = 0u64;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql =
                format!("DELETE FROM messages WHERE agent_id = ? AND id IN ({placeholders})");
            let mut query = sqlx::query(&sql).bind(agent_id);
            for id in chunk {
                query = query.bind(id);
            }
            removed += query
                .execute(&mut *tx)
                .await
                .map_err(query_err("delete messages"))?
                .rows_affected();
        }
        tx.commit().await.map_err(query_err("commit delete"))?;
        Ok(removed as usize)
    }

    async fn upsert_memory(
        &self,
        agent_id: &str,
        memory: &MemoryUpsert,
    ) -> Result<String, StoreError> {
        let row = sqlx::query(
            "INSERT INTO memories (id, agent_id, name, summary, content, strength, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(agent_id, name) DO UPDATE SET
                summary = excluded.summary,
                content = excluded.content,
                strength = excluded.strength,
                updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(agent_id)
        .bind(memory.name.trim())
        .bind(memory.summary.trim())
        .bind(memory.content.trim())
        .bind(i64::from(memory.clamped_strength()))
        .bind(to_ts(memory.updated_at))
        .bind(to_ts(memory.updated_at))
        .fetch_one(&self.pool)
        .await
        .map_err(query_err("upsert memory"))?;
        col(&row, "id")
    }

    async fn get_memory(
        &self,
        agent_id: &str,
        name: &str,
    ) -> Result<Option<MemoryRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, agent_id, name, summary, content, strength, updated_at, meta_json
             FROM memories WHERE agent_id = ? AND name = ?",
        )
        .bind(agent_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err("get memory"))?;
        row.as_ref().map(row_to_memory).transpose()
    }

    async fn list_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, name, summary, content, strength, updated_at, meta_json
             FROM memories WHERE agent_id = ? ORDER BY updated_at DESC, name",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list memories"))?;
        rows.iter().map(row_to_memory).collect()
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
            next_run_at: Some(job.next_run_at),
            last_run_at: None,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(&format!(
            "INSERT INTO scheduled_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)"
        ))
        .bind(&record.id)
        .bind(&record.agent_id)
        .bind(&record.description)
        .bind(&record.instruction)
        .bind(record.job_type.as_str())
        .bind(&record.cron_expr)
        .bind(to_ts(job.next_run_at))
        .bind(record.status.as_str())
        .bind(to_ts(now))
        .bind(to_ts(now))
        .execute(&self.pool)
        .await
        .map_err(query_err("create job"))?;
        Ok(record)
    }

    async fn list_jobs(&self, agent_id: &str) -> Result<Vec<ScheduledJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE agent_id = ?
             ORDER BY next_run_at IS NULL, next_run_at, created_at"
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("list jobs"))?;
        rows.iter().map(row_to_job).collect()
    }

    async fn get_due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs
             WHERE status = 'active' AND next_run_at IS NOT NULL AND next_run_at <= ?
             ORDER BY next_run_at ASC, created_at ASC"
        ))
        .bind(to_ts(now))
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("get due jobs"))?;
        rows.iter().map(row_to_job).collect()
    }

    async fn update_job_after_run(
        &self,
        job_id: &str,
        next_run_at: Option<DateTime<Utc>>,
        status: JobStatus,
        last_run_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs
             SET next_run_at = ?, status = ?, last_run_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(next_run_at.map(to_ts))
        .bind(status.as_str())
        .bind(to_ts(last_run_at))
        .bind(to_ts(now_seconds()))
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(query_err("update job"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("scheduled job {job_id}")));
        }
        Ok(())
    }

    async fn delete_job(&self, agent_id: &str, job_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scheduled_jobs WHERE agent_id = ? AND id = ?")
            .bind(agent_id)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(query_err("delete job"))?;
        Ok(result.rows_affected() > 0)
    }
}
