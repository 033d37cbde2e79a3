//! Creating scheduled jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use switchyard_core::error::StoreError;
use switchyard_core::job::{JobType, NewScheduledJob, ScheduledJob};
use switchyard_core::store::Store;
use thiserror::Error;
use tracing::info;

use crate::cron::{CronError, CronExpr};

/// Longest description derived from an instruction.
const DERIVED_DESCRIPTION_CHARS: usize = 40;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error("Scheduled time must be in the future")]
    NotInFuture,

    #[error("Invalid cron expression: {0}")]
    InvalidCron(#[from] CronError),

    #[error("Cron expression '{0}' never fires")]
    NeverFires(String),

    #[error("Invalid job: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct JobPlanner {
    store: Arc<dyn Store>,
}

impl JobPlanner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Schedule `instruction` to run once at `when`.
    pub async fn schedule_once(
        &self,
        agent_id: &str,
        description: &str,
        instruction: &str,
        when: DateTime<Utc>,
    ) -> Result<ScheduledJob, JobError> {
        if when <= Utc::now() {
            return Err(JobError::NotInFuture);
        }
        self.create(agent_id, description, instruction, JobType::Once, None, when)
            .await
    }

    /// Schedule `instruction` on a cron expression; the first run is the
    /// next matching minute.
    pub async fn schedule_recurring(
        &self,
        agent_id: &str,
        description: &str,
        instruction: &str,
        cron_expr: &str,
    ) -> Result<ScheduledJob, JobError> {
        let expr = CronExpr::parse(cron_expr)?;
        let first = expr
            .next_after(Utc::now())
            .ok_or_else(|| JobError::NeverFires(expr.to_string()))?;
        self.create(
            agent_id,
            description,
            instruction,
            JobType::Recurring,
            Some(expr.to_string()),
            first,
        )
        .await
    }

    async fn create(
        &self,
        agent_id: &str,
        description: &str,
        instruction: &str,
        job_type: JobType,
        cron_expr: Option<String>,
        next_run_at: DateTime<Utc>,
    ) -> Result<ScheduledJob, JobError> {
        match self.store.get_agent(agent_id).await? {
            Some(agent) if !agent.is_deleted() => {}
            _ => return Err(JobError::AgentNotFound(agent_id.to_string())),
        }

        let instruction = instruction.trim();
        let new_job = NewScheduledJob {
            agent_id: agent_id.to_string(),
            description: describe(description, instruction),
            instruction: instruction.to_string(),
            job_type,
            cron_expr,
            next_run_at,
        };
        new_job.validate().map_err(JobError::Invalid)?;

        let job = self.store.create_job(&new_job).await?;
        info!(
            job_id = %job.id,
            agent_id = %job.agent_id,
            job_type = job.job_type.as_str(),
            next_run_at = %next_run_at,
            "Scheduled job"
        );
        Ok(job)
    }
}

/// A blank description falls back to the start of the instruction.
fn describe(description: &str, instruction: &str) -> String {
    let description = description.trim();
    if !description.is_empty() {
        return description.to_string();
    }
    let derived: String = instruction.chars().take(DERIVED_DESCRIPTION_CHARS).collect();
    if derived.is_empty() {
        "scheduled_task".into()
    } else {
        derived
    }
}
