//! Scheduled jobs: instructions an agent runs on its own at a set time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Once,
    Recurring,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Once => "once",
            JobType::Recurring => "recurring",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(JobType::Once),
            "recurring" => Ok(JobType::Recurring),
            other => Err(format!("unknown job type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Paused,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(JobStatus::Active),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// A persisted scheduled job.
///
/// `cron_expr` is set iff `job_type` is [`JobType::Recurring`]. While the job
/// is active, `next_run_at` is its next fire time; completed jobs carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub agent_id: String,
    pub description: String,
    /// Delivered to the agent as a system turn when the job fires
    pub instruction: String,
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expr: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScheduledJob {
    pub agent_id: String,
    pub description: String,
    pub instruction: String,
    pub job_type: JobType,
    pub cron_expr: Option<String>,
    pub next_run_at: DateTime<Utc>,
}

impl NewScheduledJob {
    /// Check the type/cron pairing and that text fields are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_id.trim().is_empty() {
            return Err("agent_id must not be empty".into());
        }
        if self.instruction.trim().is_empty() {
            return Err("instruction must not be empty".into());
        }
        match (self.job_type, self.cron_expr.as_deref()) {
            (JobType::Once, None) => Ok(()),
            (JobType::Once, Some(_)) => Err("one-time jobs must not carry a cron expression".into()),
            (JobType::Recurring, Some(expr)) if !expr.trim().is_empty() => Ok(()),
            (JobType::Recurring, _) => Err("recurring jobs require a cron expression".into()),
        }
    }
}
