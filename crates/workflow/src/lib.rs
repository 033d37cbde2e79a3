//! Scheduled work for Switchyard agents.
//!
//! Jobs are stored rows with a next fire time; the [`SchedulerWorker`]
//! polls for due rows and runs each as a system turn. Recurring jobs use a
//! standard five-field cron expression: `minute hour day-of-month month
//! day-of-week`. One-shot jobs can be given in loose human phrasing
//! through [`parse_when`].

pub mod cron;
pub mod jobs;
pub mod scheduler;
pub mod when;

pub use cron::{CronError, CronExpr};
pub use jobs::{JobError, JobPlanner};
pub use scheduler::{DEFAULT_POLL_INTERVAL, SchedulerWorker};
pub use when::{parse_when, parse_when_in};
