//! Due-job poller.
//!
//! Every tick fetches the active jobs whose `next_run_at` has passed and
//! runs each as a system turn for its agent. Jobs of one tick run
//! concurrently; the turn runner still serializes jobs of the same agent.
//! A failing job is logged and still advanced, so it cannot wedge the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use switchyard_agent::{TurnRequest, TurnRunner};
use switchyard_core::job::{JobStatus, JobType, ScheduledJob};
use switchyard_core::message::Metadata;
use switchyard_core::store::Store;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cron::CronExpr;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    store: Arc<dyn Store>,
    runner: Arc<TurnRunner>,
}

pub struct SchedulerWorker {
    inner: Arc<Inner>,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl SchedulerWorker {
    pub fn new(store: Arc<dyn Store>, runner: Arc<TurnRunner>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner { store, runner }),
            poll_interval: poll_interval.max(Duration::from_millis(100)),
            running: Mutex::new(None),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            self.poll_interval,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, task });
        info!(poll_interval_secs = self.poll_interval.as_secs_f64(), "Scheduler started");
    }

    /// Stop polling. A tick in progress is cancelled with its turns.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!(error = %e, "Scheduler loop ended abnormally");
        }
        info!("Scheduler stopped");
    }

    /// Run everything due right now; returns how many jobs were picked up.
    pub async fn tick(&self) -> usize {
        self.inner.tick().await
    }
}

async fn poll_loop(inner: Arc<Inner>, poll_interval: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = inner.tick() => {}
        }
    }
}

impl Inner {
    async fn tick(&self) -> usize {
        let now = Utc::now();
        let due = match self.store.get_due_jobs(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Could not load due jobs");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }

        info!(due = due.len(), "Running due jobs");
        join_all(due.iter().map(|job| self.execute(job))).await;
        due.len()
    }

    async fn execute(&self, job: &ScheduledJob) {
        let started = Utc::now();
        debug!(job_id = %job.id, agent_id = %job.agent_id, description = %job.description, "Executing job");

        match self.store.get_agent(&job.agent_id).await {
            Ok(Some(agent)) if !agent.is_deleted() => {}
            Ok(_) => {
                warn!(job_id = %job.id, agent_id = %job.agent_id, "Agent gone, deleting job");
                if let Err(e) = self.store.delete_job(&job.agent_id, &job.id).await {
                    error!(job_id = %job.id, error = %e, "Could not delete orphaned job");
                }
                return;
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Could not load job agent");
                return;
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), "scheduler".into());
        metadata.insert("job_id".into(), job.id.clone().into());
        let request = TurnRequest::system(&job.agent_id, &job.instruction).with_metadata(metadata);

        match self.runner.run(request).await {
            Ok(reply) => debug!(job_id = %job.id, chars = reply.chars().count(), "Job turn finished"),
            Err(e) => error!(job_id = %job.id, agent_id = %job.agent_id, error = %e, "Job turn failed"),
        }

        let (next_run_at, status) = match job.job_type {
            JobType::Once => (None, JobStatus::Completed),
            JobType::Recurring => next_recurring_run(job),
        };

        if let Err(e) = self
            .store
            .update_job_after_run(&job.id, next_run_at, status, started)
            .await
        {
            error!(job_id = %job.id, error = %e, "Could not record job run");
            return;
        }

        match next_run_at {
            Some(next) => info!(job_id = %job.id, next_run_at = %next, "Job rescheduled"),
            None => info!(job_id = %job.id, status = status.as_str(), "Job finished"),
        }
    }
}

/// Next fire strictly after the moment the run finished; fires missed
/// while the turn ran are skipped.
fn next_recurring_run(job: &ScheduledJob) -> (Option<DateTime<Utc>>, JobStatus) {
    let Some(expr) = job.cron_expr.as_deref() else {
        warn!(job_id = %job.id, "Recurring job has no cron expression, pausing");
        return (None, JobStatus::Paused);
    };
    match CronExpr::parse(expr) {
        Ok(cron) => match cron.next_after(Utc::now()) {
            Some(next) => (Some(next), JobStatus::Active),
            None => {
                warn!(job_id = %job.id, cron = %expr, "Cron expression never fires again");
                (None, JobStatus::Completed)
            }
        },
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "Stored cron expression is invalid, pausing");
            (None, JobStatus::Paused)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use switchyard_agent::RunnerSettings;
    use switchyard_core::agent::AgentStatus;
    use switchyard_core::error::ExecutorError;
    use switchyard_core::executor::{AgentExecutor, ExecutionRequest};
    use switchyard_core::job::NewScheduledJob;
    use switchyard_core::message::Role;
    use switchyard_store::InMemoryStore;

    struct Echo;

    #[async_trait]
    impl AgentExecutor for Echo {
        async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
            let last = request.pending.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("did: {last}"))
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentExecutor for Broken {
        async fn execute(&self, _request: ExecutionRequest) -> Result<String, ExecutorError> {
            Err(ExecutorError::Network("unreachable".into()))
        }
    }

    fn worker(store: Arc<InMemoryStore>, executor: Arc<dyn AgentExecutor>) -> SchedulerWorker {
        let runner =
            Arc::new(TurnRunner::new(store.clone(), executor, RunnerSettings::default()).unwrap());
        SchedulerWorker::new(store, runner, DEFAULT_POLL_INTERVAL)
    }

    async fn due_job(
        store: &InMemoryStore,
        agent_id: &str,
        job_type: JobType,
        cron: Option<&str>,
    ) -> ScheduledJob {
        store
            .create_job(&NewScheduledJob {
                agent_id: agent_id.into(),
                description: "test".into(),
                instruction: "send the report".into(),
                job_type,
                cron_expr: cron.map(String::from),
                next_run_at: Utc::now() - TimeDelta::minutes(1),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn one_time_job_runs_as_system_turn_and_completes() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let job = due_job(&store, &agent.id, JobType::Once, None).await;

        let scheduler = worker(store.clone(), Arc::new(Echo));
        assert_eq!(scheduler.tick().await, 1);

        let log = store.list_messages_ordered(&agent.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].role, Role::System);
        assert_eq!(log[0].content, "send the report");
        assert_eq!(log[0].metadata["source"], "scheduler");
        assert_eq!(log[0].metadata["job_id"], job.id.as_str());
        assert_eq!(log[1].content, "did: send the report");

        let stored = &store.list_jobs(&agent.id).await.unwrap()[0];
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.next_run_at.is_none());
        assert!(stored.last_run_at.is_some());
        assert_eq!(scheduler.tick().await, 0);
    }

    #[tokio::test]
    async fn recurring_job_is_rescheduled_into_the_future() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        due_job(&store, &agent.id, JobType::Recurring, Some("*/5 * * * *")).await;

        let scheduler = worker(store.clone(), Arc::new(Echo));
        let before = Utc::now();
        scheduler.tick().await;

        let stored = &store.list_jobs(&agent.id).await.unwrap()[0];
        assert_eq!(stored.status, JobStatus::Active);
        let next = stored.next_run_at.unwrap();
        assert!(next > before);
        assert!(next <= before + TimeDelta::minutes(5));
    }

    #[tokio::test]
    async fn failed_turn_still_advances_job() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        due_job(&store, &agent.id, JobType::Once, None).await;

        let scheduler = worker(store.clone(), Arc::new(Broken));
        scheduler.tick().await;

        let stored = &store.list_jobs(&agent.id).await.unwrap()[0];
        assert_eq!(stored.status, JobStatus::Completed);
        let log = store.list_messages_ordered(&agent.id).await.unwrap();
        assert!(log.last().unwrap().content.starts_with("Error while processing your message"));
    }

    #[tokio::test]
    async fn job_of_deleted_agent_is_removed() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Gone", "").await.unwrap();
        due_job(&store, &agent.id, JobType::Once, None).await;
        store.set_agent_status(&agent.id, AgentStatus::Deleted).await.unwrap();

        let scheduler = worker(store.clone(), Arc::new(Echo));
        scheduler.tick().await;
        assert!(store.list_jobs(&agent.id).await.unwrap().is_empty());
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn bad_cron_in_store_pauses_job() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        due_job(&store, &agent.id, JobType::Recurring, Some("not a cron")).await;

        worker(store.clone(), Arc::new(Echo)).tick().await;
        let stored = &store.list_jobs(&agent.id).await.unwrap()[0];
        assert_eq!(stored.status, JobStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_lifecycle() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = worker(store, Arc::new(Echo));
        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);
        tokio::time::sleep(Duration::from_secs(65)).await;
        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }
}
