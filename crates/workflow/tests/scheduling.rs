//! Scheduler against a real SQLite store: plan jobs, make them due, tick.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use switchyard_agent::{RunnerSettings, TurnRunner};
use switchyard_core::error::ExecutorError;
use switchyard_core::executor::{AgentExecutor, ExecutionRequest};
use switchyard_core::job::{JobStatus, JobType, NewScheduledJob};
use switchyard_core::{Role, Store};
use switchyard_store::SqliteStore;
use switchyard_workflow::{JobPlanner, SchedulerWorker, parse_when_in};

/// Sleeps per call and tracks how many calls overlap.
struct Overlap {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl Overlap {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentExecutor for Overlap {
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.seen.lock().unwrap().push(request.agent_id.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("ok".into())
    }
}

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new(":memory:").await.unwrap())
}

fn scheduler(store: Arc<SqliteStore>, executor: Arc<dyn AgentExecutor>) -> SchedulerWorker {
    let runner = Arc::new(TurnRunner::new(store.clone(), executor, RunnerSettings::default()).unwrap());
    SchedulerWorker::new(store, runner, Duration::from_secs(30))
}

fn overdue(agent_id: &str, instruction: &str) -> NewScheduledJob {
    NewScheduledJob {
        agent_id: agent_id.into(),
        description: instruction.into(),
        instruction: instruction.into(),
        job_type: JobType::Once,
        cron_expr: None,
        next_run_at: Utc::now() - TimeDelta::seconds(5),
    }
}

#[tokio::test]
async fn planned_jobs_are_not_due_until_their_time() {
    let store = store().await;
    let agent = store.create_agent("Ada", "").await.unwrap();
    let planner = JobPlanner::new(store.clone());

    let when = parse_when_in("in 2 hours", Utc::now()).unwrap();
    planner
        .schedule_once(&agent.id, "reminder", "stretch", when)
        .await
        .unwrap();
    planner
        .schedule_recurring(&agent.id, "digest", "summarize the inbox", "0 8 * * *")
        .await
        .unwrap();

    let executor = Arc::new(Overlap::new());
    let worker = scheduler(store.clone(), executor.clone());
    assert_eq!(worker.tick().await, 0);
    assert!(executor.seen.lock().unwrap().is_empty());

    let jobs = store.list_jobs(&agent.id).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Active));
}

#[tokio::test]
async fn due_jobs_of_different_agents_run_together() {
    let store = store().await;
    let a = store.create_agent("a", "").await.unwrap();
    let b = store.create_agent("b", "").await.unwrap();
    store.create_job(&overdue(&a.id, "one")).await.unwrap();
    store.create_job(&overdue(&b.id, "two")).await.unwrap();

    let executor = Arc::new(Overlap::new());
    let worker = scheduler(store.clone(), executor.clone());
    assert_eq!(worker.tick().await, 2);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn due_jobs_of_one_agent_never_overlap() {
    let store = store().await;
    let agent = store.create_agent("solo", "").await.unwrap();
    for instruction in ["first", "second", "third"] {
        store.create_job(&overdue(&agent.id, instruction)).await.unwrap();
    }

    let executor = Arc::new(Overlap::new());
    let worker = scheduler(store.clone(), executor.clone());
    assert_eq!(worker.tick().await, 3);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);

    let log = store.list_messages_ordered(&agent.id).await.unwrap();
    let roles: Vec<Role> = log.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            Role::System,
            Role::Assistant,
            Role::System,
            Role::Assistant,
            Role::System,
            Role::Assistant
        ]
    );
    let jobs = store.list_jobs(&agent.id).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
}
