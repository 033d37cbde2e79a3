//! Turn execution, serialized per agent.
//!
//! A turn takes the agent's lock, compacts the log if needed, selects the
//! recent window, runs the executor and persists the system, user and
//! assistant messages in that order. Turns for different agents run in
//! parallel; turns for the same agent never overlap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use switchyard_core::agent::AgentRecord;
use switchyard_core::error::{CompactionError, TurnError};
use switchyard_core::executor::{AgentExecutor, ChatTurn, ExecutionRequest};
use switchyard_core::message::{InboundMessage, Metadata, Role, now_seconds};
use switchyard_core::store::Store;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::context::{
    CompactionSettings, ContextCompactor, DEFAULT_TOKEN_BUDGET, TokenCounter, counter_for,
    select_recent,
};
use crate::prompt::build_system_prompt;

/// Inputs of one turn. At least one of `user_input` and `system_input`
/// must be non-blank.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub agent_id: String,
    pub user_input: Option<String>,
    pub system_input: Option<String>,
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub sender_id: Option<String>,
    pub metadata: Metadata,
}

impl TurnRequest {
    pub fn user(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            user_input: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn system(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            system_input: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_origin(
        mut self,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
    ) -> Self {
        self.channel = Some(channel.into());
        self.chat_id = Some(chat_id.into());
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Metadata stored on every message of the turn: caller metadata plus
    /// the non-empty origin fields.
    fn event_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        for (key, value) in [
            ("channel", &self.channel),
            ("chat_id", &self.chat_id),
            ("sender_id", &self.sender_id),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                metadata.insert(key.into(), value.into());
            }
        }
        metadata
    }
}

impl From<&InboundMessage> for TurnRequest {
    fn from(message: &InboundMessage) -> Self {
        TurnRequest::user(&message.agent_id, &message.content)
            .with_origin(&message.channel, &message.chat_id, &message.sender_id)
            .with_metadata(message.metadata.clone())
    }
}

fn non_blank(text: &Option<String>) -> Option<&str> {
    text.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

/// Context limits for the runner.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub token_budget: usize,
    pub token_model: String,
    pub compaction: CompactionSettings,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            token_model: "cl100k_base".into(),
            compaction: CompactionSettings::default(),
        }
    }
}

impl From<&switchyard_config::ContextConfig> for RunnerSettings {
    fn from(config: &switchyard_config::ContextConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            token_model: config.token_model.clone(),
            compaction: CompactionSettings::from(config),
        }
    }
}

pub struct TurnRunner {
    store: Arc<dyn Store>,
    executor: Arc<dyn AgentExecutor>,
    counter: Arc<dyn TokenCounter>,
    compactor: ContextCompactor,
    token_budget: usize,
    locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TurnRunner {
    pub fn new(
        store: Arc<dyn Store>,
        executor: Arc<dyn AgentExecutor>,
        settings: RunnerSettings,
    ) -> Result<Self, CompactionError> {
        let counter = counter_for(&settings.token_model);
        let compactor = ContextCompactor::new(Arc::clone(&counter), settings.compaction)?;
        Ok(Self {
            store,
            executor,
            counter,
            compactor,
            token_budget: settings.token_budget.max(1),
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// The agent's lock, created on first use and reused afterwards.
    fn lock_for_agent(&self, agent_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(agent_id.to_string()).or_default())
    }

    /// Execute one turn and return the assistant text (possibly empty).
    pub async fn run(&self, request: TurnRequest) -> Result<String, TurnError> {
        let preview: String = non_blank(&request.user_input)
            .or_else(|| non_blank(&request.system_input))
            .unwrap_or_default()
            .chars()
            .take(80)
            .collect();
        info!(
            agent_id = %request.agent_id,
            channel = ?request.channel,
            chat_id = ?request.chat_id,
            sender_id = ?request.sender_id,
            preview = %preview,
            "Message received"
        );

        if non_blank(&request.user_input).is_none() && non_blank(&request.system_input).is_none() {
            return Err(TurnError::InvalidInput);
        }

        // Unknown ids never get a lock entry.
        self.live_agent(&request.agent_id).await?;

        let lock = self.lock_for_agent(&request.agent_id);
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(agent_id = %request.agent_id, "Queued behind in-flight turn");
                lock.lock().await
            }
        };

        self.run_locked(&request).await
    }

    async fn live_agent(&self, agent_id: &str) -> Result<AgentRecord, TurnError> {
        match self.store.get_agent(agent_id).await? {
            Some(agent) if !agent.is_deleted() => Ok(agent),
            _ => Err(TurnError::AgentNotFound(agent_id.to_string())),
        }
    }

    async fn run_locked(&self, request: &TurnRequest) -> Result<String, TurnError> {
        let agent_id = request.agent_id.as_str();
        let started = Instant::now();

        // The agent may have been deleted while this turn was queued.
        let agent = self.live_agent(agent_id).await?;

        let t_compact = Instant::now();
        let compaction = self.compactor.compact_if_needed(self.store.as_ref(), agent_id).await?;
        debug!(
            agent_id = %agent_id,
            triggered = compaction.triggered,
            total_tokens = compaction.total_tokens_after,
            elapsed_ms = t_compact.elapsed().as_millis() as u64,
            "Compaction check done"
        );

        let records = self.store.list_messages_ordered(agent_id).await?;
        let history: Vec<ChatTurn> = select_recent(&records, self.counter.as_ref(), self.token_budget)
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| ChatTurn::new(r.role, r.content.clone()))
            .collect();
        debug!(agent_id = %agent_id, context_messages = history.len(), "Context built");

        let system_input = non_blank(&request.system_input);
        let user_input = non_blank(&request.user_input);

        let mut pending = Vec::with_capacity(2);
        if let Some(text) = system_input {
            pending.push(ChatTurn::system(text));
        }
        if let Some(text) = user_input {
            pending.push(ChatTurn::user(text));
        }

        let execution = ExecutionRequest {
            agent_id: agent_id.to_string(),
            system_prompt: build_system_prompt(&agent.name, &agent.persona),
            history,
            pending,
        };

        let t_exec = Instant::now();
        let outcome = self.executor.execute(execution).await;
        let exec_ms = t_exec.elapsed().as_millis() as u64;

        let metadata = request.event_metadata();
        let timestamp = now_seconds();
        if let Some(text) = system_input {
            self.store.add_message(agent_id, Role::System, text, timestamp, &metadata).await?;
        }
        if let Some(text) = user_input {
            self.store.add_message(agent_id, Role::User, text, timestamp, &metadata).await?;
        }

        match outcome {
            Ok(content) => {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    self.store
                        .add_message(agent_id, Role::Assistant, trimmed, timestamp, &metadata)
                        .await?;
                }
                info!(
                    agent_id = %agent_id,
                    total_ms = started.elapsed().as_millis() as u64,
                    executor_ms = exec_ms,
                    response_len = content.len(),
                    "Turn complete"
                );
                Ok(content)
            }
            Err(e) => {
                let error = TurnError::Executor(e);
                warn!(agent_id = %agent_id, executor_ms = exec_ms, error = %error, "Executor failed");
                self.store
                    .add_message(agent_id, Role::Assistant, &error.user_message(), timestamp, &metadata)
                    .await?;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedExecutor, SleepingExecutor};
    use std::time::Duration;
    use switchyard_core::error::ExecutorError;
    use switchyard_core::message::Role;
    use switchyard_store::InMemoryStore;

    fn runner(store: Arc<InMemoryStore>, executor: Arc<dyn AgentExecutor>) -> TurnRunner {
        TurnRunner::new(store, executor, RunnerSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn blank_inputs_rejected_before_anything_else() {
        let store = Arc::new(InMemoryStore::new());
        let executor = Arc::new(ScriptedExecutor::echo());
        let runner = runner(store.clone(), executor.clone());

        let mut request = TurnRequest::user("missing-agent", "  ");
        request.system_input = Some("\n".into());
        let err = runner.run(request).await.unwrap_err();
        assert!(matches!(err, TurnError::InvalidInput));
        assert!(executor.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_agent_persists_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let runner = runner(store.clone(), Arc::new(ScriptedExecutor::echo()));

        let err = runner.run(TurnRequest::user("ghost", "hello")).await.unwrap_err();
        assert!(matches!(err, TurnError::AgentNotFound(ref id) if id == "ghost"));
        assert!(err.user_message().starts_with("Error while processing your message:"));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_agents_leave_no_lock_behind() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let runner = runner(store.clone(), Arc::new(ScriptedExecutor::echo()));

        for i in 0..50 {
            let err = runner
                .run(TurnRequest::user(format!("ghost-{i}"), "hello"))
                .await
                .unwrap_err();
            assert!(matches!(err, TurnError::AgentNotFound(_)));
        }
        runner.run(TurnRequest::user(&agent.id, "hi")).await.unwrap();

        let locks = runner.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&agent.id));
    }

    #[tokio::test]
    async fn deleted_agent_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("gone", "").await.unwrap();
        store
            .set_agent_status(&agent.id, switchyard_core::AgentStatus::Deleted)
            .await
            .unwrap();
        let runner = runner(store.clone(), Arc::new(ScriptedExecutor::echo()));

        let err = runner.run(TurnRequest::user(&agent.id, "hi")).await.unwrap_err();
        assert!(matches!(err, TurnError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn persists_system_user_assistant_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "Dry humour.").await.unwrap();
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok("  reply text \n".into())]));
        let runner = runner(store.clone(), executor.clone());

        let mut request = TurnRequest::user(&agent.id, "  question  ")
            .with_origin("telegram", "42", "7");
        request.system_input = Some(" reminder ".into());
        let reply = runner.run(request).await.unwrap();
        assert_eq!(reply, "  reply text \n");

        let log = store.list_messages_ordered(&agent.id).await.unwrap();
        let roles: Vec<Role> = log.iter().map(|r| r.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        let contents: Vec<&str> = log.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["reminder", "question", "reply text"]);
        assert_eq!(log[1].metadata["channel"], "telegram");
        assert_eq!(log[1].metadata["chat_id"], "42");
        assert_eq!(log[1].metadata["sender_id"], "7");

        let request = &executor.requests()[0];
        assert!(request.history.is_empty());
        assert_eq!(request.pending, vec![ChatTurn::system("reminder"), ChatTurn::user("question")]);
        assert!(request.system_prompt.starts_with("You are Ada,"));
        assert!(request.system_prompt.ends_with("Agent persona:\nDry humour."));
    }

    #[tokio::test]
    async fn history_carries_previous_turns() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let executor = Arc::new(ScriptedExecutor::echo());
        let runner = runner(store.clone(), executor.clone());

        runner.run(TurnRequest::user(&agent.id, "first")).await.unwrap();
        runner.run(TurnRequest::user(&agent.id, "second")).await.unwrap();

        let requests = executor.requests();
        let history: Vec<&str> = requests[1].history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(history, ["first", "echo: first"]);
    }

    #[tokio::test]
    async fn empty_result_is_not_persisted() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Quiet", "").await.unwrap();
        let runner = runner(store.clone(), Arc::new(ScriptedExecutor::new(vec![Ok("   ".into())])));

        let reply = runner.run(TurnRequest::user(&agent.id, "ping")).await.unwrap();
        assert_eq!(reply, "   ");
        let log = store.list_messages_ordered(&agent.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role, Role::User);
    }

    #[tokio::test]
    async fn executor_failure_persists_error_text() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let runner = runner(
            store.clone(),
            Arc::new(ScriptedExecutor::new(vec![Err(ExecutorError::Network("reset".into()))])),
        );

        let err = runner.run(TurnRequest::user(&agent.id, "hi")).await.unwrap_err();
        assert!(matches!(err, TurnError::Executor(_)));

        let log = store.list_messages_ordered(&agent.id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].role, Role::Assistant);
        assert_eq!(log[1].content, err.user_message());
        assert_eq!(
            log[1].content,
            "Error while processing your message: Network error: reset"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn same_agent_turns_never_overlap() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let executor = Arc::new(SleepingExecutor::new(Duration::from_secs(5)));
        let runner = Arc::new(runner(store.clone(), executor.clone()));

        let a = tokio::spawn({
            let runner = runner.clone();
            let id = agent.id.clone();
            async move { runner.run(TurnRequest::user(id, "one")).await }
        });
        let b = tokio::spawn({
            let runner = runner.clone();
            let id = agent.id.clone();
            async move { runner.run(TurnRequest::user(id, "two")).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let tag = &agent.id;
        assert_eq!(
            executor.events(),
            [
                format!("enter:{tag}"),
                format!("exit:{tag}"),
                format!("enter:{tag}"),
                format!("exit:{tag}"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn different_agents_run_in_parallel() {
        let store = Arc::new(InMemoryStore::new());
        let first = store.create_agent("A", "").await.unwrap();
        let second = store.create_agent("B", "").await.unwrap();
        let executor = Arc::new(SleepingExecutor::new(Duration::from_secs(5)));
        let runner = Arc::new(runner(store.clone(), executor.clone()));

        let started = tokio::time::Instant::now();
        let (ra, rb) = tokio::join!(
            runner.run(TurnRequest::user(&first.id, "x")),
            runner.run(TurnRequest::user(&second.id, "y")),
        );
        ra.unwrap();
        rb.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));

        let events = executor.events();
        assert!(events[0].starts_with("enter:"));
        assert!(events[1].starts_with("enter:"));
    }

    #[tokio::test]
    async fn compaction_runs_before_selection() {
        let store = Arc::new(InMemoryStore::new());
        let agent = store.create_agent("Ada", "").await.unwrap();
        let text = "h".repeat(40);
        for _ in 0..10 {
            store
                .add_message(&agent.id, Role::User, &text, now_seconds(), &Metadata::new())
                .await
                .unwrap();
        }

        let executor = Arc::new(ScriptedExecutor::echo());
        let settings = RunnerSettings {
            token_budget: 1_000,
            token_model: "heuristic".into(),
            compaction: CompactionSettings {
                threshold_tokens: 100,
                target_tokens_after: 80,
                keep_recent_tokens: 30,
                memory_strength: 4,
            },
        };
        let runner = TurnRunner::new(store.clone(), executor.clone(), settings).unwrap();
        runner.run(TurnRequest::user(&agent.id, "now")).await.unwrap();

        // 10 × 15 tokens: five archived, five left for the window
        assert_eq!(executor.requests()[0].history.len(), 5);
        assert_eq!(store.list_memories(&agent.id).await.unwrap().len(), 1);
    }
}
