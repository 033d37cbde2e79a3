//! Shared test executors.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::error::ExecutorError;
use switchyard_core::executor::{AgentExecutor, ExecutionRequest};

/// Returns scripted responses in order, then echoes the last pending turn.
/// Every request is recorded.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Result<String, ExecutorError>>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<Result<String, ExecutorError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let echo = request
            .pending
            .last()
            .map(|t| format!("echo: {}", t.content))
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(echo))
    }
}

/// Records `enter:{agent}` / `exit:{agent}` around a fixed sleep.
pub struct SleepingExecutor {
    delay: Duration,
    events: Mutex<Vec<String>>,
}

impl SleepingExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentExecutor for SleepingExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("enter:{}", request.agent_id));
        tokio::time::sleep(self.delay).await;
        self.events
            .lock()
            .unwrap()
            .push(format!("exit:{}", request.agent_id));
        Ok(format!("done:{}", request.agent_id))
    }
}
