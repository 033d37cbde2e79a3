//! Agent executor trait: the opaque model + tool loop behind a turn.
//!
//! The pipeline hands the executor a system prompt, the token-bounded
//! history and the pending turns, and awaits the final aggregated text.
//! Executors that stream internally still resolve to one string here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::message::Role;

/// One entry of the model input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Everything an executor needs for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub agent_id: String,

    /// Agent identity and persona
    pub system_prompt: String,

    /// Compacted recent window, oldest first
    pub history: Vec<ChatTurn>,

    /// The turn being executed: system turn (if any), then user turn (if any)
    pub pending: Vec<ChatTurn>,
}

impl ExecutionRequest {
    /// History followed by the pending turns, in model-input order.
    pub fn input(&self) -> impl Iterator<Item = &ChatTurn> {
        self.history.iter().chain(self.pending.iter())
    }
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run one turn and return the assistant's final text (possibly empty).
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_chains_history_then_pending() {
        let request = ExecutionRequest {
            agent_id: "a".into(),
            system_prompt: "sys".into(),
            history: vec![ChatTurn::user("old"), ChatTurn::assistant("reply")],
            pending: vec![ChatTurn::system("tick"), ChatTurn::user("new")],
        };
        let contents: Vec<&str> = request.input().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["old", "reply", "tick", "new"]);
    }
}
