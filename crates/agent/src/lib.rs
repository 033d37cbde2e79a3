//! Turn execution and bus workers for Switchyard agents.
//!
//! A turn flows through the pipeline like this:
//!
//! 1. **Receive** an envelope from the inbound queue ([`AgentMessageWorker`])
//! 2. **Serialize** on the agent's lock ([`TurnRunner`])
//! 3. **Compact** the log if it grew past the threshold
//! 4. **Select** the recent window that fits the token budget
//! 5. **Execute** through the configured [`AgentExecutor`](switchyard_core::AgentExecutor)
//! 6. **Persist** system, user and assistant messages
//! 7. **Deliver** the reply through the outbound queue ([`OutboundMessageWorker`])

pub mod context;
pub mod dispatch;
pub mod prompt;
pub mod runner;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{CompactionResult, CompactionSettings, ContextCompactor, TokenCounter};
pub use dispatch::OutboundMessageWorker;
pub use prompt::build_system_prompt;
pub use runner::{RunnerSettings, TurnRequest, TurnRunner};
pub use worker::{AgentMessageWorker, DEFAULT_MAX_PARALLEL};
