//! Model executors for Switchyard.
//!
//! Every executor implements [`switchyard_core::AgentExecutor`]: it gets a
//! system prompt plus the bounded history and pending turns, and resolves
//! to the final assistant text.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatExecutor;
