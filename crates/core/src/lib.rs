//! # Switchyard Core
//!
//! Domain types, traits, and error definitions for the Switchyard agent
//! runtime. Every collaborator of the dispatch pipeline (store, executor,
//! channels, sandbox) is defined here as a trait; implementations live in
//! their respective crates.
//!
//! The only concrete machinery in this crate is the [`MessageBus`], since
//! every other crate either publishes to it or consumes from it.

pub mod agent;
pub mod bus;
pub mod channel;
pub mod error;
pub mod executor;
pub mod job;
pub mod memory;
pub mod message;
pub mod sandbox;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentChannelRecord, AgentRecord, AgentStatus};
pub use bus::{InboundEnvelope, MessageBus, ResponseSlot};
pub use channel::{ChannelAdapter, OutboundSender};
pub use error::{Error, Result};
pub use executor::{AgentExecutor, ChatTurn, ExecutionRequest};
pub use job::{JobStatus, JobType, NewScheduledJob, ScheduledJob};
pub use memory::{MemoryRecord, MemoryUpsert};
pub use message::{InboundMessage, MessageRecord, Metadata, OutboundMessage, Role};
pub use sandbox::{ExecOutput, FileEntry, RuntimeInfo, Sandbox};
pub use store::Store;
