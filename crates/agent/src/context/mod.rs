//! Context management for a turn.
//!
//! Two questions are answered over the same message log and the same token
//! cost function:
//!
//! | Operation | Question | Effect |
//! |-----------|----------|--------|
//! | [`select_recent`] | What fits in this turn's input? | Read-only |
//! | [`ContextCompactor`] | Must the log shrink permanently? | Archives and deletes |
//!
//! Compaction always runs before selection within a turn, so selection never
//! sees messages that are about to be deleted.

pub mod compaction;
pub mod token;
pub mod window;

pub use compaction::{CompactionResult, CompactionSettings, ContextCompactor};
pub use token::{HeuristicCounter, TokenCounter, counter_for, message_tokens};
pub use window::{DEFAULT_TOKEN_BUDGET, select_recent};
