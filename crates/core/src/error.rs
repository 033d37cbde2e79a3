//! Error types for the Switchyard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so binaries can bubble anything up with `?`.

use thiserror::Error;

/// The top-level error type for all Switchyard operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Message bus is closed")]
    Closed,

    #[error("Timed out after {seconds:.1}s waiting for a response")]
    Timeout { seconds: f64 },

    #[error("Response was dropped before the turn completed")]
    ResponseDropped,
}

#[derive(Debug, Clone, Error)]
pub enum CompactionError {
    #[error("Token thresholds must be positive")]
    NonPositiveThreshold,

    #[error("target_tokens_after ({target}) must be <= threshold_tokens ({threshold})")]
    TargetAboveThreshold { target: usize, threshold: usize },

    #[error("Compaction storage failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("Turn requires at least one non-empty input (user or system)")]
    InvalidInput,

    #[error("Agent '{0}' not found")]
    AgentNotFound(String),

    #[error("Compaction failed: {0}")]
    Compaction(#[from] CompactionError),

    #[error("{0}")]
    Executor(#[from] ExecutorError),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl TurnError {
    /// The text a user sees when their turn fails.
    pub fn user_message(&self) -> String {
        format!("Error while processing your message: {self}")
    }
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("No sender registered for channel {0}")]
    NoSenderRegistered(String),

    #[error("Outbound channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: String, got: String },

    #[error("Adapter agent mismatch: expected {expected}, got {got}")]
    AgentMismatch { expected: String, got: String },

    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Channel not running: {0}")]
    NotRunning(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("Executor request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by model provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid executor response: {0}")]
    InvalidResponse(String),

    #[error("Executor failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Path '{0}' escapes the agent workspace")]
    PathEscape(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
