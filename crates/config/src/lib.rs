//! Configuration loading, validation, and management for Switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// SQLite database path
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Model provider settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Message bus queue sizes
    #[serde(default)]
    pub bus: BusConfig,

    /// Agent worker pool
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Context window and compaction
    #[serde(default)]
    pub context: ContextConfig,

    /// Scheduled job polling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Telegram channel defaults
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Per-agent workspace runtime
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_database_path() -> String {
    AppConfig::config_dir()
        .join("switchyard.db")
        .to_string_lossy()
        .into_owned()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("database_path", &self.database_path)
            .field("model", &self.model)
            .field("bus", &self.bus)
            .field("worker", &self.worker)
            .field("context", &self.context)
            .field("scheduler", &self.scheduler)
            .field("telegram", &self.telegram)
            .field("runtime", &self.runtime)
            .finish()
    }
}

/// OpenAI-compatible endpoint used by the default executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// HTTP timeout for one completion request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "minimax/minimax-m2.5".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,

    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,

    /// How long `chat` waits for a reply before giving up
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

fn default_queue_capacity() -> usize {
    1_000
}
fn default_response_timeout() -> u64 {
    300
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: default_queue_capacity(),
            outbound_capacity: default_queue_capacity(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Turns executing concurrently across all agents
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    16
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget of the recent window sent to the model
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Log size that triggers compaction
    #[serde(default = "default_threshold_tokens")]
    pub threshold_tokens: usize,

    /// Log size compaction aims for
    #[serde(default = "default_target_tokens")]
    pub target_tokens_after: usize,

    /// Recent tail that compaction never touches
    #[serde(default = "default_keep_recent")]
    pub keep_recent_tokens: usize,

    /// Strength assigned to compaction archives
    #[serde(default = "default_memory_strength")]
    pub memory_strength: u8,

    /// Tokenizer: "cl100k_base" (needs the `tiktoken` feature) or "heuristic"
    #[serde(default = "default_token_model")]
    pub token_model: String,
}

fn default_token_budget() -> usize {
    20_000
}
fn default_threshold_tokens() -> usize {
    100_000
}
fn default_target_tokens() -> usize {
    80_000
}
fn default_keep_recent() -> usize {
    20_000
}
fn default_memory_strength() -> u8 {
    4
}
fn default_token_model() -> String {
    "cl100k_base".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            threshold_tokens: default_threshold_tokens(),
            target_tokens_after: default_target_tokens(),
            keep_recent_tokens: default_keep_recent(),
            memory_strength: default_memory_strength(),
            token_model: default_token_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Defaults for every Telegram bot; per-agent channel config may override
/// the polling knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: f64,

    #[serde(default = "default_true")]
    pub drop_pending_updates: bool,
}

/// Lower bound for the long-poll timeout.
pub const MIN_POLL_TIMEOUT_SECONDS: u64 = 5;
/// Lower bound for the pause between polls.
pub const MIN_POLL_INTERVAL_SECONDS: f64 = 0.05;

fn default_poll_timeout() -> u64 {
    30
}
fn default_poll_interval_seconds() -> f64 {
    1.0
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_timeout_seconds: default_poll_timeout(),
            poll_interval_seconds: default_poll_interval_seconds(),
            drop_pending_updates: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Root under which each agent gets `{agent_id}/workspace`
    #[serde(default = "default_runtime_base_dir")]
    pub base_dir: String,

    #[serde(default = "default_exec_timeout")]
    pub default_exec_timeout_secs: u64,
}

fn default_runtime_base_dir() -> String {
    AppConfig::config_dir()
        .join("agents")
        .to_string_lossy()
        .into_owned()
}
fn default_exec_timeout() -> u64 {
    120
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_dir: default_runtime_base_dir(),
            default_exec_timeout_secs: default_exec_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `SWITCHYARD_API_KEY`, then `OPENROUTER_API_KEY`
    /// - `SWITCHYARD_MODEL`
    /// - `SWITCHYARD_DB`
    /// - `SWITCHYARD_TELEGRAM_ENABLED`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if self.api_key.is_none() {
            self.api_key = non_empty("SWITCHYARD_API_KEY").or_else(|| non_empty("OPENROUTER_API_KEY"));
        }
        if let Some(model) = non_empty("SWITCHYARD_MODEL") {
            self.model.model = model;
        }
        if let Some(db) = non_empty("SWITCHYARD_DB") {
            self.database_path = db;
        }
        if let Some(flag) = non_empty("SWITCHYARD_TELEGRAM_ENABLED") {
            self.telegram.enabled = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.bus.inbound_capacity == 0 || self.bus.outbound_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "bus capacities must be > 0".into(),
            ));
        }

        if self.worker.max_parallel == 0 {
            return Err(ConfigError::ValidationError(
                "worker.max_parallel must be >= 1".into(),
            ));
        }

        let ctx = &self.context;
        if ctx.token_budget == 0
            || ctx.threshold_tokens == 0
            || ctx.target_tokens_after == 0
            || ctx.keep_recent_tokens == 0
        {
            return Err(ConfigError::ValidationError(
                "context token limits must be > 0".into(),
            ));
        }
        if ctx.target_tokens_after > ctx.threshold_tokens {
            return Err(ConfigError::ValidationError(
                "context.target_tokens_after must be <= context.threshold_tokens".into(),
            ));
        }
        if ctx.memory_strength > 5 {
            return Err(ConfigError::ValidationError(
                "context.memory_strength must be between 0 and 5".into(),
            ));
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.poll_interval_secs must be > 0".into(),
            ));
        }

        if self.telegram.poll_timeout_seconds < MIN_POLL_TIMEOUT_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "telegram.poll_timeout_seconds must be >= {MIN_POLL_TIMEOUT_SECONDS}"
            )));
        }
        if self.telegram.poll_interval_seconds < MIN_POLL_INTERVAL_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "telegram.poll_interval_seconds must be >= {MIN_POLL_INTERVAL_SECONDS}"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            database_path: default_database_path(),
            model: ModelConfig::default(),
            bus: BusConfig::default(),
            worker: WorkerConfig::default(),
            context: ContextConfig::default(),
            scheduler: SchedulerConfig::default(),
            telegram: TelegramConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
