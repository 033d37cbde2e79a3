//! Subcommand implementations and the wiring they share.

pub mod agent;
pub mod channel;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod job;
pub mod workspace;

use std::path::Path;
use std::sync::Arc;

use switchyard_agent::{AgentMessageWorker, OutboundMessageWorker, RunnerSettings, TurnRunner};
use switchyard_channels::SenderRegistry;
use switchyard_config::AppConfig;
use switchyard_core::agent::AgentRecord;
use switchyard_core::bus::MessageBus;
use switchyard_core::executor::AgentExecutor;
use switchyard_core::store::Store;
use switchyard_providers::OpenAiCompatExecutor;
use switchyard_store::SqliteStore;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    if let Some(parent) = Path::new(&config.database_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = SqliteStore::new(&config.database_path)
        .await
        .map_err(|e| format!("Failed to open database {}: {e}", config.database_path))?;
    Ok(Arc::new(store))
}

pub fn build_executor(config: &AppConfig) -> Result<Arc<dyn AgentExecutor>, Box<dyn std::error::Error>> {
    let Some(api_key) = config.api_key.as_deref() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SWITCHYARD_API_KEY=sk-...");
        eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...");
        eprintln!();
        eprintln!("  Or add `api_key` to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };
    Ok(Arc::new(OpenAiCompatExecutor::from_config(&config.model, api_key)?))
}

/// Find a live agent by id or by name.
pub async fn resolve_agent(
    store: &dyn Store,
    key: &str,
) -> Result<AgentRecord, Box<dyn std::error::Error>> {
    if let Some(agent) = store.get_agent(key).await? {
        if !agent.is_deleted() {
            return Ok(agent);
        }
    }
    store
        .list_agents()
        .await?
        .into_iter()
        .find(|a| !a.is_deleted() && a.name == key)
        .ok_or_else(|| format!("Agent '{key}' not found").into())
}

/// Bus, runner and the two bus workers; shared by `daemon` and `chat`.
pub struct Pipeline {
    pub store: Arc<SqliteStore>,
    pub bus: Arc<MessageBus>,
    pub runner: Arc<TurnRunner>,
    pub registry: Arc<SenderRegistry>,
    pub inbound: AgentMessageWorker,
    pub outbound: OutboundMessageWorker,
}

impl Pipeline {
    pub async fn build(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = open_store(config).await?;
        let executor = build_executor(config)?;
        let bus = Arc::new(MessageBus::new(
            config.bus.inbound_capacity,
            config.bus.outbound_capacity,
        ));
        let runner = Arc::new(TurnRunner::new(
            store.clone(),
            executor,
            RunnerSettings::from(&config.context),
        )?);
        let registry = Arc::new(SenderRegistry::new());
        let inbound = AgentMessageWorker::new(bus.clone(), runner.clone(), config.worker.max_parallel);
        let outbound = OutboundMessageWorker::new(bus.clone(), registry.clone());

        Ok(Self {
            store,
            bus,
            runner,
            registry,
            inbound,
            outbound,
        })
    }

    pub async fn start(&self) {
        self.outbound.start().await;
        self.inbound.start().await;
    }

    pub async fn stop(&self) {
        self.inbound.stop().await;
        self.outbound.stop().await;
    }
}
