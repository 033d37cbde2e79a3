//! All Telegram adapters behind one outbound sender.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_config::TelegramConfig;
use switchyard_core::bus::MessageBus;
use switchyard_core::channel::{ChannelAdapter, OutboundSender};
use switchyard_core::error::ChannelError;
use switchyard_core::message::OutboundMessage;
use switchyard_core::store::Store;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::adapter::TelegramAdapter;
use super::api::{HttpTelegramApi, TelegramApi};
use super::{CHANNEL_NAME, TelegramAgentConfig};

/// Builds the Bot API client for one agent's config.
pub type ApiFactory =
    Arc<dyn Fn(&TelegramAgentConfig) -> Result<Arc<dyn TelegramApi>, ChannelError> + Send + Sync>;

pub struct TelegramService {
    store: Arc<dyn Store>,
    bus: Arc<MessageBus>,
    defaults: TelegramConfig,
    api_factory: ApiFactory,
    adapters: RwLock<HashMap<String, Arc<TelegramAdapter>>>,
}

impl TelegramService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<MessageBus>, defaults: TelegramConfig) -> Self {
        let factory: ApiFactory = Arc::new(
            |config: &TelegramAgentConfig| -> Result<Arc<dyn TelegramApi>, ChannelError> {
                let api = HttpTelegramApi::new(
                    &config.bot_token,
                    config.proxy.as_deref(),
                    config.poll_timeout_seconds,
                )?;
                Ok(Arc::new(api))
            },
        );
        Self::with_api_factory(store, bus, defaults, factory)
    }

    pub fn with_api_factory(
        store: Arc<dyn Store>,
        bus: Arc<MessageBus>,
        defaults: TelegramConfig,
        api_factory: ApiFactory,
    ) -> Self {
        Self {
            store,
            bus,
            defaults,
            api_factory,
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Start an adapter for every enabled Telegram binding.
    ///
    /// Bindings without a token are skipped; a binding whose adapter fails
    /// to start is logged and does not affect the others. Returns how many
    /// adapters are running.
    pub async fn start(&self) -> Result<usize, ChannelError> {
        let bindings = self
            .store
            .list_enabled_agent_channels(CHANNEL_NAME)
            .await
            .map_err(|e| ChannelError::NotConfigured(format!("Could not load Telegram bindings: {e}")))?;

        let mut adapters = self.adapters.write().await;
        for binding in bindings {
            if adapters.contains_key(&binding.agent_id) {
                continue;
            }

            let config = TelegramAgentConfig::from_channel_config(&binding.config, &self.defaults);
            if !config.has_token() {
                warn!(agent_id = %binding.agent_id, "Telegram binding has no bot token, skipping");
                continue;
            }

            let api = match (self.api_factory)(&config) {
                Ok(api) => api,
                Err(e) => {
                    error!(agent_id = %binding.agent_id, error = %e, "Could not build Telegram client");
                    continue;
                }
            };

            let adapter = Arc::new(TelegramAdapter::new(
                binding.agent_id.clone(),
                config,
                api,
                Arc::clone(&self.bus),
            ));
            match adapter.start().await {
                Ok(()) => {
                    adapters.insert(binding.agent_id, adapter);
                }
                Err(e) => {
                    error!(agent_id = %binding.agent_id, error = %e, "Telegram adapter failed to start");
                }
            }
        }

        info!(adapters = adapters.len(), "Telegram service started");
        Ok(adapters.len())
    }

    pub async fn stop(&self) {
        let adapters: Vec<_> = self.adapters.write().await.drain().collect();
        for (agent_id, adapter) in adapters {
            if let Err(e) = adapter.stop().await {
                warn!(agent_id = %agent_id, error = %e, "Telegram adapter stop failed");
            }
        }
        info!("Telegram service stopped");
    }

    /// Re-read bindings: stop every adapter, then start from scratch.
    pub async fn reload(&self) -> Result<usize, ChannelError> {
        self.stop().await;
        self.start().await
    }

    /// Agents with a running adapter, sorted.
    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.adapters.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl OutboundSender for TelegramService {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let adapter = self.adapters.read().await.get(&message.agent_id).cloned();
        match adapter {
            Some(adapter) => adapter.send(message).await,
            None => Err(ChannelError::NotRunning(format!(
                "no Telegram adapter for agent {}",
                message.agent_id
            ))),
        }
    }
}
