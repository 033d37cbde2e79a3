//! Owns every channel the daemon runs and their registration.

use std::sync::Arc;

use switchyard_config::TelegramConfig;
use switchyard_core::bus::MessageBus;
use switchyard_core::error::ChannelError;
use switchyard_core::store::Store;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::local::{CONSOLE_CHANNEL, LocalSender, WEB_CHANNEL};
use crate::registry::SenderRegistry;
use crate::telegram::{self, TelegramService};

pub struct ChannelManager {
    registry: Arc<SenderRegistry>,
    telegram: Option<Arc<TelegramService>>,
    started: Mutex<bool>,
}

impl ChannelManager {
    /// Telegram is only wired in when `[telegram].enabled` is set.
    pub fn new(
        registry: Arc<SenderRegistry>,
        store: Arc<dyn Store>,
        bus: Arc<MessageBus>,
        telegram_config: &TelegramConfig,
    ) -> Self {
        let telegram = telegram_config
            .enabled
            .then(|| Arc::new(TelegramService::new(store, bus, telegram_config.clone())));
        Self::with_telegram(registry, telegram)
    }

    pub fn with_telegram(
        registry: Arc<SenderRegistry>,
        telegram: Option<Arc<TelegramService>>,
    ) -> Self {
        Self {
            registry,
            telegram,
            started: Mutex::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<SenderRegistry> {
        &self.registry
    }

    pub fn telegram(&self) -> Option<&Arc<TelegramService>> {
        self.telegram.as_ref()
    }

    /// Register the local senders, then start Telegram. A Telegram failure
    /// is logged and leaves the local channels up.
    pub async fn start(&self) {
        let mut started = self.started.lock().await;
        if *started {
            return;
        }

        for channel in [WEB_CHANNEL, CONSOLE_CHANNEL] {
            self.registry
                .register_sender(channel, Arc::new(LocalSender))
                .await;
        }

        if let Some(service) = &self.telegram {
            match service.start().await {
                Ok(count) => {
                    self.registry
                        .register_sender(telegram::CHANNEL_NAME, service.clone())
                        .await;
                    info!(adapters = count, "Telegram channel ready");
                }
                Err(e) => error!(error = %e, "Telegram channel failed to start"),
            }
        }

        *started = true;
        info!(channels = ?self.registry.channels().await, "Channels started");
    }

    /// Tear down in reverse order of `start`.
    pub async fn stop(&self) {
        let mut started = self.started.lock().await;
        if !*started {
            return;
        }

        if let Some(service) = &self.telegram {
            self.registry.unregister_sender(telegram::CHANNEL_NAME).await;
            service.stop().await;
        }
        for channel in [CONSOLE_CHANNEL, WEB_CHANNEL] {
            self.registry.unregister_sender(channel).await;
        }

        *started = false;
        info!("Channels stopped");
    }

    /// Pick up changed Telegram bindings without touching other channels.
    pub async fn reload_telegram(&self) -> Result<usize, ChannelError> {
        let Some(service) = &self.telegram else {
            return Err(ChannelError::NotConfigured(
                "Telegram is disabled in configuration".into(),
            ));
        };
        let count = service.reload().await?;
        self.registry
            .register_sender(telegram::CHANNEL_NAME, service.clone())
            .await;
        Ok(count)
    }
}
