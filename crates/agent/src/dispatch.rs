//! Outbound delivery worker.
//!
//! Drains the outbound queue one message at a time and hands each message to
//! a sender (normally the channel registry). Delivery failures are logged
//! and the message is dropped; the loop keeps going.

use std::sync::Arc;

use switchyard_core::bus::MessageBus;
use switchyard_core::channel::OutboundSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct OutboundMessageWorker {
    bus: Arc<MessageBus>,
    sender: Arc<dyn OutboundSender>,
    running: Mutex<Option<Running>>,
}

impl OutboundMessageWorker {
    pub fn new(bus: Arc<MessageBus>, sender: Arc<dyn OutboundSender>) -> Self {
        Self {
            bus,
            sender,
            running: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(deliver_loop(
            Arc::clone(&self.bus),
            Arc::clone(&self.sender),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, task });
        info!("Outbound worker started");
    }

    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!(error = %e, "Outbound worker ended abnormally");
        }
        info!("Outbound worker stopped");
    }
}

async fn deliver_loop(bus: Arc<MessageBus>, sender: Arc<dyn OutboundSender>, cancel: CancellationToken) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = bus.next_outbound() => match message {
                Some(message) => message,
                None => break,
            },
        };

        debug!(channel = %message.channel, agent_id = %message.agent_id, "Delivering outbound message");
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = sender.send(&message) => result,
        };

        if let Err(e) = result {
            error!(
                channel = %message.channel,
                agent_id = %message.agent_id,
                error = %e,
                "Outbound send failed"
            );
        }
    }
}
