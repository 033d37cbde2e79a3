//! Inbound worker pool.
//!
//! One consumer task drains the inbound queue. Each envelope waits for a
//! permit from a global semaphore (the cap on concurrently executing turns
//! across all agents) and then runs as its own task. A failed turn is
//! turned into a user-visible error string; it is never dropped silently
//! and never takes the consumer down.

use std::sync::Arc;

use switchyard_core::bus::{InboundEnvelope, MessageBus};
use switchyard_core::message::OutboundMessage;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::runner::{TurnRequest, TurnRunner};

/// Default cap on concurrently executing turns.
pub const DEFAULT_MAX_PARALLEL: usize = 16;

struct Running {
    cancel: CancellationToken,
    consumer: JoinHandle<()>,
}

pub struct AgentMessageWorker {
    bus: Arc<MessageBus>,
    runner: Arc<TurnRunner>,
    max_parallel: usize,
    running: Mutex<Option<Running>>,
}

impl AgentMessageWorker {
    pub fn new(bus: Arc<MessageBus>, runner: Arc<TurnRunner>, max_parallel: usize) -> Self {
        Self {
            bus,
            runner,
            max_parallel: max_parallel.max(1),
            running: Mutex::new(None),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Spawn the consumer loop. Calling `start` twice is a no-op.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume_loop(
            Arc::clone(&self.bus),
            Arc::clone(&self.runner),
            Arc::new(Semaphore::new(self.max_parallel)),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, consumer });
        info!(max_parallel = self.max_parallel, "Inbound worker started");
    }

    /// Stop consuming, cancel every in-flight turn and wait for them to settle.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.consumer.await {
            error!(error = %e, "Inbound consumer ended abnormally");
        }
        info!("Inbound worker stopped");
    }
}

async fn consume_loop(
    bus: Arc<MessageBus>,
    runner: Arc<TurnRunner>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let mut active = JoinSet::new();

    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            envelope = bus.next_inbound() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let bus = Arc::clone(&bus);
        let runner = Arc::clone(&runner);
        active.spawn(async move {
            let _permit = permit;
            process_envelope(&bus, &runner, envelope).await;
        });

        while let Some(result) = active.try_join_next() {
            log_task_result(result);
        }
    }

    if !active.is_empty() {
        debug!(in_flight = active.len(), "Cancelling in-flight turns");
    }
    active.abort_all();
    while let Some(result) = active.join_next().await {
        log_task_result(result);
    }
}

fn log_task_result(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "Inbound turn task failed"),
    }
}

async fn process_envelope(bus: &MessageBus, runner: &TurnRunner, mut envelope: InboundEnvelope) {
    let message = &envelope.message;
    debug!(
        envelope_id = %envelope.id,
        agent_id = %message.agent_id,
        channel = %message.channel,
        "Processing inbound message"
    );

    let response = match runner.run(TurnRequest::from(message)).await {
        Ok(text) => text,
        Err(e) => {
            error!(agent_id = %message.agent_id, error = %e, "Inbound processing failed");
            e.user_message()
        }
    };

    if !response.trim().is_empty() {
        let outbound = OutboundMessage::new(
            &message.agent_id,
            &message.channel,
            &message.chat_id,
            response.clone(),
        );
        if let Err(e) = bus.publish_outbound(outbound).await {
            warn!(agent_id = %message.agent_id, error = %e, "Could not queue outbound message");
        }
    }

    envelope.resolve(&response);
}
