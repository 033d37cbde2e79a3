//! Message bus: two bounded FIFO queues between producers and workers.
//!
//! Publishing waits while a queue is full; that wait is the only
//! backpressure in the system. A synchronous caller can ask for the turn's
//! result through a single-use response slot, optionally bounded by a
//! timeout that abandons the wait without cancelling the turn.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::error::BusError;
use crate::message::{InboundMessage, OutboundMessage, now_seconds};

/// Default capacity of each queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Write-once slot through which a worker hands a turn's result back.
#[derive(Debug)]
pub struct ResponseSlot(oneshot::Sender<String>);

impl ResponseSlot {
    /// Resolve the slot. Returns `false` when the caller stopped waiting.
    pub fn resolve(self, response: String) -> bool {
        self.0.send(response).is_ok()
    }
}

/// An inbound message plus bus bookkeeping.
#[derive(Debug)]
pub struct InboundEnvelope {
    pub id: String,
    pub message: InboundMessage,
    pub enqueued_at: DateTime<Utc>,
    pub response_slot: Option<ResponseSlot>,
}

impl InboundEnvelope {
    /// Resolve the response slot if present and not yet used.
    pub fn resolve(&mut self, response: &str) -> bool {
        match self.response_slot.take() {
            Some(slot) => slot.resolve(response.to_string()),
            None => false,
        }
    }
}

pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundEnvelope>,
    inbound_rx: Mutex<mpsc::Receiver<InboundEnvelope>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<mpsc::Receiver<OutboundMessage>>,
}

impl MessageBus {
    pub fn new(inbound_capacity: usize, outbound_capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
        }
    }

    /// Enqueue an inbound message.
    ///
    /// With `wait_response == false` this returns `Ok(None)` once the
    /// envelope is queued. Otherwise it waits for the turn's text, bounded by
    /// `timeout` when one is given.
    pub async fn publish_inbound(
        &self,
        message: InboundMessage,
        wait_response: bool,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, BusError> {
        if message.content.trim().is_empty() {
            return Err(BusError::InvalidInput(
                "inbound message has no content".into(),
            ));
        }

        let (slot, waiter) = if wait_response {
            let (tx, rx) = oneshot::channel();
            (Some(ResponseSlot(tx)), Some(rx))
        } else {
            (None, None)
        };

        let envelope = InboundEnvelope {
            id: Uuid::new_v4().to_string(),
            message,
            enqueued_at: now_seconds(),
            response_slot: slot,
        };
        debug!(
            envelope_id = %envelope.id,
            agent_id = %envelope.message.agent_id,
            channel = %envelope.message.channel,
            "Queueing inbound message"
        );
        self.inbound_tx
            .send(envelope)
            .await
            .map_err(|_| BusError::Closed)?;

        let Some(waiter) = waiter else {
            return Ok(None);
        };

        match timeout {
            None => waiter.await.map(Some).map_err(|_| BusError::ResponseDropped),
            Some(limit) => match tokio::time::timeout(limit, waiter).await {
                Ok(result) => result.map(Some).map_err(|_| BusError::ResponseDropped),
                Err(_) => Err(BusError::Timeout {
                    seconds: limit.as_secs_f64(),
                }),
            },
        }
    }

    /// Fire-and-forget shorthand for adapters.
    pub async fn publish(&self, message: InboundMessage) -> Result<(), BusError> {
        self.publish_inbound(message, false, None).await.map(|_| ())
    }

    /// Wait for the reply to `message`, up to `timeout`.
    pub async fn request(
        &self,
        message: InboundMessage,
        timeout: Option<Duration>,
    ) -> Result<String, BusError> {
        self.publish_inbound(message, true, timeout)
            .await?
            .ok_or(BusError::ResponseDropped)
    }

    pub async fn publish_outbound(&self, message: OutboundMessage) -> Result<(), BusError> {
        self.outbound_tx
            .send(message)
            .await
            .map_err(|_| BusError::Closed)
    }

    /// Wait for the next inbound envelope.
    pub async fn next_inbound(&self) -> Option<InboundEnvelope> {
        self.inbound_rx.lock().await.recv().await
    }

    /// Wait for the next outbound message.
    pub async fn next_outbound(&self) -> Option<OutboundMessage> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Messages currently waiting in the inbound queue.
    pub fn inbound_len(&self) -> usize {
        self.inbound_tx.max_capacity() - self.inbound_tx.capacity()
    }

    /// Messages currently waiting in the outbound queue.
    pub fn outbound_len(&self) -> usize {
        self.outbound_tx.max_capacity() - self.outbound_tx.capacity()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_CAPACITY)
    }
}
