//! End-to-end pipeline tests: bus → inbound worker → turn runner → store,
//! and outbound worker → sender.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use switchyard_agent::{AgentMessageWorker, OutboundMessageWorker, RunnerSettings, TurnRunner};
use switchyard_core::error::{ChannelError, ExecutorError};
use switchyard_core::executor::{AgentExecutor, ExecutionRequest};
use switchyard_core::message::{InboundMessage, OutboundMessage, Role};
use switchyard_core::{MessageBus, OutboundSender, Store};
use switchyard_store::{InMemoryStore, SqliteStore};

/// Records enter/exit order and the peak number of overlapping calls.
struct Instrumented {
    delay: Duration,
    events: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Instrumented {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            events: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AgentExecutor for Instrumented {
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let text = request.pending.last().map(|t| t.content.clone()).unwrap_or_default();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("enter:{text}"));

        tokio::time::sleep(self.delay).await;

        self.events.lock().unwrap().push(format!("exit:{text}"));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("reply to {text}"))
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<OutboundMessage>>,
}

#[async_trait]
impl OutboundSender for RecordingSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn pipeline(
    store: Arc<dyn Store>,
    executor: Arc<dyn AgentExecutor>,
    max_parallel: usize,
) -> (Arc<MessageBus>, AgentMessageWorker) {
    let runner = Arc::new(TurnRunner::new(store, executor, RunnerSettings::default()).unwrap());
    let bus = Arc::new(MessageBus::new(100, 100));
    let worker = AgentMessageWorker::new(bus.clone(), runner, max_parallel);
    (bus, worker)
}

#[tokio::test(start_paused = true)]
async fn back_to_back_messages_for_one_agent_are_serialized() {
    let store = Arc::new(InMemoryStore::new());
    let agent = store.create_agent("Ada", "").await.unwrap();
    let executor = Arc::new(Instrumented::new(Duration::from_secs(2)));
    let (bus, worker) = pipeline(store.clone(), executor.clone(), 16);
    worker.start().await;

    let first = bus.request(InboundMessage::new(&agent.id, "web", "u", "c", "one"), None);
    let second = bus.request(InboundMessage::new(&agent.id, "web", "u", "c", "two"), None);
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap(), "reply to one");
    assert_eq!(second.unwrap(), "reply to two");

    let events = executor.events.lock().unwrap().clone();
    assert_eq!(events, ["enter:one", "exit:one", "enter:two", "exit:two"]);
    assert_eq!(executor.peak.load(Ordering::SeqCst), 1);

    let log = store.list_messages_ordered(&agent.id).await.unwrap();
    let contents: Vec<&str> = log.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, ["one", "reply to one", "two", "reply to two"]);
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn global_cap_bounds_parallel_turns() {
    let store = Arc::new(InMemoryStore::new());
    let mut ids = Vec::new();
    for name in ["a", "b", "c", "d"] {
        ids.push(store.create_agent(name, "").await.unwrap().id);
    }
    let executor = Arc::new(Instrumented::new(Duration::from_secs(1)));
    let (bus, worker) = pipeline(store.clone(), executor.clone(), 2);
    worker.start().await;

    let requests = ids.iter().map(|id| {
        bus.request(InboundMessage::new(id, "web", "u", "c", id.as_str()), None)
    });
    let replies = join_all(requests).await;
    assert!(replies.iter().all(|r| r.is_ok()));
    assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
    worker.stop().await;
}

#[tokio::test(start_paused = true)]
async fn distinct_agents_overlap() {
    let store = Arc::new(InMemoryStore::new());
    let a = store.create_agent("a", "").await.unwrap();
    let b = store.create_agent("b", "").await.unwrap();
    let executor = Arc::new(Instrumented::new(Duration::from_secs(1)));
    let (bus, worker) = pipeline(store.clone(), executor.clone(), 16);
    worker.start().await;

    let (ra, rb) = tokio::join!(
        bus.request(InboundMessage::new(&a.id, "web", "u", "c", "x"), None),
        bus.request(InboundMessage::new(&b.id, "web", "u", "c", "y"), None),
    );
    ra.unwrap();
    rb.unwrap();
    assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
    worker.stop().await;
}

#[tokio::test]
async fn sqlite_round_trip_delivers_reply() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(":memory:").await.unwrap());
    let agent = store.create_agent("Ada", "Helpful.").await.unwrap();
    let executor = Arc::new(Instrumented::new(Duration::from_millis(1)));
    let (bus, worker) = pipeline(store.clone(), executor, 4);

    let sender = Arc::new(RecordingSender::default());
    let outbound = OutboundMessageWorker::new(bus.clone(), sender.clone());
    worker.start().await;
    outbound.start().await;

    bus.publish(
        InboundMessage::new(&agent.id, "telegram", "7", "42", "status?").with_message_id("99"),
    )
    .await
    .unwrap();

    for _ in 0..200 {
        if !sender.sent.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let sent = sender.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, "telegram");
    assert_eq!(sent[0].chat_id, "42");
    assert_eq!(sent[0].agent_id, agent.id);
    assert_eq!(sent[0].content, "reply to status?");

    let log = store.list_messages_ordered(&agent.id).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[0].metadata["chat_id"], "42");
    assert_eq!(log[1].role, Role::Assistant);

    outbound.stop().await;
    worker.stop().await;
}
