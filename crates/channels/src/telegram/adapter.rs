//! Long-polling adapter for a single agent's bot.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::bus::MessageBus;
use switchyard_core::channel::ChannelAdapter;
use switchyard_core::error::ChannelError;
use switchyard_core::message::{InboundMessage, Metadata, OutboundMessage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::api::{BotCommand, SendMessage, TelegramApi, TgMessage, Update};
use super::format::{MAX_MESSAGE_CHARS, markdown_to_telegram_html, split_message};
use super::{CHANNEL_NAME, TelegramAgentConfig};

/// Pause after a failed `getUpdates` before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Commands passed to the agent as ordinary content.
const FORWARDED_COMMANDS: [&str; 2] = ["new", "help"];

/// What to do with one incoming update.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// Nothing usable, a chat outside the allow-list, or an unknown command.
    Skip,
    /// `/start`: answered locally, never forwarded.
    Greet { chat_id: String, text: String },
    Forward(InboundMessage),
}

/// Normalize an update into an inbound message for `agent_id`.
pub fn ingest_update(agent_id: &str, config: &TelegramAgentConfig, update: &Update) -> Ingest {
    let Some(message) = update.message.as_ref() else {
        return Ingest::Skip;
    };

    let chat_id = message.chat.id.to_string();
    if !config.allows_chat(&chat_id) {
        debug!(agent_id, chat_id = %chat_id, "Dropping update from chat outside allow-list");
        return Ingest::Skip;
    }

    let content = message_content(message);
    if content.is_empty() {
        return Ingest::Skip;
    }

    let from = message.from.as_ref();
    let command = message.text.as_deref().and_then(command_name);
    if let Some(name) = command.filter(|name| !FORWARDED_COMMANDS.contains(name) && *name != "start") {
        debug!(agent_id, chat_id = %chat_id, command = %name, "Ignoring unknown command");
        return Ingest::Skip;
    }
    if command == Some("start") {
        let first_name = from
            .and_then(|u| u.first_name.as_deref())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("there");
        return Ingest::Greet {
            chat_id,
            text: format!("Hi {first_name}! This bot is connected to Switchyard."),
        };
    }

    let sender_id = from.map_or_else(|| chat_id.clone(), |u| u.id.to_string());

    let mut metadata = Metadata::new();
    metadata.insert("update_id".into(), update.update_id.into());
    metadata.insert("message_id".into(), message.message_id.into());
    metadata.insert("chat_type".into(), message.chat.kind.clone().into());
    if let Some(user) = from {
        for (key, value) in [
            ("username", &user.username),
            ("first_name", &user.first_name),
            ("last_name", &user.last_name),
        ] {
            if let Some(value) = value {
                metadata.insert(key.into(), value.clone().into());
            }
        }
    }

    Ingest::Forward(
        InboundMessage::new(agent_id, CHANNEL_NAME, sender_id, chat_id, content)
            .with_message_id(message.message_id.to_string())
            .with_metadata(metadata),
    )
}

/// Text, else caption, else a bracketed placeholder for the payload type.
fn message_content(message: &TgMessage) -> String {
    let typed = [message.text.as_deref(), message.caption.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty());
    if let Some(text) = typed {
        return text.to_string();
    }

    if message.voice.is_some() {
        "[voice message]".into()
    } else if message.audio.is_some() {
        "[audio message]".into()
    } else if message.photo.as_ref().is_some_and(|p| !p.is_empty()) {
        "[photo]".into()
    } else if let Some(document) = &message.document {
        match document.file_name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) => format!("[document:{name}]"),
            None => "[document]".into(),
        }
    } else {
        String::new()
    }
}

/// `/start@my_bot hello` → `start`.
fn command_name(content: &str) -> Option<&str> {
    let first = content.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    Some(command.split('@').next().unwrap_or(command))
}

struct Shared {
    agent_id: String,
    config: TelegramAgentConfig,
    api: Arc<dyn TelegramApi>,
    bus: Arc<MessageBus>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct TelegramAdapter {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl TelegramAdapter {
    pub fn new(
        agent_id: impl Into<String>,
        config: TelegramAgentConfig,
        api: Arc<dyn TelegramApi>,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                agent_id: agent_id.into(),
                config,
                api,
                bus,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TelegramAgentConfig {
        &self.shared.config
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn deliver_chunk(&self, base: &SendMessage, chunk: &str) -> Result<(), ChannelError> {
        let rich = SendMessage {
            text: markdown_to_telegram_html(chunk),
            parse_mode: Some("HTML".into()),
            ..base.clone()
        };
        if let Err(e) = self.shared.api.send_message(&rich).await {
            warn!(
                agent_id = %self.shared.agent_id,
                error = %e,
                "Telegram rejected HTML, resending as plain text"
            );
            let plain = SendMessage {
                text: chunk.to_string(),
                ..base.clone()
            };
            self.shared.api.send_message(&plain).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel(&self) -> &str {
        CHANNEL_NAME
    }

    fn agent_id(&self) -> &str {
        &self.shared.agent_id
    }

    async fn start(&self) -> Result<(), ChannelError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }
        if !self.shared.config.has_token() {
            return Err(ChannelError::NotConfigured(format!(
                "Telegram bot token missing for agent {}",
                self.shared.agent_id
            )));
        }

        let commands = [
            BotCommand::new("start", "Start chatting with the agent"),
            BotCommand::new("new", "Start a new topic"),
            BotCommand::new("help", "Show what the agent can do"),
        ];
        if let Err(e) = self.shared.api.set_my_commands(&commands).await {
            warn!(agent_id = %self.shared.agent_id, error = %e, "Could not register bot commands");
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(Arc::clone(&self.shared), cancel.clone()));
        *running = Some(Running { cancel, task });
        info!(agent_id = %self.shared.agent_id, "Telegram adapter started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        let Some(running) = self.running.lock().await.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!(agent_id = %self.shared.agent_id, error = %e, "Telegram poller ended abnormally");
        }
        info!(agent_id = %self.shared.agent_id, "Telegram adapter stopped");
        Ok(())
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        self.check_identity(message)?;
        if !self.is_running().await {
            return Err(ChannelError::NotRunning(format!(
                "Telegram adapter for agent {}",
                self.shared.agent_id
            )));
        }

        let reply_to = message.reply_to_message_id.as_deref().map(|id| {
            id.parse::<i64>()
                .map(serde_json::Value::from)
                .unwrap_or_else(|_| id.into())
        });
        let base = SendMessage {
            chat_id: message.chat_id.clone(),
            text: String::new(),
            parse_mode: None,
            reply_to_message_id: reply_to,
        };

        for chunk in split_message(&message.content, MAX_MESSAGE_CHARS) {
            self.deliver_chunk(&base, &chunk).await?;
        }
        Ok(())
    }
}

async fn poll_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let agent_id = shared.agent_id.as_str();
    let timeout = shared.config.poll_timeout_seconds;
    let interval = Duration::from_secs_f64(shared.config.poll_interval_seconds);
    let mut offset: Option<i64> = None;

    if shared.config.drop_pending_updates {
        match shared.api.get_updates(Some(-1), 0).await {
            Ok(updates) => {
                if let Some(last) = updates.last() {
                    offset = Some(last.update_id + 1);
                    debug!(agent_id, update_id = last.update_id, "Skipped pending updates");
                }
            }
            Err(e) => warn!(agent_id, error = %e, "Could not drop pending updates"),
        }
    }

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = shared.api.get_updates(offset, timeout) => result,
        };

        let pause = match result {
            Ok(updates) => {
                for update in &updates {
                    offset = Some(update.update_id + 1);
                    handle_update(&shared, update).await;
                }
                interval
            }
            Err(e) => {
                warn!(agent_id, error = %e, "Telegram poll failed");
                ERROR_BACKOFF.max(interval)
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

async fn handle_update(shared: &Shared, update: &Update) {
    match ingest_update(&shared.agent_id, &shared.config, update) {
        Ingest::Skip => {}
        Ingest::Greet { chat_id, text } => {
            let greeting = SendMessage {
                chat_id,
                text,
                parse_mode: None,
                reply_to_message_id: None,
            };
            if let Err(e) = shared.api.send_message(&greeting).await {
                warn!(agent_id = %shared.agent_id, error = %e, "Could not send /start greeting");
            }
        }
        Ingest::Forward(message) => {
            debug!(
                agent_id = %shared.agent_id,
                chat_id = %message.chat_id,
                "Telegram message received"
            );
            if let Err(e) = shared.bus.publish(message).await {
                warn!(agent_id = %shared.agent_id, error = %e, "Could not queue Telegram message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::api::{TgChat, TgDocument, TgUser};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use switchyard_config::TelegramConfig;

    fn config(allowed: &[&str]) -> TelegramAgentConfig {
        TelegramAgentConfig {
            bot_token: "123:abc".into(),
            allowed_chat_ids: allowed.iter().map(|s| s.to_string()).collect(),
            ..TelegramAgentConfig::from_channel_config(&serde_json::json!({}), &TelegramConfig::default())
        }
    }

    fn update(id: i64, message: TgMessage) -> Update {
        Update {
            update_id: id,
            message: Some(message),
        }
    }

    fn text_message(chat: i64, text: &str) -> TgMessage {
        TgMessage {
            message_id: 11,
            from: Some(TgUser {
                id: 7,
                first_name: Some("Ada".into()),
                last_name: Some("Lovelace".into()),
                username: Some("ada".into()),
            }),
            chat: TgChat {
                id: chat,
                kind: "private".into(),
            },
            text: Some(text.into()),
            ..TgMessage::default()
        }
    }

    /// Serves scripted update batches, then idles until the poll timeout.
    #[derive(Default)]
    struct FakeApi {
        batches: StdMutex<VecDeque<Vec<Update>>>,
        offsets: StdMutex<Vec<Option<i64>>>,
        sent: StdMutex<Vec<SendMessage>>,
        reject_html: bool,
    }

    #[async_trait]
    impl TelegramApi for FakeApi {
        async fn get_updates(
            &self,
            offset: Option<i64>,
            timeout_secs: u64,
        ) -> Result<Vec<Update>, ChannelError> {
            self.offsets.lock().unwrap().push(offset);
            let batch = self.batches.lock().unwrap().pop_front();
            match batch {
                Some(batch) => Ok(batch),
                None => {
                    tokio::time::sleep(Duration::from_secs(timeout_secs.max(1))).await;
                    Ok(Vec::new())
                }
            }
        }

        async fn send_message(&self, request: &SendMessage) -> Result<(), ChannelError> {
            if self.reject_html && request.parse_mode.is_some() {
                return Err(ChannelError::DeliveryFailed {
                    channel: "telegram".into(),
                    reason: "can't parse entities".into(),
                });
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn set_my_commands(&self, _commands: &[BotCommand]) -> Result<(), ChannelError> {
            Err(ChannelError::ConnectionLost("offline".into()))
        }
    }

    #[test]
    fn text_message_is_forwarded_with_metadata() {
        let Ingest::Forward(msg) = ingest_update("a1", &config(&[]), &update(3, text_message(42, " hi "))) else {
            panic!("expected forward");
        };
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.chat_id, "42");
        assert_eq!(msg.sender_id, "7");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.message_id.as_deref(), Some("11"));
        assert_eq!(msg.metadata["update_id"], 3);
        assert_eq!(msg.metadata["username"], "ada");
        assert_eq!(msg.metadata["last_name"], "Lovelace");
        assert_eq!(msg.metadata["chat_type"], "private");
    }

    #[test]
    fn payloads_without_caption_become_placeholders() {
        let cases = [
            (
                TgMessage {
                    voice: Some(serde_json::json!({})),
                    ..TgMessage::default()
                },
                "[voice message]",
            ),
            (
                TgMessage {
                    audio: Some(serde_json::json!({})),
                    ..TgMessage::default()
                },
                "[audio message]",
            ),
            (
                TgMessage {
                    photo: Some(vec![serde_json::json!({})]),
                    ..TgMessage::default()
                },
                "[photo]",
            ),
            (
                TgMessage {
                    document: Some(TgDocument {
                        file_name: Some("notes.txt".into()),
                    }),
                    ..TgMessage::default()
                },
                "[document:notes.txt]",
            ),
            (
                TgMessage {
                    document: Some(TgDocument::default()),
                    ..TgMessage::default()
                },
                "[document]",
            ),
            (
                TgMessage {
                    caption: Some("look".into()),
                    photo: Some(vec![serde_json::json!({})]),
                    ..TgMessage::default()
                },
                "look",
            ),
        ];
        for (message, expected) in cases {
            let Ingest::Forward(msg) = ingest_update("a1", &config(&[]), &update(1, message)) else {
                panic!("expected forward for {expected}");
            };
            assert_eq!(msg.content, expected);
        }
    }

    #[test]
    fn empty_and_foreign_chats_are_skipped() {
        assert_eq!(
            ingest_update("a1", &config(&[]), &update(1, TgMessage::default())),
            Ingest::Skip
        );
        assert_eq!(
            ingest_update("a1", &config(&["99"]), &update(1, text_message(42, "hi"))),
            Ingest::Skip
        );
        assert_eq!(
            ingest_update("a1", &config(&[]), &Update { update_id: 1, message: None }),
            Ingest::Skip
        );
    }

    #[test]
    fn start_is_greeted_and_other_commands_forwarded() {
        let greet = ingest_update("a1", &config(&[]), &update(1, text_message(42, "/start@my_bot")));
        assert_eq!(
            greet,
            Ingest::Greet {
                chat_id: "42".into(),
                text: "Hi Ada! This bot is connected to Switchyard.".into(),
            }
        );

        let Ingest::Forward(msg) = ingest_update("a1", &config(&[]), &update(2, text_message(42, "/new"))) else {
            panic!("expected forward");
        };
        assert_eq!(msg.content, "/new");

        let Ingest::Forward(msg) =
            ingest_update("a1", &config(&[]), &update(3, text_message(42, "/help@my_bot")))
        else {
            panic!("expected forward");
        };
        assert_eq!(msg.content, "/help@my_bot");
    }

    #[test]
    fn unknown_commands_are_dropped() {
        for text in ["/settings", "/stop@my_bot now", "/"] {
            assert_eq!(
                ingest_update("a1", &config(&[]), &update(4, text_message(42, text))),
                Ingest::Skip,
                "{text}"
            );
        }
        let Ingest::Forward(msg) =
            ingest_update("a1", &config(&[]), &update(5, text_message(42, "use a/b paths")))
        else {
            panic!("expected forward");
        };
        assert_eq!(msg.content, "use a/b paths");
    }

    #[tokio::test]
    async fn start_without_token_is_rejected() {
        let adapter = TelegramAdapter::new(
            "a1",
            TelegramAgentConfig {
                bot_token: "  ".into(),
                ..config(&[])
            },
            Arc::new(FakeApi::default()),
            Arc::new(MessageBus::default()),
        );
        let err = adapter.start().await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
        assert!(!adapter.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_skips_backlog_and_publishes_messages() {
        let api = Arc::new(FakeApi::default());
        {
            let mut batches = api.batches.lock().unwrap();
            batches.push_back(vec![update(100, text_message(42, "stale"))]);
            batches.push_back(vec![
                update(101, text_message(42, "/start")),
                update(102, text_message(42, "fresh")),
            ]);
        }
        let bus = Arc::new(MessageBus::default());
        let adapter = TelegramAdapter::new("a1", config(&[]), api.clone(), bus.clone());
        adapter.start().await.unwrap();
        adapter.start().await.unwrap();

        let envelope = bus.next_inbound().await.unwrap();
        assert_eq!(envelope.message.content, "fresh");
        assert_eq!(envelope.message.agent_id, "a1");

        tokio::time::sleep(Duration::from_secs(2)).await;
        let offsets = api.offsets.lock().unwrap().clone();
        assert_eq!(offsets[0], Some(-1));
        assert_eq!(offsets[1], Some(101));
        assert_eq!(offsets[2], Some(103));

        let sent = api.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("Hi Ada!"));

        adapter.stop().await.unwrap();
        adapter.stop().await.unwrap();
        assert_eq!(bus.inbound_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn send_splits_and_falls_back_to_plain_text() {
        let api = Arc::new(FakeApi {
            reject_html: true,
            ..FakeApi::default()
        });
        let adapter = TelegramAdapter::new(
            "a1",
            TelegramAgentConfig {
                drop_pending_updates: false,
                ..config(&[])
            },
            api.clone(),
            Arc::new(MessageBus::default()),
        );
        adapter.start().await.unwrap();

        let long = format!("**{}**\n{}", "a".repeat(3_995), "tail");
        let message = OutboundMessage::new("a1", "telegram", "42", long).reply_to("11");
        adapter.send(&message).await.unwrap();

        let sent = api.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.parse_mode.is_none()));
        assert_eq!(sent[0].text, format!("**{}**", "a".repeat(3_995)));
        assert_eq!(sent[1].text, "tail");
        assert_eq!(sent[0].reply_to_message_id, Some(serde_json::json!(11)));
        adapter.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_requires_matching_identity_and_running_adapter() {
        let adapter = TelegramAdapter::new(
            "a1",
            config(&[]),
            Arc::new(FakeApi::default()),
            Arc::new(MessageBus::default()),
        );
        let wrong = OutboundMessage::new("a2", "telegram", "42", "hi");
        assert!(matches!(
            adapter.send(&wrong).await,
            Err(ChannelError::AgentMismatch { .. })
        ));

        let idle = OutboundMessage::new("a1", "telegram", "42", "hi");
        assert!(matches!(
            adapter.send(&idle).await,
            Err(ChannelError::NotRunning(_))
        ));
    }
}
