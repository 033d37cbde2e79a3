//! Minimal Telegram Bot API client.
//!
//! Only the calls the adapter needs: `getUpdates` (long polling),
//! `sendMessage` and `setMyCommands`. The [`TelegramApi`] trait is the seam
//! the adapter is tested through.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use switchyard_core::error::ChannelError;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TgUser>,
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
    #[serde(default)]
    pub audio: Option<serde_json::Value>,
    #[serde(default)]
    pub photo: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub document: Option<TgDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgChat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TgDocument {
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessage {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: &str, description: &str) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Long-poll for updates. `offset` acknowledges everything before it;
    /// a negative offset returns only the newest pending updates.
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChannelError>;

    async fn send_message(&self, request: &SendMessage) -> Result<(), ChannelError>;

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), ChannelError>;
}

/// Bot API over HTTPS.
pub struct HttpTelegramApi {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl HttpTelegramApi {
    /// Client whose request timeout outlasts the long-poll timeout.
    pub fn new(
        bot_token: &str,
        proxy: Option<&str>,
        poll_timeout_secs: u64,
    ) -> Result<Self, ChannelError> {
        Self::with_base_url(DEFAULT_API_BASE, bot_token, proxy, poll_timeout_secs)
    }

    pub fn with_base_url(
        base_url: &str,
        bot_token: &str,
        proxy: Option<&str>,
        poll_timeout_secs: u64,
    ) -> Result<Self, ChannelError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(poll_timeout_secs + 15));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ChannelError::NotConfigured(format!("Invalid Telegram proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            // The request URL carries the bot token.
            .map_err(|e| ChannelError::ConnectionLost(format!("Telegram {method}: {}", e.without_url())))?;

        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await.map_err(|e| {
            ChannelError::DeliveryFailed {
                channel: "telegram".into(),
                reason: format!(
                    "{method} returned unreadable body (HTTP {status}): {}",
                    e.without_url()
                ),
            }
        })?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ChannelError::DeliveryFailed {
                channel: "telegram".into(),
                reason: format!(
                    "{method} failed (HTTP {status}): {}",
                    parsed.description.unwrap_or_else(|| "no description".into())
                ),
            }),
        }
    }
}

#[async_trait]
impl TelegramApi for HttpTelegramApi {
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, ChannelError> {
        let mut body = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = offset.into();
        }
        self.call("getUpdates", &body).await
    }

    async fn send_message(&self, request: &SendMessage) -> Result<(), ChannelError> {
        let body = serde_json::to_value(request).map_err(|e| ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason: e.to_string(),
        })?;
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    async fn set_my_commands(&self, commands: &[BotCommand]) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "commands": commands });
        self.call::<bool>("setMyCommands", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> HttpTelegramApi {
        HttpTelegramApi::with_base_url(&server.uri(), "123:abc", None, 5).unwrap()
    }

    #[test]
    fn api_url_embeds_token() {
        let api = HttpTelegramApi::new("123:abc", None, 30).unwrap();
        assert_eq!(
            api.api_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[test]
    fn update_decodes_optional_payloads() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 7, "first_name": "Ada", "username": "ada"},
                "chat": {"id": -100, "type": "group"},
                "document": {"file_name": "report.pdf"}
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.chat.kind, "group");
        assert_eq!(message.document.unwrap().file_name.as_deref(), Some("report.pdf"));
        assert!(message.text.is_none());
    }

    #[tokio::test]
    async fn get_updates_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(serde_json::json!({"offset": 42, "allowed_updates": ["message"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [{
                    "update_id": 42,
                    "message": {"message_id": 1, "chat": {"id": 9, "type": "private"}, "text": "hi"}
                }]
            })))
            .mount(&server)
            .await;

        let updates = api(&server).get_updates(Some(42), 5).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].message.as_ref().unwrap().text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn ok_without_result_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/setMyCommands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let err = api(&server)
            .set_my_commands(&[BotCommand::new("help", "Show help")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no description"));
    }

    #[tokio::test]
    async fn transport_errors_hide_the_token() {
        let api =
            HttpTelegramApi::with_base_url("http://127.0.0.1:9", "123456:SECRET-TOKEN", None, 1)
                .unwrap();
        let err = api.get_updates(None, 0).await.unwrap_err();
        assert!(matches!(err, ChannelError::ConnectionLost(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
    }

    #[tokio::test]
    async fn unreadable_body_hides_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let api = HttpTelegramApi::with_base_url(&server.uri(), "123456:SECRET-TOKEN", None, 5).unwrap();
        let err = api.get_updates(None, 0).await.unwrap_err();
        assert!(matches!(err, ChannelError::DeliveryFailed { .. }));
        assert!(!err.to_string().contains("SECRET-TOKEN"));
    }

    #[tokio::test]
    async fn api_error_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: can't parse entities"
            })))
            .mount(&server)
            .await;

        let err = api(&server)
            .send_message(&SendMessage {
                chat_id: "9".into(),
                text: "<b>broken".into(),
                parse_mode: Some("HTML".into()),
                reply_to_message_id: None,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("can't parse entities"));
    }
}
