//! OpenAI-compatible chat-completions executor.
//!
//! Works with: OpenRouter (the default), OpenAI, Ollama, vLLM, Together AI
//! and any endpoint exposing `POST {base_url}/chat/completions`.
//!
//! One turn is one non-streaming completion: the system prompt, the
//! compacted history and the pending turns go out as a message list and
//! the first choice's text comes back.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchyard_config::ModelConfig;
use switchyard_core::error::ExecutorError;
use switchyard_core::executor::{AgentExecutor, ChatTurn, ExecutionRequest};
use switchyard_core::message::Role;
use tracing::{debug, warn};

/// Retry hint used when a 429 carries no `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiCompatExecutor {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatExecutor")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatExecutor {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExecutorError::Failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        })
    }

    /// Build from the `[model]` section and a resolved API key.
    pub fn from_config(config: &ModelConfig, api_key: &str) -> Result<Self, ExecutorError> {
        let mut executor = Self::new(
            config.api_url.as_str(),
            api_key,
            config.model.as_str(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        executor.temperature = config.temperature;
        executor.max_tokens = config.max_tokens;
        Ok(executor)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_api_messages(request: &ExecutionRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(request.history.len() + request.pending.len() + 1);
        if !request.system_prompt.trim().is_empty() {
            messages.push(ApiMessage {
                role: "system",
                content: request.system_prompt.clone(),
            });
        }
        messages.extend(request.input().map(ApiMessage::from_turn));
        messages
    }
}

#[async_trait]
impl AgentExecutor for OpenAiCompatExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request),
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(
            agent_id = %request.agent_id,
            model = %self.model,
            messages = request.history.len() + request.pending.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ExecutorError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ExecutorError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Model endpoint returned error");
            return Err(ExecutorError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ExecutorError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                agent_id = %request.agent_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion received"
            );
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ExecutorError::InvalidResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// --- OpenAI API wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl ApiMessage {
    /// Tool output has no call id to attach here, so it goes back to the
    /// model as a labelled user message.
    fn from_turn(turn: &ChatTurn) -> Self {
        match turn.role {
            Role::System => Self {
                role: "system",
                content: turn.content.clone(),
            },
            Role::User => Self {
                role: "user",
                content: turn.content.clone(),
            },
            Role::Assistant => Self {
                role: "assistant",
                content: turn.content.clone(),
            },
            Role::Tool => Self {
                role: "user",
                content: format!("Tool output:\n{}", turn.content),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ExecutionRequest {
        ExecutionRequest {
            agent_id: "agent-1".into(),
            system_prompt: "You are Ada.".into(),
            history: vec![ChatTurn::user("earlier"), ChatTurn::new(Role::Tool, "42")],
            pending: vec![ChatTurn::system("tick"), ChatTurn::user("now?")],
        }
    }

    fn executor(server: &MockServer) -> OpenAiCompatExecutor {
        OpenAiCompatExecutor::new(
            format!("{}/v1/", server.uri()),
            "sk-test",
            "test-model",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn message_order_and_roles() {
        let messages = OpenAiCompatExecutor::to_api_messages(&request());
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "user", "system", "user"]);
        assert_eq!(messages[0].content, "You are Ada.");
        assert_eq!(messages[2].content, "Tool output:\n42");
        assert_eq!(messages[4].content, "now?");
    }

    #[test]
    fn debug_hides_key() {
        let executor = OpenAiCompatExecutor::new("http://x", "sk-secret", "m", Duration::from_secs(1)).unwrap();
        assert!(!format!("{executor:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "test-model", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "All good."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let text = executor(&server).execute(request()).await.unwrap();
        assert_eq!(text, "All good.");
    }

    #[tokio::test]
    async fn null_content_is_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        assert_eq!(executor(&server).execute(request()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        for (status, check) in [
            (401, "auth"),
            (403, "auth"),
            (429, "rate"),
            (500, "api"),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .insert_header("retry-after", "17")
                        .set_body_string("upstream exploded"),
                )
                .mount(&server)
                .await;

            let err = executor(&server).execute(request()).await.unwrap_err();
            match check {
                "auth" => assert!(matches!(err, ExecutorError::AuthenticationFailed(_))),
                "rate" => assert!(matches!(
                    err,
                    ExecutorError::RateLimited { retry_after_secs: 17 }
                )),
                _ => assert!(matches!(
                    err,
                    ExecutorError::Api { status_code: 500, ref message } if message == "upstream exploded"
                )),
            }
        }
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = executor(&server).execute(request()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let executor = OpenAiCompatExecutor::new(
            "http://127.0.0.1:9",
            "k",
            "m",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = executor.execute(request()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Network(_)));
    }
}
