use std::sync::Arc;

use async_trait::async_trait;
use huddle_core::config::{LlmConfig, LlmProvider};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";

const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";
const ERROR_BODY_PREVIEW_CHARS: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to generative-text service failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("generative-text service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode generative-text response: {0}")]
    Decode(String),
}

/// Request URLs are dropped from transport errors so they never reach logs.
impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.without_url())
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the first candidate's text, or `None` when the service
    /// answered successfully but produced no text.
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError>;

    fn provider_name(&self) -> &'static str;
}

pub fn build_client(config: &LlmConfig) -> Arc<dyn LlmClient> {
    let client = Client::new();
    match config.provider {
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            client,
            config.base_url.clone().unwrap_or_else(|| GEMINI_DEFAULT_BASE_URL.to_string()),
            config.model.clone(),
            config.api_key.clone().unwrap_or_else(|| SecretString::from(String::new())),
        )),
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            client,
            "openai",
            config.base_url.clone().unwrap_or_else(|| OPENAI_DEFAULT_BASE_URL.to_string()),
            config.model.clone(),
            config.api_key.clone(),
        )),
        LlmProvider::Ollama => Arc::new(OpenAiCompatibleClient::new(
            client,
            "ollama",
            config.base_url.clone().unwrap_or_default(),
            config.model.clone(),
            config.api_key.clone(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    response_mime_type: &'static str,
}

pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: String, model: String, api_key: SecretString) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), model, api_key }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError> {
        let body = GeminiRequest {
            contents: [GeminiContent { parts: [GeminiPart { text: &request.prompt }] }],
            generation_config: match request.response_format {
                ResponseFormat::Json => {
                    Some(GeminiGenerationConfig { response_mime_type: "application/json" })
                }
                ResponseFormat::Text => None,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(GEMINI_API_KEY_HEADER, self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let payload = read_success_json(response).await?;
        Ok(first_text(&payload, "/candidates/0/content/parts/0/text"))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions (OpenAI, Ollama)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatCompletionMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ChatResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

pub struct OpenAiCompatibleClient {
    client: Client,
    provider: &'static str,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        client: Client,
        provider: &'static str,
        base_url: String,
        model: String,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, LlmError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [ChatCompletionMessage { role: "user", content: &request.prompt }],
            response_format: match request.response_format {
                ResponseFormat::Json => Some(ChatResponseFormat { kind: "json_object" }),
                ResponseFormat::Text => None,
            },
        };

        let mut builder =
            self.client.post(format!("{}/v1/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let payload = read_success_json(builder.send().await?).await?;
        Ok(first_text(&payload, "/choices/0/message/content"))
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }
}

async fn read_success_json(response: reqwest::Response) -> Result<Value, LlmError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
        return Err(LlmError::Status { status: status.as_u16(), body });
    }

    let raw = response.text().await?;
    serde_json::from_str(&raw).map_err(|error| LlmError::Decode(error.to_string()))
}

fn first_text(payload: &Value, pointer: &str) -> Option<String> {
    let text = payload.pointer(pointer).and_then(Value::as_str)?;
    if text.trim().is_empty() {
        debug!(event_name = "llm.response.empty", pointer, "model returned an empty candidate");
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use huddle_core::config::{LlmConfig, LlmProvider};
    use reqwest::Client;
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::*;

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    fn json_request(prompt: &str) -> CompletionRequest {
        CompletionRequest { prompt: prompt.to_string(), response_format: ResponseFormat::Json }
    }

    #[tokio::test]
    async fn gemini_sends_prompt_key_and_mime_type() {
        async fn generate(
            Path(rest): Path<String>,
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            let ok = rest == "gemini-test:generateContent"
                && query.is_empty()
                && headers.get("x-goog-api-key").and_then(|value| value.to_str().ok())
                    == Some("test-key")
                && body["contents"][0]["parts"][0]["text"] == "hello"
                && body["generationConfig"]["response_mime_type"] == "application/json";
            if !ok {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": body })));
            }
            (
                StatusCode::OK,
                Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": "{\"score\":7,\"summary\":\"Upbeat\"}" }] } }]
                })),
            )
        }

        let base = spawn_stub(Router::new().route("/v1beta/models/{*rest}", post(generate))).await;
        let client = GeminiClient::new(
            Client::new(),
            base,
            "gemini-test".to_string(),
            SecretString::from("test-key".to_string()),
        );

        let text = client.complete(&json_request("hello")).await.expect("completion");
        assert_eq!(text.as_deref(), Some("{\"score\":7,\"summary\":\"Upbeat\"}"));
    }

    #[tokio::test]
    async fn gemini_transport_errors_do_not_expose_api_key() {
        let client = GeminiClient::new(
            Client::new(),
            "http://127.0.0.1:9".to_string(),
            "gemini-test".to_string(),
            SecretString::from("SUPERSECRETKEY".to_string()),
        );

        let error = client.complete(&json_request("hi")).await.expect_err("connection refused");
        assert!(matches!(error, LlmError::Transport(_)));
        assert!(!error.to_string().contains("SUPERSECRETKEY"));
        assert!(!format!("{error:?}").contains("SUPERSECRETKEY"));
        assert!(!error.to_string().contains("generateContent"));
    }

    #[tokio::test]
    async fn gemini_text_requests_omit_generation_config() {
        async fn generate(Json(body): Json<Value>) -> Json<Value> {
            let has_config = body.get("generationConfig").is_some();
            Json(json!({
                "candidates": [{ "content": { "parts": [{ "text": format!("config={has_config}") }] } }]
            }))
        }

        let base = spawn_stub(Router::new().route("/v1beta/models/{*rest}", post(generate))).await;
        let client = GeminiClient::new(
            Client::new(),
            base,
            "gemini-test".to_string(),
            SecretString::from("k".to_string()),
        );

        let request =
            CompletionRequest { prompt: "sum".to_string(), response_format: ResponseFormat::Text };
        let text = client.complete(&request).await.expect("completion");
        assert_eq!(text.as_deref(), Some("config=false"));
    }

    #[tokio::test]
    async fn gemini_without_candidates_returns_none() {
        async fn generate() -> Json<Value> {
            Json(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
        }

        let base = spawn_stub(Router::new().route("/v1beta/models/{*rest}", post(generate))).await;
        let client = GeminiClient::new(
            Client::new(),
            base,
            "gemini-test".to_string(),
            SecretString::from("k".to_string()),
        );

        let text = client.complete(&json_request("hi")).await.expect("completion");
        assert_eq!(text, None);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        async fn generate() -> (StatusCode, &'static str) {
            (StatusCode::TOO_MANY_REQUESTS, "quota exceeded")
        }

        let base = spawn_stub(Router::new().route("/v1beta/models/{*rest}", post(generate))).await;
        let client = GeminiClient::new(
            Client::new(),
            base,
            "gemini-test".to_string(),
            SecretString::from("k".to_string()),
        );

        let error = client.complete(&json_request("hi")).await.expect_err("status error");
        assert!(matches!(
            error,
            LlmError::Status { status: 429, ref body } if body == "quota exceeded"
        ));
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_decode_error() {
        async fn generate() -> &'static str {
            "<html>gateway</html>"
        }

        let base = spawn_stub(Router::new().route("/v1beta/models/{*rest}", post(generate))).await;
        let client = GeminiClient::new(
            Client::new(),
            base,
            "gemini-test".to_string(),
            SecretString::from("k".to_string()),
        );

        let error = client.complete(&json_request("hi")).await.expect_err("decode error");
        assert!(matches!(error, LlmError::Decode(_)));
    }

    #[tokio::test]
    async fn openai_compatible_sends_bearer_and_json_mode() {
        async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            let authorized = headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                == Some("Bearer sk-test");
            let ok = authorized
                && body["model"] == "gpt-test"
                && body["messages"][0]["role"] == "user"
                && body["messages"][0]["content"] == "hello"
                && body["response_format"]["type"] == "json_object";
            if !ok {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": body })));
            }
            (
                StatusCode::OK,
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "{\"actionItems\":[]}" } }] })),
            )
        }

        let base = spawn_stub(Router::new().route("/v1/chat/completions", post(chat))).await;
        let client = OpenAiCompatibleClient::new(
            Client::new(),
            "openai",
            format!("{base}/"),
            "gpt-test".to_string(),
            Some(SecretString::from("sk-test".to_string())),
        );

        let text = client.complete(&json_request("hello")).await.expect("completion");
        assert_eq!(text.as_deref(), Some("{\"actionItems\":[]}"));
        assert_eq!(client.provider_name(), "openai");
    }

    #[tokio::test]
    async fn empty_choice_content_returns_none() {
        async fn chat() -> Json<Value> {
            Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "  " } }] }))
        }

        let base = spawn_stub(Router::new().route("/v1/chat/completions", post(chat))).await;
        let client = OpenAiCompatibleClient::new(
            Client::new(),
            "ollama",
            base,
            "llama3.1".to_string(),
            None,
        );

        let text = client.complete(&json_request("hello")).await.expect("completion");
        assert_eq!(text, None);
    }

    #[test]
    fn build_client_selects_provider() {
        let mut config = LlmConfig {
            provider: LlmProvider::Gemini,
            api_key: Some(SecretString::from("k".to_string())),
            base_url: None,
            model: "gemini-1.5-flash-latest".to_string(),
        };
        assert_eq!(build_client(&config).provider_name(), "gemini");

        config.provider = LlmProvider::OpenAi;
        assert_eq!(build_client(&config).provider_name(), "openai");

        config.provider = LlmProvider::Ollama;
        config.base_url = Some("http://localhost:11434".to_string());
        assert_eq!(build_client(&config).provider_name(), "ollama");
    }
}
