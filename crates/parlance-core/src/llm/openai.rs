//! OpenAI-compatible API provider.
//!
//! Implements the [`LlmProvider`] trait for OpenAI's Chat Completions API.
//! Mistral exposes the same request/response format, so it is served by this
//! provider too (see [`OpenAiProvider::mistral`]).

use std::time::Duration;

use parlance_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::credentials::ApiKey;

use super::provider::{LlmError, LlmProvider, check_status, http_client};
use super::types::*;

pub(crate) const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub(crate) const MISTRAL_API_URL: &str = "https://api.mistral.ai/v1/chat/completions";

/// OpenAI-compatible provider.
pub struct OpenAiProvider {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    default_model: String,
    kind: ProviderKind,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider with the given API key.
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: ProviderKind::OpenAi.default_model().to_string(),
            kind: ProviderKind::OpenAi,
        }
    }

    /// Create a provider for Mistral's OpenAI-compatible endpoint.
    pub fn mistral(api_key: impl Into<ApiKey>) -> Self {
        Self {
            base_url: MISTRAL_API_URL.to_string(),
            default_model: ProviderKind::Mistral.default_model().to_string(),
            kind: ProviderKind::Mistral,
            ..Self::new(api_key)
        }
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set a custom endpoint URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bound every request by the given timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    /// Convert our ChatRequest into OpenAI's API format.
    fn build_request_body(&self, request: &ChatRequest) -> OpenAiRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        OpenAiRequest {
            model,
            messages: request.messages.clone(),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        }
    }

    /// Parse OpenAI's response into our ChatResponse.
    fn parse_response(&self, resp: OpenAiResponse) -> Result<ChatResponse, LlmError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => "stop".to_string(),
            Some("length") | Some("model_length") => "length".to_string(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        };

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            usage: resp.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: resp.model,
        })
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.kind.display_name()
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let body = self.build_request_body(request);
        Box::pin(async move {
            debug!(
                provider = self.name(),
                model = %body.model,
                messages = body.messages.len(),
                "chat completion request"
            );

            let resp = self
                .client
                .post(&self.base_url)
                .bearer_auth(self.api_key.expose())
                .json(&body)
                .send()
                .await
                .map_err(LlmError::from_transport)?;

            let resp = check_status(resp, &body.model).await?;

            let api_resp: OpenAiResponse = resp
                .json()
                .await
                .map_err(LlmError::from_decode)?;

            self.parse_response(api_resp)
        })
    }
}

// ── OpenAI API types (private) ──────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_build_simple_request() {
        let provider = OpenAiProvider::new("test-key");
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![
                ChatMessage::system("You are helpful."),
                ChatMessage::user("Hello!"),
            ],
            max_tokens: 1024,
            ..Default::default()
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body.model, "gpt-4o");
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0].role, Role::System);
        assert_eq!(body.messages[1].role, Role::User);
        assert_eq!(body.max_tokens, Some(1024));
    }

    #[test]
    fn test_default_model_when_request_has_none() {
        let provider = OpenAiProvider::new("test-key");
        let body = provider.build_request_body(&ChatRequest::default());
        assert_eq!(body.model, "gpt-4o-mini");

        let provider = OpenAiProvider::mistral("test-key");
        let body = provider.build_request_body(&ChatRequest::default());
        assert_eq!(body.model, "mistral-small-latest");
    }

    #[test]
    fn test_parse_text_response() {
        let provider = OpenAiProvider::new("test-key");
        let api_resp = OpenAiResponse {
            model: "gpt-4o".to_string(),
            choices: vec![OpenAiChoice {
                message: OpenAiResponseMessage {
                    content: Some("Hello!".to_string()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(OpenAiUsage {
                prompt_tokens: 5,
                completion_tokens: 3,
                total_tokens: 8,
            }),
        };

        let resp = provider.parse_response(api_resp).unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.total_tokens, 8);
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        let provider = OpenAiProvider::new("test-key");
        let api_resp = OpenAiResponse {
            model: "gpt-4o".to_string(),
            choices: Vec::new(),
            usage: None,
        };
        assert!(matches!(
            provider.parse_response(api_resp),
            Err(LlmError::Parse(_))
        ));
    }

    #[test]
    fn test_mistral_identity() {
        let provider = OpenAiProvider::mistral("key");
        assert_eq!(provider.name(), "Mistral");
        assert_eq!(provider.kind(), ProviderKind::Mistral);
        assert_eq!(provider.base_url, MISTRAL_API_URL);
    }

    #[test]
    fn test_custom_base_url() {
        let provider =
            OpenAiProvider::new("key").with_base_url("http://localhost:11434/v1/chat/completions");
        assert_eq!(
            provider.base_url,
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_chat_against_mock_server() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "model": "gpt-4o-2024-08-06",
                    "choices": [{
                        "message": {"role": "assistant", "content": "Hello there"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
                }));
            })
            .await;

        let provider =
            OpenAiProvider::new("test-key").with_base_url(server.url("/v1/chat/completions"));
        let request = ChatRequest {
            model: "gpt-4o".to_string(),
            messages: vec![ChatMessage::user("Hi")],
            ..Default::default()
        };

        let resp = provider.chat(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(resp.content, "Hello there");
        assert_eq!(resp.model, "gpt-4o-2024-08-06");
        assert_eq!(resp.usage.total_tokens, 11);
    }

    #[tokio::test]
    async fn test_chat_maps_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).header("authorization", "Bearer bad-key");
                then.status(401)
                    .json_body(json!({"error": {"message": "Incorrect API key provided"}}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).header("authorization", "Bearer busy-key");
                then.status(429).header("retry-after", "7");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).header("authorization", "Bearer broken-key");
                then.status(500).body("upstream exploded");
            })
            .await;

        let request = ChatRequest {
            messages: vec![ChatMessage::user("Hi")],
            ..Default::default()
        };

        let err = OpenAiProvider::new("bad-key")
            .with_base_url(server.url("/v1/chat/completions"))
            .chat(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth(ref msg) if msg.contains("Incorrect API key")));

        let err = OpenAiProvider::new("busy-key")
            .with_base_url(server.url("/v1/chat/completions"))
            .chat(&request)
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::RateLimited { retry_after_secs: 7 });

        let err = OpenAiProvider::new("broken-key")
            .with_base_url(server.url("/v1/chat/completions"))
            .chat(&request)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LlmError::ProviderError {
                status: 500,
                message: "upstream exploded".to_string()
            }
        );
    }
}
