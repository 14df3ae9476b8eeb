//! Anthropic Claude API provider.
//!
//! Implements the [`LlmProvider`] trait for the Anthropic Messages API
//! (`/v1/messages`). System messages are lifted into the top-level `system`
//! field because the Messages API does not accept a `system` role.

use std::time::Duration;

use parlance_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::credentials::ApiKey;

use super::provider::{LlmError, LlmProvider, check_status, http_client};
use super::types::*;

pub(crate) const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    default_model: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            default_model: ProviderKind::Anthropic.default_model().to_string(),
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

    /// Convert our ChatRequest into Anthropic's API format.
    fn build_request_body(&self, request: &ChatRequest) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let system_parts: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: Some(request.temperature.min(1.0)),
        }
    }

    /// Parse Anthropic's response into our ChatResponse.
    fn parse_response(&self, resp: AnthropicResponse) -> ChatResponse {
        let content = resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicBlock::Text { text } => Some(text.as_str()),
                AnthropicBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = match resp.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => "stop".to_string(),
            Some("max_tokens") => "length".to_string(),
            Some(other) => other.to_string(),
            None => "unknown".to_string(),
        };

        ChatResponse {
            content,
            finish_reason,
            usage: TokenUsage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            },
            model: resp.model,
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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
                .header("x-api-key", self.api_key.expose())
                .header("anthropic-version", ANTHROPIC_API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(LlmError::from_transport)?;

            let resp = check_status(resp, &body.model).await?;

            let api_resp: AnthropicResponse = resp
                .json()
                .await
                .map_err(LlmError::from_decode)?;

            Ok(self.parse_response(api_resp))
        })
    }
}

// ── Anthropic API types (private) ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
