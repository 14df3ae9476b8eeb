//! Google Gemini API provider.
//!
//! Implements the [`LlmProvider`] trait for the Gemini `generateContent`
//! endpoint. Gemini names the assistant role `model` and takes system text
//! as a separate `systemInstruction`. The key travels in the
//! `x-goog-api-key` header so it never appears in a request URL.

use std::time::Duration;

use parlance_config::ProviderKind;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::credentials::ApiKey;

use super::provider::{LlmError, LlmProvider, check_status, http_client};
use super::types::*;

pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini provider.
pub struct GeminiProvider {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key.
    pub fn new(api_key: impl Into<ApiKey>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            default_model: ProviderKind::Gemini.default_model().to_string(),
        }
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set a custom API root (the `/v1beta/models/...` path is appended).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bound every request by the given timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Convert our ChatRequest into Gemini's API format.
    fn build_request_body(&self, request: &ChatRequest) -> (String, GeminiRequest) {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let system_parts: Vec<GeminiPart> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GeminiPart {
                text: m.content.clone(),
            })
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        let body = GeminiRequest {
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiSystemInstruction {
                    parts: system_parts,
                })
            },
            contents,
            generation_config: GeminiGenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: Some(request.temperature),
            },
        };
        (model, body)
    }

    /// Parse Gemini's response into our ChatResponse.
    fn parse_response(
        &self,
        model: String,
        resp: GeminiResponse,
    ) -> Result<ChatResponse, LlmError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("missing candidate in response".to_string()))?;

        let content = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("STOP") => "stop".to_string(),
            Some("MAX_TOKENS") => "length".to_string(),
            Some(other) => other.to_ascii_lowercase(),
            None => "unknown".to_string(),
        };

        let usage = resp.usage_metadata.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        Ok(ChatResponse {
            content,
            finish_reason,
            usage,
            model: resp.model_version.unwrap_or(model),
        })
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let (model, body) = self.build_request_body(request);
        Box::pin(async move {
            debug!(
                provider = self.name(),
                model = %model,
                messages = body.contents.len(),
                "chat completion request"
            );

            let resp = self
                .client
                .post(self.endpoint(&model))
                .header("x-goog-api-key", self.api_key.expose())
                .json(&body)
                .send()
                .await
                .map_err(LlmError::from_transport)?;

            let resp = check_status(resp, &model).await?;

            let api_resp: GeminiResponse = resp
                .json()
                .await
                .map_err(LlmError::from_decode)?;

            self.parse_response(model, api_resp)
        })
    }
}

// ── Gemini API types (private) ──────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u32,
}
