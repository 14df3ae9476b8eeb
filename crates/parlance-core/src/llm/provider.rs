//! LLM provider trait, the core abstraction for chat completions.
//!
//! All backends (OpenAI, Anthropic, Gemini, Mistral) implement this trait.
//! The chat session dispatches through this interface.

use std::time::Duration;

use parlance_config::ProviderKind;
use reqwest::Client;

use crate::BoxFuture;

use super::types::{ChatRequest, ChatResponse};

/// Errors from LLM provider calls.
///
/// The display text is shown to the user verbatim when a turn fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("authentication failed (check API key): {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider error: {status}: {message}")]
    ProviderError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,
}

impl LlmError {
    /// Map a transport error from `reqwest`.
    ///
    /// The request URL is stripped first: it can carry credentials, and this
    /// text ends up in logs and in the saved conversation.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.without_url().to_string())
        }
    }

    /// Map a response body that failed to deserialize.
    pub(crate) fn from_decode(err: reqwest::Error) -> Self {
        LlmError::Parse(err.without_url().to_string())
    }
}

/// Build an HTTP client that bounds every request by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Request(format!("HTTP client setup: {}", e.without_url())))
}

/// Turn a non-success HTTP response into the matching [`LlmError`].
///
/// Shared by every provider; successful responses pass through untouched.
pub(crate) async fn check_status(
    resp: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, LlmError> {
    let status = resp.status().as_u16();
    if resp.status().is_success() {
        return Ok(resp);
    }
    if status == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        return Err(LlmError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    let error_body = resp.text().await.unwrap_or_default();
    match status {
        401 | 403 => Err(LlmError::Auth(if error_body.is_empty() {
            "invalid API key".to_string()
        } else {
            error_body
        })),
        404 => Err(LlmError::ModelNotFound(model.to_string())),
        _ => Err(LlmError::ProviderError {
            status,
            message: error_body,
        }),
    }
}

/// Core trait for LLM providers.
///
/// Implementations must be `Send + Sync` so a session can hold them behind
/// `Box<dyn LlmProvider>`. Uses `BoxFuture` for object safety.
pub trait LlmProvider: Send + Sync {
    /// Provider display name (e.g. "Anthropic", "OpenAI").
    fn name(&self) -> &str;

    /// Which provider family this is.
    fn kind(&self) -> ProviderKind;

    /// Perform a single, non-streaming chat completion.
    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;
}
