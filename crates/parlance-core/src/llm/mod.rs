//! LLM provider integration for single-shot chat completions.
//!
//! Parlance talks to four hosted providers through a unified [`LlmProvider`]
//! trait:
//!
//! - **OpenAI**: GPT models via the Chat Completions API
//! - **Anthropic**: Claude models via the Messages API
//! - **Gemini**: Google models via `generateContent`
//! - **Mistral**: via its OpenAI-compatible Chat Completions endpoint
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐
//! │ ChatSession │────▶│ LlmProvider  │  (trait)
//! └─────────────┘     └──────┬───────┘
//!                            │
//!        ┌─────────────┬─────┴───────┬─────────────┐
//!        ▼             ▼             ▼             ▼
//!  ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌──────────┐
//!  │  OpenAI  │ │ Anthropic  │ │  Gemini  │ │ Mistral  │
//!  └──────────┘ └────────────┘ └──────────┘ └──────────┘
//! ```

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod types;

use std::time::Duration;

use parlance_config::{ProviderConfig, ProviderKind};

use crate::credentials::ApiKey;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{LlmError, LlmProvider};
pub use types::*;

/// Create an LLM provider for `kind`.
///
/// `settings` supplies the optional endpoint override; `timeout` bounds each
/// HTTP request. Fails only if the HTTP client cannot be built.
pub fn create_provider(
    kind: ProviderKind,
    settings: &ProviderConfig,
    api_key: ApiKey,
    timeout: Duration,
) -> Result<Box<dyn LlmProvider>, LlmError> {
    let base_url = settings.base_url.as_deref();
    let provider: Box<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi | ProviderKind::Mistral => {
            let mut provider = if kind == ProviderKind::Mistral {
                OpenAiProvider::mistral(api_key)
            } else {
                OpenAiProvider::new(api_key)
            }
            .with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Box::new(provider)
        }
        ProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key).with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Box::new(provider)
        }
        ProviderKind::Gemini => {
            let mut provider = GeminiProvider::new(api_key).with_timeout(timeout)?;
            if let Some(url) = base_url {
                provider = provider.with_base_url(url);
            }
            Box::new(provider)
        }
    };
    Ok(provider)
}
