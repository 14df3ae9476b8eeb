//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use parlance_config::{AppConfig, ProviderKind};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .provider(ProviderKind::Anthropic)
///     .api_key(ProviderKind::Anthropic, "test-key")
///     .model_window("tiny-model", "4K")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn provider(mut self, kind: ProviderKind) -> Self {
        self.config.llm.provider = kind;
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.config.llm.model = model.to_string();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.llm.temperature = temperature;
        self
    }

    pub fn system_prompt(mut self, prompt: &str) -> Self {
        self.config.llm.system_prompt = Some(prompt.to_string());
        self
    }

    /// Set an inline API key so tests never depend on the environment.
    pub fn api_key(mut self, kind: ProviderKind, key: &str) -> Self {
        self.provider_mut(kind).api_key = Some(key.to_string());
        self
    }

    pub fn base_url(mut self, kind: ProviderKind, url: &str) -> Self {
        self.provider_mut(kind).base_url = Some(url.to_string());
        self
    }

    /// Add a `[models]` window override.
    pub fn model_window(mut self, model: &str, window: &str) -> Self {
        self.config
            .models
            .insert(model.to_string(), window.to_string());
        self
    }

    pub fn data_dir(mut self, dir: &str) -> Self {
        self.config.storage.data_dir = dir.to_string();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    fn provider_mut(&mut self, kind: ProviderKind) -> &mut parlance_config::ProviderConfig {
        let providers = &mut self.config.providers;
        match kind {
            ProviderKind::OpenAi => &mut providers.openai,
            ProviderKind::Anthropic => &mut providers.anthropic,
            ProviderKind::Gemini => &mut providers.gemini,
            ProviderKind::Mistral => &mut providers.mistral,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
