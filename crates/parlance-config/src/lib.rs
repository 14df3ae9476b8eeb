#![deny(unsafe_code)]

//! Configuration loading and validation for Parlance.
//!
//! Loads TOML configuration files and validates them against expected schemas.
//! Provides the [`AppConfig`] type as the central configuration structure and
//! [`ProviderKind`], the closed set of LLM providers the client can talk to.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// The hosted LLM providers Parlance supports.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI Chat Completions.
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
    /// Google Gemini `generateContent`.
    Gemini,
    /// Mistral (OpenAI-compatible chat completions).
    Mistral,
}

impl ProviderKind {
    /// Every supported provider, in display order.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Mistral,
    ];

    /// Stable lowercase identifier, as used in TOML and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
        }
    }

    /// Human-readable provider name.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Mistral => "Mistral",
        }
    }

    /// Model used when none has been selected for this provider.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Gemini => "gemini-1.5-flash",
            ProviderKind::Mistral => "mistral-small-latest",
        }
    }

    /// Conventional environment variable holding this provider's API key.
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "mistral" => Ok(ProviderKind::Mistral),
            other => Err(ConfigError::Validation(format!(
                "unknown provider {other:?}, expected one of openai, anthropic, gemini, mistral"
            ))),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Active provider, model, and generation settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Per-provider credentials and endpoints.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Context-window overrides: model id → window size (`"128K"`, `"8,192"`).
    #[serde(default)]
    pub models: BTreeMap<String, String>,

    /// Local history storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider used when no preference has been persisted yet.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model id. Empty means the provider's default model.
    #[serde(default)]
    pub model: String,

    /// Sampling temperature (0.0–2.0).
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Replaces the built-in system instruction when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: String::new(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    /// The configured model, or the provider default when none is set.
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Credentials and endpoint overrides for every provider.
///
/// ## TOML Example
///
/// ```toml
/// [providers.openai]
/// api_key_env = "WORK_OPENAI_KEY"
///
/// [providers.mistral]
/// base_url = "https://mistral.internal.example.com/v1/chat/completions"
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub anthropic: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub mistral: ProviderConfig,
}

impl ProvidersConfig {
    /// Settings for the given provider.
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Mistral => &self.mistral,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (ProviderKind, &ProviderConfig)> {
        ProviderKind::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

/// A single `[providers.<kind>]` table.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Inline API key. Never written back out; prefer `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable to read the API key from.
    /// Defaults to the provider's conventional variable (e.g. `OPENAI_API_KEY`).
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Endpoint override. A full chat URL for OpenAI, Anthropic and Mistral;
    /// the API root for Gemini.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding conversations and preferences.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    ".parlance".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be in [0.0, 2.0], got {}",
                self.llm.temperature
            )));
        }
        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.request_timeout_secs must be non-zero".to_string(),
            ));
        }
        if let Some(prompt) = &self.llm.system_prompt {
            if prompt.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "llm.system_prompt must not be blank when set".to_string(),
                ));
            }
        }

        for (kind, provider) in self.providers.iter() {
            if let Some(url) = &provider.base_url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Validation(format!(
                        "providers.{kind}.base_url must be an http(s) URL, got {url:?}"
                    )));
                }
            }
            if matches!(&provider.api_key_env, Some(var) if var.is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "providers.{kind}.api_key_env must not be empty"
                )));
            }
        }

        for (model, window) in &self.models {
            if model.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "models keys must not be empty".to_string(),
                ));
            }
            if window.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "models.{model:?} must name a context window size"
                )));
            }
        }

        if self.storage.data_dir.is_empty() {
            return Err(ConfigError::Validation(
                "storage.data_dir must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);
        assert_eq!(config.llm.effective_model(), "gpt-4o-mini");
        assert_eq!(config.llm.request_timeout_secs, 120);
        assert_eq!(config.storage.data_dir, ".parlance");
        assert_eq!(config.logging.level, "info");
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [llm]
            provider = "anthropic"
            model = "claude-3-5-haiku-20241022"
            temperature = 0.2
            request_timeout_secs = 30
            system_prompt = "Answer tersely."

            [providers.anthropic]
            api_key_env = "WORK_ANTHROPIC_KEY"

            [providers.mistral]
            base_url = "http://localhost:8080/v1/chat/completions"

            [models]
            "my-finetune" = "32K"
            "local-llama" = "8,192"

            [storage]
            data_dir = "/var/lib/parlance"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.llm.provider, ProviderKind::Anthropic);
        assert_eq!(config.llm.effective_model(), "claude-3-5-haiku-20241022");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.llm.request_timeout_secs, 30);
        assert_eq!(config.llm.system_prompt.as_deref(), Some("Answer tersely."));
        assert_eq!(
            config.providers.get(ProviderKind::Anthropic).api_key_env.as_deref(),
            Some("WORK_ANTHROPIC_KEY")
        );
        assert_eq!(
            config.providers.get(ProviderKind::Mistral).base_url.as_deref(),
            Some("http://localhost:8080/v1/chat/completions")
        );
        assert_eq!(config.models.get("my-finetune").unwrap(), "32K");
        assert_eq!(config.models.get("local-llama").unwrap(), "8,192");
        assert_eq!(config.storage.data_dir, "/var/lib/parlance");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!(" google ".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("MISTRAL".parse::<ProviderKind>().unwrap(), ProviderKind::Mistral);
        assert!("cohere".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_display_round_trips() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_provider_in_toml_is_rejected() {
        let toml = r#"
            [llm]
            provider = "cohere"
        "#;
        assert!(matches!(AppConfig::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_rejects_bad_temperature() {
        let toml = r#"
            [llm]
            temperature = 3.5
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [llm]
            request_timeout_secs = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_blank_system_prompt() {
        let toml = r#"
            [llm]
            system_prompt = "   "
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_non_http_base_url() {
        let toml = r#"
            [providers.openai]
            base_url = "ftp://example.com"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_api_key_env() {
        let toml = r#"
            [providers.gemini]
            api_key_env = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_blank_model_window() {
        let toml = r#"
            [models]
            "gpt-4o" = " "
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_empty_data_dir() {
        let toml = r#"
            [storage]
            data_dir = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "verbose"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_inline_api_key_is_not_serialized() {
        let toml = r#"
            [providers.openai]
            api_key = "sk-test-123"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(
            config.providers.get(ProviderKind::OpenAi).api_key.as_deref(),
            Some("sk-test-123")
        );
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("sk-test-123"));
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("parlance.toml");
        tokio::fs::write(&path, b"[llm]\nprovider = \"gemini\"\nmodel = \"gemini-1.5-pro\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.llm.provider, ProviderKind::Gemini);
        assert_eq!(config.llm.model, "gemini-1.5-pro");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(result.is_err());
    }

    // ── Error display ─────────────────────────────────────────────────

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
