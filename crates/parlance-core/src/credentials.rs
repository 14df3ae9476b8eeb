//! API key handling.
//!
//! Keys are resolved from the config file or the environment, never logged,
//! redacted in `Debug` output, and zeroized when dropped.

use std::fmt;

use parlance_config::{ProviderConfig, ProviderKind};
use zeroize::Zeroize;

/// Errors from resolving provider credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no API key for {provider}: set {env_var} or providers.{provider}.api_key")]
    Missing {
        provider: ProviderKind,
        env_var: String,
    },
}

/// A provider API key.
#[derive(Clone)]
pub struct ApiKey {
    inner: String,
}

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// The raw key, for the HTTP transport only.
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("inner", &"[REDACTED]")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl Drop for ApiKey {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ApiKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Resolve the API key for `kind`.
///
/// Order: inline `api_key`, then `api_key_env`, then the provider's
/// conventional variable. Blank values are treated as missing.
pub fn resolve_api_key(
    kind: ProviderKind,
    config: &ProviderConfig,
) -> Result<ApiKey, CredentialError> {
    resolve_with(kind, config, |var| std::env::var(var).ok())
}

fn resolve_with(
    kind: ProviderKind,
    config: &ProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ApiKey, CredentialError> {
    if let Some(key) = config.api_key.as_deref().map(str::trim) {
        if !key.is_empty() {
            return Ok(ApiKey::new(key));
        }
    }

    let env_var = config
        .api_key_env
        .clone()
        .unwrap_or_else(|| kind.default_api_key_env().to_string());

    match lookup(&env_var) {
        Some(value) if !value.trim().is_empty() => Ok(ApiKey::new(value.trim())),
        _ => Err(CredentialError::Missing {
            provider: kind,
            env_var,
        }),
    }
}
