//! Model catalog and context-window lookup.
//!
//! Windows are declared the way provider docs print them (`"128K"`,
//! `"8,192"`, `"2M"`) and parsed once when the table is built. Lookups are
//! total: an id without a known window resolves to
//! [`WindowLookup::NotFound`] carrying [`DEFAULT_CONTEXT_WINDOW`].

use std::collections::BTreeMap;
use std::fmt;

use parlance_config::ProviderKind;
use serde::Serialize;

/// Window assumed for models the table knows nothing about.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 8192;

/// Errors building a [`ModelTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelTableError {
    #[error("invalid context window {value:?} for model {model:?}")]
    InvalidWindow { model: String, value: String },
}

/// Static metadata about one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: ProviderKind,
    /// Total tokens (prompt + completion) accepted. `None` when unknown.
    pub context_window: Option<u32>,
}

/// Result of a window lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WindowLookup {
    /// The table has a window for this model.
    Found(u32),
    /// Unknown model (or unknown window); carries the fallback size.
    NotFound(u32),
}

impl WindowLookup {
    /// The effective window size, whichever branch was taken.
    pub fn window(self) -> u32 {
        match self {
            WindowLookup::Found(w) | WindowLookup::NotFound(w) => w,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, WindowLookup::Found(_))
    }
}

impl fmt::Display for WindowLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowLookup::Found(w) => write!(f, "{w}"),
            WindowLookup::NotFound(w) => write!(f, "{w} (default)"),
        }
    }
}

/// Built-in catalog: `(model id, provider, window shorthand)`.
const CATALOG: &[(&str, ProviderKind, Option<&str>)] = &[
    ("gpt-4o", ProviderKind::OpenAi, Some("128K")),
    ("gpt-4o-mini", ProviderKind::OpenAi, Some("128K")),
    ("gpt-4-turbo", ProviderKind::OpenAi, Some("128K")),
    ("gpt-4", ProviderKind::OpenAi, Some("8,192")),
    ("gpt-3.5-turbo", ProviderKind::OpenAi, Some("16,385")),
    ("o1-mini", ProviderKind::OpenAi, Some("128K")),
    ("claude-3-5-sonnet-20241022", ProviderKind::Anthropic, Some("200K")),
    ("claude-3-5-haiku-20241022", ProviderKind::Anthropic, Some("200K")),
    ("claude-3-opus-20240229", ProviderKind::Anthropic, Some("200K")),
    ("claude-3-haiku-20240307", ProviderKind::Anthropic, Some("200K")),
    ("gemini-1.5-pro", ProviderKind::Gemini, Some("2M")),
    ("gemini-1.5-flash", ProviderKind::Gemini, Some("1M")),
    ("gemini-1.5-flash-8b", ProviderKind::Gemini, Some("1M")),
    ("gemini-1.0-pro", ProviderKind::Gemini, Some("30,720")),
    ("mistral-large-latest", ProviderKind::Mistral, Some("128K")),
    ("mistral-small-latest", ProviderKind::Mistral, Some("32K")),
    ("open-mistral-nemo", ProviderKind::Mistral, Some("128K")),
    ("codestral-latest", ProviderKind::Mistral, Some("32K")),
    ("mistral-medium-latest", ProviderKind::Mistral, None),
];

/// Parse a context-window size such as `"128K"`, `"8,192"` or `"1.5M"`.
///
/// Commas are ignored and the `K`/`M` suffix is case-insensitive. A decimal
/// mantissa is scaled by the suffix and truncated. Returns `None` for empty,
/// zero, negative, non-numeric or out-of-range input.
pub fn parse_context_window(input: &str) -> Option<u32> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();

    let (number, multiplier) = match cleaned.chars().last()? {
        'k' | 'K' => (&cleaned[..cleaned.len() - 1], 1_000u64),
        'm' | 'M' => (&cleaned[..cleaned.len() - 1], 1_000_000u64),
        _ => (cleaned.as_str(), 1u64),
    };
    let number = number.trim_end();

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(multiplier)?;

    let mut scale = multiplier;
    for digit in fraction.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        value = value.checked_add(u64::from(digit - b'0') * scale)?;
    }

    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Closed lookup from model id to context window.
#[derive(Debug, Clone)]
pub struct ModelTable {
    catalog: Vec<ModelDescriptor>,
    windows: BTreeMap<String, Option<u32>>,
    default_window: u32,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelTable {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let catalog: Vec<ModelDescriptor> = CATALOG
            .iter()
            .map(|(id, provider, window)| ModelDescriptor {
                id: (*id).to_string(),
                provider: *provider,
                context_window: window.and_then(parse_context_window),
            })
            .collect();
        let windows = catalog
            .iter()
            .map(|d| (d.id.clone(), d.context_window))
            .collect();
        Self {
            catalog,
            windows,
            default_window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Apply `[models]` overrides (model id → window shorthand).
    ///
    /// Overrides may name models outside the catalog.
    pub fn with_overrides(
        mut self,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, ModelTableError> {
        for (model, value) in overrides {
            let window =
                parse_context_window(value).ok_or_else(|| ModelTableError::InvalidWindow {
                    model: model.clone(),
                    value: value.clone(),
                })?;
            self.windows.insert(model.clone(), Some(window));
            if let Some(descriptor) = self.catalog.iter_mut().find(|d| &d.id == model) {
                descriptor.context_window = Some(window);
            }
        }
        Ok(self)
    }

    /// Look up a model's context window.
    pub fn lookup(&self, model_id: &str) -> WindowLookup {
        match self.windows.get(model_id) {
            Some(Some(window)) => WindowLookup::Found(*window),
            Some(None) | None => WindowLookup::NotFound(self.default_window),
        }
    }

    /// Catalog entries for one provider, in declaration order.
    pub fn models_for(&self, provider: ProviderKind) -> Vec<&ModelDescriptor> {
        self.catalog
            .iter()
            .filter(|d| d.provider == provider)
            .collect()
    }

    /// Whether the id appears in the catalog or the overrides.
    pub fn contains(&self, model_id: &str) -> bool {
        self.windows.contains_key(model_id)
    }
}
