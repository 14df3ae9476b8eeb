//! Context management: model windows and request budgeting.
//!
//! Two layers:
//!
//! 1. **Model table**: the catalog of known models and their context
//!    windows, with config overrides and a default for unknown ids.
//!
//! 2. **Budgeter**: trims a conversation to the newest messages that fit
//!    the window, after reserving room for the reply and the system prompt.
//!
//! ```text
//! history ──▶ ContextBudgeter ──▶ BudgetedRequest ──▶ LlmProvider
//!                   │
//!                   ▼
//!              ModelTable ──▶ Found(window) | NotFound(8192)
//! ```

pub mod budget;
pub mod models;

pub use budget::{
    BudgetedRequest, ContextBudgeter, DEFAULT_SYSTEM_PROMPT, MAX_RESPONSE_TOKENS, SAFETY_FACTOR,
};
pub use models::{
    DEFAULT_CONTEXT_WINDOW, ModelDescriptor, ModelTable, ModelTableError, WindowLookup,
    parse_context_window,
};
