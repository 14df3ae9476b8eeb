//! Context budgeting: fit a conversation into a model's window.
//!
//! The usable budget for a request is
//!
//! ```text
//! floor(window * SAFETY_FACTOR) - MAX_RESPONSE_TOKENS - system_tokens
//! ```
//!
//! If the whole history fits it is sent unchanged. Otherwise the newest
//! message is always kept and older messages are prepended, newest first,
//! until the first one that would overflow. The walk stops there, so the
//! result is always a contiguous suffix of the history.

use tracing::debug;

use crate::conversation::Message;
use crate::llm::ChatMessage;
use crate::tokens::{MESSAGE_OVERHEAD_TOKENS, estimate_messages_tokens, estimate_tokens};

use super::models::{ModelTable, WindowLookup};

/// Tokens held back for the model's reply.
pub const MAX_RESPONSE_TOKENS: u32 = 2048;

/// Fraction of the nominal window treated as usable.
pub const SAFETY_FACTOR: f64 = 0.9;

/// System instruction sent at the head of every request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer clearly and concisely, and say so when you are unsure.";

/// An API-ready message list for one outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetedRequest {
    /// System message first, then a contiguous suffix of the history.
    pub messages: Vec<ChatMessage>,
    /// Estimated tokens of `messages`, system message included.
    pub estimated_tokens: usize,
    /// Budget for history after the system message. Negative for windows
    /// too small to hold the reply reservation.
    pub available_tokens: i64,
    /// The window lookup the budget was derived from.
    pub window: WindowLookup,
    /// Number of older history messages left out.
    pub dropped: usize,
}

impl BudgetedRequest {
    /// The history part of the request (everything after the system message).
    pub fn history(&self) -> &[ChatMessage] {
        self.messages.get(1..).unwrap_or_default()
    }

    /// Whether the estimate stays within the budget. Only false when the
    /// newest message alone is larger than the budget.
    pub fn within_budget(&self) -> bool {
        let system = self
            .messages
            .first()
            .map(|m| estimate_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
            .unwrap_or(0);
        (self.estimated_tokens - system) as i64 <= self.available_tokens
    }
}

/// Builds budgeted requests against a model table.
///
/// Pure and synchronous; safe to share between conversations.
#[derive(Debug, Clone)]
pub struct ContextBudgeter {
    models: ModelTable,
    system_message: ChatMessage,
}

impl Default for ContextBudgeter {
    fn default() -> Self {
        Self::new(ModelTable::builtin())
    }
}

impl ContextBudgeter {
    /// Create a budgeter using [`DEFAULT_SYSTEM_PROMPT`].
    pub fn new(models: ModelTable) -> Self {
        Self {
            models,
            system_message: ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
        }
    }

    /// Replace the system instruction. It stays fixed for every call.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_message = ChatMessage::system(prompt);
        self
    }

    pub fn system_message(&self) -> &ChatMessage {
        &self.system_message
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    /// Budget a stored conversation history for `model_id`.
    ///
    /// Message metadata (ids, timestamps, error flags) is stripped.
    pub fn budget(&self, history: &[Message], model_id: &str) -> BudgetedRequest {
        let mapped: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();
        self.budget_messages(&mapped, model_id)
    }

    /// Budget bare chat messages for `model_id`.
    pub fn budget_messages(&self, history: &[ChatMessage], model_id: &str) -> BudgetedRequest {
        let window = self.models.lookup(model_id);
        if let WindowLookup::NotFound(default) = window {
            debug!(
                model = model_id,
                window = default,
                "unknown model, using default context window"
            );
        }

        let max_context = (f64::from(window.window()) * SAFETY_FACTOR).floor() as i64
            - i64::from(MAX_RESPONSE_TOKENS);
        let system_tokens = estimate_messages_tokens(std::slice::from_ref(&self.system_message));
        let available = max_context - system_tokens as i64;

        let total = estimate_messages_tokens(history);
        let (start, selected_tokens) = if history.is_empty() || total as i64 <= available {
            (0, total)
        } else {
            select_suffix(history, available)
        };

        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(self.system_message.clone());
        messages.extend_from_slice(&history[start..]);

        debug!(
            model = model_id,
            window = window.window(),
            available,
            total,
            kept = history.len() - start,
            dropped = start,
            "budgeted request"
        );

        BudgetedRequest {
            messages,
            estimated_tokens: system_tokens + selected_tokens,
            available_tokens: available,
            window,
            dropped: start,
        }
    }
}

/// Greedy suffix selection over a non-empty history.
///
/// Returns the start index of the kept suffix and its estimated tokens.
fn select_suffix(history: &[ChatMessage], available: i64) -> (usize, usize) {
    let cost = |m: &ChatMessage| estimate_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS;

    let mut start = history.len() - 1;
    let mut used = cost(&history[start]);

    for index in (0..start).rev() {
        let candidate = cost(&history[index]);
        if (used + candidate) as i64 > available {
            break;
        }
        used += candidate;
        start = index;
    }
    (start, used)
}
