//! Approximate token counting.
//!
//! No tokenizer ships with the client, so counts are estimated from word
//! counts. The estimate is deliberately on the high side and is paired with
//! the safety factor in [`crate::context::budget`].

use crate::llm::ChatMessage;

/// Empirical tokens-per-word ratio.
pub const WORD_TOKEN_RATIO: f64 = 1.3;

/// Per-message framing cost (role and metadata tokens added by chat APIs).
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count of a piece of text.
///
/// Whitespace-only input counts as zero words.
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    (words as f64 * WORD_TOKEN_RATIO).ceil() as usize
}

/// Estimate the token count of a message list, including per-message overhead.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
        .sum()
}
