//! History fixtures.
//!
//! Token costs are easy to predict with these builders: a message of `n`
//! words costs `ceil(n * 1.3) + 4` estimated tokens.

use parlance_config::ProviderKind;
use parlance_core::conversation::{Conversation, Message};
use parlance_core::llm::ChatMessage;

/// `n` space-separated words.
pub fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

/// Alternating user/assistant messages, `pairs` of each, `words_each` words
/// per message. Each message is numbered so positions are recognisable.
pub fn alternating_history(pairs: usize, words_each: usize) -> Vec<Message> {
    let filler = words(words_each.saturating_sub(1));
    (0..pairs * 2)
        .map(|i| {
            let content = format!("m{i} {filler}").trim_end().to_string();
            if i % 2 == 0 {
                Message::user(content)
            } else {
                Message::assistant(content, None)
            }
        })
        .collect()
}

/// The same shape as [`alternating_history`], as bare chat messages.
pub fn alternating_chat(pairs: usize, words_each: usize) -> Vec<ChatMessage> {
    alternating_history(pairs, words_each)
        .iter()
        .map(ChatMessage::from)
        .collect()
}

/// `pairs` completed exchanges followed by one unanswered user message, the
/// shape a history has when it is budgeted for the next request.
pub fn awaiting_reply(pairs: usize, words_each: usize) -> Vec<Message> {
    let mut history = alternating_history(pairs, words_each);
    let filler = words(words_each.saturating_sub(1));
    let content = format!("m{} {filler}", pairs * 2).trim_end().to_string();
    history.push(Message::user(content));
    history
}

/// The same shape as [`awaiting_reply`], as bare chat messages.
pub fn awaiting_reply_chat(pairs: usize, words_each: usize) -> Vec<ChatMessage> {
    awaiting_reply(pairs, words_each)
        .iter()
        .map(ChatMessage::from)
        .collect()
}

/// A conversation pre-filled with `history`.
pub fn conversation_with(provider: ProviderKind, history: Vec<Message>) -> Conversation {
    let mut conversation = Conversation::new(provider, provider.default_model());
    for message in history {
        conversation.push(message);
    }
    conversation
}
