//! Plain-text rendering for command output.

use std::fmt::Write;

use parlance_config::ProviderKind;
use parlance_core::context::{BudgetedRequest, DEFAULT_CONTEXT_WINDOW, ModelTable};
use parlance_core::tokens::{MESSAGE_OVERHEAD_TOKENS, estimate_tokens};
use parlance_core::{Conversation, Message};

const PREVIEW_CHARS: usize = 60;

/// Summary of a budgeting dry run, one line per message sent.
pub fn budget_report(request: &BudgetedRequest, model: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "model:      {model}");
    let _ = writeln!(out, "window:     {}", request.window);
    let _ = writeln!(out, "available:  {}", request.available_tokens);
    let _ = writeln!(out, "estimated:  {}", request.estimated_tokens);
    let _ = writeln!(
        out,
        "messages:   {} sent, {} dropped",
        request.history().len(),
        request.dropped
    );
    if !request.within_budget() {
        let _ = writeln!(out, "warning:    newest message alone exceeds the budget");
    }
    for message in &request.messages {
        let tokens = estimate_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS;
        let _ = writeln!(
            out,
            "  {:>9} {:>6}  {}",
            message.role.as_str(),
            tokens,
            preview(&message.content)
        );
    }
    out
}

/// Catalog listing with effective windows. `active` is marked with `*`.
pub fn model_list(table: &ModelTable, provider: Option<ProviderKind>, active: &str) -> String {
    let mut out = String::new();
    for kind in ProviderKind::ALL {
        if provider.is_some_and(|p| p != kind) {
            continue;
        }
        let _ = writeln!(out, "{}:", kind.display_name());
        for model in table.models_for(kind) {
            let marker = if model.id == active { '*' } else { ' ' };
            let window = match model.context_window {
                Some(window) => window.to_string(),
                None => format!("unknown ({DEFAULT_CONTEXT_WINDOW} assumed)"),
            };
            let _ = writeln!(out, " {marker} {:<28} {window}", model.id);
        }
    }
    out
}

/// One line per conversation: short id, last update, size, title.
pub fn conversation_list(conversations: &[Conversation], active: Option<&Conversation>) -> String {
    if conversations.is_empty() {
        return "no conversations yet\n".to_string();
    }
    let mut out = String::new();
    for conversation in conversations {
        let marker = if active.is_some_and(|a| a.id == conversation.id) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {}  {}  {:>3} msgs  {}",
            short_id(conversation),
            conversation.updated_at.format("%Y-%m-%d %H:%M"),
            conversation.messages.len(),
            conversation.display_title()
        );
    }
    out
}

/// Full transcript of a conversation.
pub fn transcript(conversation: &Conversation) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({} / {})",
        conversation.display_title(),
        conversation.provider.display_name(),
        conversation.model
    );
    for message in &conversation.messages {
        let _ = writeln!(out, "\n{}", message_header(message));
        let _ = writeln!(out, "{}", message.content);
    }
    out
}

pub fn message_header(message: &Message) -> String {
    let mut header = format!("[{}]", message.role);
    if let Some(model) = &message.model {
        let _ = write!(header, " {model}");
    }
    if message.error {
        header.push_str(" (error)");
    }
    header
}

pub fn short_id(conversation: &Conversation) -> String {
    conversation.id.to_string().chars().take(8).collect()
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_core::ContextBudgeter;
    use parlance_core::llm::ChatMessage;
    use parlance_test_utils::fixtures::words;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_budget_report_mentions_default_window() {
        let budgeter = ContextBudgeter::default();
        let request = budgeter.budget_messages(&[ChatMessage::user("hi")], "mystery");
        let report = budget_report(&request, "mystery");
        assert!(report.contains("window:     8192 (default)"));
        assert!(report.contains("1 sent, 0 dropped"));
        assert!(!report.contains("warning"));
    }

    #[test]
    fn test_budget_report_warns_on_oversized_message() {
        let budgeter = ContextBudgeter::default();
        let request = budgeter.budget_messages(&[ChatMessage::user(words(6000))], "gpt-4");
        assert!(budget_report(&request, "gpt-4").contains("warning"));
    }

    #[test]
    fn test_model_list_filters_and_marks_active() {
        let table = ModelTable::builtin();
        let listing = model_list(&table, Some(ProviderKind::Mistral), "mistral-small-latest");
        assert!(listing.starts_with("Mistral:\n"));
        assert!(!listing.contains("gpt-4o"));
        assert!(listing.contains(" * mistral-small-latest"));
        assert!(listing.contains("unknown (8192 assumed)"));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short\n text"), "short text");
        let long = preview(&words(40));
        assert_eq!(long.chars().count(), PREVIEW_CHARS);
        assert!(long.ends_with("..."));
    }

    #[test]
    fn test_message_header() {
        let failure = Message::failure("timeout", Some("gpt-4o".to_string()));
        assert_eq!(message_header(&failure), "[assistant] gpt-4o (error)");
        assert_eq!(message_header(&Message::user("hi")), "[user]");
    }

    #[test]
    fn test_empty_conversation_list() {
        assert_eq!(conversation_list(&[], None), "no conversations yet\n");
    }
}
