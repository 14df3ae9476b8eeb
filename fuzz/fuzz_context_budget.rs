//! Fuzz target for window parsing and context budgeting.
//!
//! Run with: cargo +nightly fuzz run fuzz_context_budget
//!
//! The first line is parsed as a context-window size; each remaining line
//! becomes one message. The budgeted output must keep the newest message
//! and be a contiguous suffix of the history.

#![no_main]

use std::collections::BTreeMap;

use libfuzzer_sys::fuzz_target;
use parlance_core::context::{ContextBudgeter, ModelTable, parse_context_window};
use parlance_core::llm::ChatMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let mut lines = s.split('\n');
    let window = lines.next().unwrap_or_default();

    let mut table = ModelTable::builtin();
    if let Some(parsed) = parse_context_window(window) {
        assert!(parsed > 0);
        let overrides = BTreeMap::from([("fuzz".to_string(), window.to_string())]);
        table = table.with_overrides(&overrides).expect("parsed window must be accepted");
    }

    let history: Vec<ChatMessage> = lines
        .enumerate()
        .map(|(i, line)| {
            if i % 2 == 0 {
                ChatMessage::user(line)
            } else {
                ChatMessage::assistant(line)
            }
        })
        .collect();

    let request = ContextBudgeter::new(table).budget_messages(&history, "fuzz");
    assert!(history.ends_with(request.history()));
    assert_eq!(request.history().last(), history.last());
    assert_eq!(request.dropped + request.history().len(), history.len());
});
