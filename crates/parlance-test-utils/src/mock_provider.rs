//! Scripted [`LlmProvider`] for tests.
//!
//! Replies are consumed in order; every request is recorded. Clones share
//! state, so a test can hand one clone to a session and inspect the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use parlance_config::ProviderKind;
use parlance_core::BoxFuture;
use parlance_core::llm::{ChatRequest, ChatResponse, LlmError, LlmProvider, TokenUsage};

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String, LlmError>>,
    requests: Vec<ChatRequest>,
}

/// A provider that answers from a queue of scripted outcomes.
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    script: Arc<Mutex<Script>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Queue a successful reply.
    pub fn reply(self, content: &str) -> Self {
        self.push(Ok(content.to_string()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, outcome: Result<String, LlmError>) {
        self.script
            .lock()
            .expect("mock provider lock poisoned")
            .replies
            .push_back(outcome);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script
            .lock()
            .expect("mock provider lock poisoned")
            .requests
            .clone()
    }

    /// Scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .expect("mock provider lock poisoned")
            .replies
            .len()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "Mock"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let outcome = {
            let mut script = self.script.lock().expect("mock provider lock poisoned");
            script.requests.push(request.clone());
            script
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Request("no scripted reply left".to_string())))
        };
        let model = request.model.clone();
        Box::pin(async move {
            outcome.map(|content| ChatResponse {
                content,
                finish_reason: "stop".to_string(),
                usage: TokenUsage::default(),
                model,
            })
        })
    }
}
