//! Chat session: one budgeted provider call per user turn.
//!
//! The session appends the user's message, budgets the history snapshot,
//! makes a single `chat` call, and appends either the reply or an
//! error-flagged assistant message with the failure text. Nothing is retried.

use std::time::Duration;

use parlance_config::{AppConfig, ProviderKind};
use tracing::{info, warn};

use crate::context::{
    BudgetedRequest, ContextBudgeter, MAX_RESPONSE_TOKENS, ModelTable, ModelTableError,
};
use crate::conversation::{Conversation, Message};
use crate::credentials::{CredentialError, resolve_api_key};
use crate::events::{ChatEvent, EventBus};
use crate::llm::{ChatRequest, LlmError, LlmProvider, create_provider};

/// Errors from the chat session.
///
/// Provider failures are not errors here; they become assistant messages.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyInput,

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Models(#[from] ModelTableError),

    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// Build the provider for `kind` from configuration.
///
/// Resolves the API key and applies the endpoint override and request
/// timeout.
pub fn connect_provider(
    config: &AppConfig,
    kind: ProviderKind,
) -> Result<Box<dyn LlmProvider>, ChatError> {
    let settings = config.providers.get(kind);
    let api_key = resolve_api_key(kind, settings)?;
    let timeout = Duration::from_secs(config.llm.request_timeout_secs);
    Ok(create_provider(kind, settings, api_key, timeout)?)
}

/// Build the budgeter described by configuration: built-in catalog plus
/// `[models]` overrides, and the configured system prompt if any.
pub fn budgeter_from_config(config: &AppConfig) -> Result<ContextBudgeter, ModelTableError> {
    let models = ModelTable::builtin().with_overrides(&config.models)?;
    let budgeter = ContextBudgeter::new(models);
    Ok(match &config.llm.system_prompt {
        Some(prompt) => budgeter.with_system_prompt(prompt.clone()),
        None => budgeter,
    })
}

/// Orchestrates turns against one provider.
pub struct ChatSession {
    provider: Box<dyn LlmProvider>,
    budgeter: ContextBudgeter,
    model: String,
    temperature: f32,
    events: EventBus,
}

impl ChatSession {
    /// Create a session using the provider's default model.
    pub fn new(
        provider: Box<dyn LlmProvider>,
        budgeter: ContextBudgeter,
        events: EventBus,
    ) -> Self {
        let model = provider.kind().default_model().to_string();
        Self {
            provider,
            budgeter,
            model,
            temperature: ChatRequest::default().temperature,
            events,
        }
    }

    /// Create a session for `kind` and `model` from configuration.
    pub fn from_config(
        config: &AppConfig,
        kind: ProviderKind,
        model: &str,
        events: EventBus,
    ) -> Result<Self, ChatError> {
        let provider = connect_provider(config, kind)?;
        let budgeter = budgeter_from_config(config)?;
        Ok(Self::new(provider, budgeter, events)
            .with_model(model)
            .with_temperature(config.llm.temperature))
    }

    /// Set the model without publishing an event. Empty keeps the default.
    pub fn with_model(mut self, model: &str) -> Self {
        if !model.is_empty() {
            self.model = model.to_string();
        }
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn budgeter(&self) -> &ContextBudgeter {
        &self.budgeter
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Switch models and publish [`ChatEvent::ModelChanged`].
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        info!(model = %self.model, "model changed");
        self.events.publish(ChatEvent::ModelChanged {
            model: self.model.clone(),
        });
    }

    /// Switch providers. The model resets to the new provider's default.
    ///
    /// Publishes [`ChatEvent::ProviderChanged`] then [`ChatEvent::ModelChanged`].
    pub fn set_provider(&mut self, provider: Box<dyn LlmProvider>) {
        let kind = provider.kind();
        self.provider = provider;
        info!(provider = %kind, "provider changed");
        self.events.publish(ChatEvent::ProviderChanged { provider: kind });
        self.set_model(kind.default_model());
    }

    /// Budget the conversation as it stands, without sending anything.
    pub fn preview(&self, conversation: &Conversation) -> BudgetedRequest {
        self.budgeter.budget(conversation.history(), &self.model)
    }

    /// Run one turn: append `text`, call the provider once, append the
    /// outcome. Returns the appended assistant message.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Message, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let user = Message::user(text);
        conversation.push(user.clone());
        self.events.publish(ChatEvent::MessageAppended {
            conversation: conversation.id,
            message: user,
        });

        let budgeted = self.preview(conversation);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: budgeted.messages,
            max_tokens: MAX_RESPONSE_TOKENS,
            temperature: self.temperature,
        };

        let reply = match self.provider.chat(&request).await {
            Ok(response) => {
                info!(
                    provider = self.provider.name(),
                    model = %response.model,
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    "reply received"
                );
                Message::assistant(response.content, Some(response.model))
            }
            Err(e) => {
                let error = e.to_string();
                warn!(
                    provider = self.provider.name(),
                    model = %self.model,
                    error = %error,
                    "chat request failed"
                );
                self.events.publish(ChatEvent::RequestFailed {
                    conversation: conversation.id,
                    error: error.clone(),
                });
                Message::failure(error, Some(self.model.clone()))
            }
        };

        conversation.push(reply.clone());
        self.events.publish(ChatEvent::MessageAppended {
            conversation: conversation.id,
            message: reply.clone(),
        });
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::BoxFuture;
    use crate::llm::{ChatResponse, LlmError, Role, TokenUsage};
    use pretty_assertions::assert_eq;

    /// Answers every request with one fixed outcome and remembers the requests.
    struct FixedProvider {
        outcome: Result<String, LlmError>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl FixedProvider {
        fn new(outcome: Result<String, LlmError>) -> Self {
            Self {
                outcome,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "Fixed"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
            self.seen.lock().unwrap().push(request.clone());
            let outcome = self.outcome.clone().map(|content| ChatResponse {
                content,
                finish_reason: "stop".to_string(),
                usage: TokenUsage::default(),
                model: request.model.clone(),
            });
            Box::pin(async move { outcome })
        }
    }

    fn conversation() -> Conversation {
        Conversation::new(ProviderKind::OpenAi, "gpt-4o")
    }

    #[tokio::test]
    async fn test_send_appends_user_and_reply() {
        let session = ChatSession::new(
            Box::new(FixedProvider::new(Ok("Hi!".to_string()))),
            ContextBudgeter::default(),
            EventBus::new(),
        );
        let mut conversation = conversation();

        let reply = session.send(&mut conversation, "Hello").await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.model.as_deref(), Some("gpt-4o-mini"));
        assert!(!reply.error);
    }

    #[tokio::test]
    async fn test_failure_becomes_error_message() {
        let session = ChatSession::new(
            Box::new(FixedProvider::new(Err(LlmError::Timeout))),
            ContextBudgeter::default(),
            EventBus::new(),
        );
        let mut rx = session.events().subscribe();
        let mut conversation = conversation();

        let reply = session.send(&mut conversation, "Hello").await.unwrap();
        assert!(reply.error);
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, LlmError::Timeout.to_string());
        assert_eq!(conversation.messages.len(), 2);

        assert!(matches!(rx.recv().await.unwrap(), ChatEvent::MessageAppended { .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            ChatEvent::RequestFailed {
                conversation: conversation.id,
                error: "timeout".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected() {
        let session = ChatSession::new(
            Box::new(FixedProvider::new(Ok("unused".to_string()))),
            ContextBudgeter::default(),
            EventBus::new(),
        );
        let mut conversation = conversation();
        let err = session.send(&mut conversation, "  \n ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyInput));
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn test_set_model_publishes() {
        let mut session = ChatSession::new(
            Box::new(FixedProvider::new(Ok(String::new()))),
            ContextBudgeter::default(),
            EventBus::new(),
        );
        let mut rx = session.events().subscribe();
        session.set_model("gpt-4");
        assert_eq!(session.model(), "gpt-4");
        assert_eq!(
            rx.try_recv().unwrap(),
            ChatEvent::ModelChanged {
                model: "gpt-4".to_string()
            }
        );
    }

    #[test]
    fn test_budgeter_from_config() {
        let config = AppConfig::parse(
            r#"
[llm]
system_prompt = "Be terse."

[models]
"local-model" = "16K"
"#,
        )
        .unwrap();
        let budgeter = budgeter_from_config(&config).unwrap();
        assert_eq!(budgeter.system_message().content, "Be terse.");
        assert_eq!(budgeter.models().lookup("local-model").window(), 16_000);
    }
}
