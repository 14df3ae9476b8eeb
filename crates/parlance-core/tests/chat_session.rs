//! End-to-end turns through `ChatSession` with a scripted provider.

use parlance_config::ProviderKind;
use parlance_core::context::ContextBudgeter;
use parlance_core::llm::{LlmError, Role};
use parlance_core::{ChatEvent, ChatSession, Conversation, EventBus, ModelTable};
use parlance_test_utils::fixtures::{alternating_history, conversation_with, words};
use parlance_test_utils::{MockProvider, TestWorkspace};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn session(mock: &MockProvider) -> ChatSession {
    ChatSession::new(
        Box::new(mock.clone()),
        ContextBudgeter::default(),
        EventBus::new(),
    )
}

#[test_log::test(tokio::test)]
async fn each_turn_appends_exactly_two_messages() {
    let mock = MockProvider::new(ProviderKind::OpenAi)
        .reply("First answer")
        .reply("Second answer");
    let session = session(&mock);
    let mut conversation = Conversation::new(ProviderKind::OpenAi, "gpt-4o-mini");

    session.send(&mut conversation, "First question").await.unwrap();
    assert_eq!(conversation.messages.len(), 2);
    session.send(&mut conversation, "Second question").await.unwrap();
    assert_eq!(conversation.messages.len(), 4);

    let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(conversation.title, "First question");
    assert_eq!(mock.remaining(), 0);
}

#[tokio::test]
async fn request_carries_system_prompt_and_history() {
    let mock = MockProvider::new(ProviderKind::OpenAi).reply("ok").reply("ok");
    let session = session(&mock).with_temperature(0.2);
    let mut conversation = Conversation::new(ProviderKind::OpenAi, "gpt-4o-mini");

    session.send(&mut conversation, "one").await.unwrap();
    session.send(&mut conversation, "two").await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    let last = &requests[1];
    assert_eq!(last.model, "gpt-4o-mini");
    assert_eq!(last.max_tokens, 2048);
    assert_eq!(last.temperature, 0.2);
    let contents: Vec<&str> = last.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents[1..], ["one", "ok", "two"]);
    assert_eq!(last.messages[0].role, Role::System);
}

#[tokio::test]
async fn long_history_is_trimmed_before_sending() {
    let mock = MockProvider::new(ProviderKind::OpenAi).reply("short");
    let overrides = BTreeMap::from([("tiny".to_string(), "4K".to_string())]);
    let budgeter = ContextBudgeter::new(ModelTable::builtin().with_overrides(&overrides).unwrap());
    let session = ChatSession::new(Box::new(mock.clone()), budgeter, EventBus::new())
        .with_model("tiny");

    let mut conversation = conversation_with(ProviderKind::OpenAi, alternating_history(100, 20));
    session.send(&mut conversation, &words(30)).await.unwrap();

    let sent = &mock.requests()[0].messages;
    assert!(sent.len() < conversation.messages.len());
    // The newest user turn is always last
    assert_eq!(sent.last().unwrap().content, words(30));
}

#[tokio::test]
async fn failures_are_recorded_verbatim_and_published() {
    let error = LlmError::Auth("invalid API key".to_string());
    let mock = MockProvider::new(ProviderKind::Anthropic).fail(error.clone());
    let session = session(&mock);
    let mut events = session.events().subscribe();
    let mut conversation = Conversation::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022");

    let reply = session.send(&mut conversation, "Hello?").await.unwrap();
    assert!(reply.error);
    assert_eq!(reply.content, error.to_string());

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), 3);
    assert!(matches!(received[0], ChatEvent::MessageAppended { .. }));
    assert_eq!(
        received[1],
        ChatEvent::RequestFailed {
            conversation: conversation.id,
            error: error.to_string(),
        }
    );
    assert!(matches!(
        &received[2],
        ChatEvent::MessageAppended { message, .. } if message.error
    ));
}

#[tokio::test]
async fn switching_provider_resets_model() {
    let mut session = session(&MockProvider::new(ProviderKind::OpenAi));
    let mut events = session.events().subscribe();

    session.set_provider(Box::new(MockProvider::new(ProviderKind::Gemini)));
    assert_eq!(session.provider_kind(), ProviderKind::Gemini);
    assert_eq!(session.model(), "gemini-1.5-flash");

    assert_eq!(
        events.recv().await.unwrap(),
        ChatEvent::ProviderChanged {
            provider: ProviderKind::Gemini
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ChatEvent::ModelChanged {
            model: "gemini-1.5-flash".to_string()
        }
    );
}

#[tokio::test]
async fn conversations_persist_across_stores() {
    let workspace = TestWorkspace::empty().await;
    let mock = MockProvider::new(ProviderKind::Mistral).reply("Bonjour");
    let session = session(&mock);

    let mut conversation = Conversation::new(ProviderKind::Mistral, "mistral-small-latest");
    session.send(&mut conversation, "Salut").await.unwrap();
    workspace.conversations().save(&conversation).await.unwrap();

    // A fresh store over the same directory sees the conversation
    let reopened = workspace
        .conversations()
        .load(conversation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reopened, conversation);
    assert_eq!(reopened.messages[1].content, "Bonjour");
}
