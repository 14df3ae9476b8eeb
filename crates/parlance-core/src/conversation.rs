//! Conversations, their messages, and persisted preferences.
//!
//! [`ConversationStore`] is a typed repository over any [`KeyValueStore`].
//! Each conversation is one JSON value under `conversation-<uuid>`; the
//! active provider and model live under `preferences`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parlance_config::ProviderKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm::{ChatMessage, Role};
use crate::store::{KeyValueStore, StoreError};

const CONVERSATION_PREFIX: &str = "conversation-";
const PREFERENCES_KEY: &str = "preferences";
const TITLE_MAX_CHARS: usize = 40;

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Model that produced an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Set when this assistant turn reports a failed request.
    #[serde(default)]
    pub error: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            model: None,
            error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, model: Option<String>) -> Self {
        Self {
            model,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// An assistant turn carrying a failure shown to the user.
    pub fn failure(error: impl Into<String>, model: Option<String>) -> Self {
        Self {
            error: true,
            ..Self::assistant(error, model)
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        ChatMessage::new(message.role, message.content.clone())
    }
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    /// Empty until the first user message, unless set explicitly.
    #[serde(default)]
    pub title: String,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            provider,
            model: model.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message. The first user message names an untitled conversation.
    pub fn push(&mut self, message: Message) {
        if self.title.is_empty() && message.role == Role::User {
            self.title = derive_title(&message.content);
        }
        self.updated_at = message.created_at.max(self.updated_at);
        self.messages.push(message);
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Utc::now();
    }

    /// Drop every message but keep the conversation and its title.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled"
        } else {
            &self.title
        }
    }

    fn key(&self) -> String {
        conversation_key(self.id)
    }
}

/// Collapse whitespace and keep the first 40 characters.
fn derive_title(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(TITLE_MAX_CHARS)
        .collect()
}

fn conversation_key(id: Uuid) -> String {
    format!("{CONVERSATION_PREFIX}{id}")
}

/// The persisted provider/model selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub provider: ProviderKind,
    /// Empty means the provider's default model.
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub active_conversation: Option<Uuid>,
}

impl Preferences {
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }
}

/// Typed repository for conversations and preferences.
#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationStore {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn from_shared(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let json = serde_json::to_string(conversation)?;
        self.store.set(&conversation.key(), json).await?;
        debug!(
            conversation = %conversation.id,
            messages = conversation.messages.len(),
            "saved conversation"
        );
        Ok(())
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        match self.store.get(&conversation_key(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// All conversations, most recently updated first.
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let mut conversations = Vec::new();
        for key in self.store.keys().await? {
            if !key.starts_with(CONVERSATION_PREFIX) {
                continue;
            }
            let Some(json) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<Conversation>(&json) {
                Ok(conversation) => conversations.push(conversation),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable conversation"),
            }
        }
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    /// Resolve a full id or a unique id prefix.
    pub async fn find(&self, id_or_prefix: &str) -> Result<Option<Conversation>, StoreError> {
        if let Ok(id) = Uuid::parse_str(id_or_prefix) {
            return self.load(id).await;
        }
        let prefix = id_or_prefix.to_ascii_lowercase();
        let mut matches: Vec<Conversation> = self
            .list()
            .await?
            .into_iter()
            .filter(|c| !prefix.is_empty() && c.id.to_string().starts_with(&prefix))
            .collect();
        if matches.len() == 1 {
            Ok(matches.pop())
        } else {
            Ok(None)
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.remove(&conversation_key(id)).await?;
        debug!(conversation = %id, "deleted conversation");
        Ok(())
    }

    /// Empty a conversation's messages. Returns the cleared conversation.
    pub async fn clear_context(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let Some(mut conversation) = self.load(id).await? else {
            return Ok(None);
        };
        conversation.clear();
        self.save(&conversation).await?;
        Ok(Some(conversation))
    }

    pub async fn load_preferences(&self) -> Result<Option<Preferences>, StoreError> {
        match self.store.get(PREFERENCES_KEY).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn save_preferences(&self, preferences: &Preferences) -> Result<(), StoreError> {
        let json = serde_json::to_string(preferences)?;
        self.store.set(PREFERENCES_KEY, json).await
    }
}
