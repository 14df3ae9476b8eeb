#![deny(unsafe_code)]

//! Parlance core library.
//!
//! Token estimation, context budgeting, LLM provider clients, local
//! conversation storage, and the chat session that ties them together.
//! Front ends (the `parlance` CLI) drive a [`ChatSession`] and observe it
//! through the [`EventBus`].

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the return type for async trait
/// methods that must stay object-safe (`Box<dyn LlmProvider>`,
/// `Arc<dyn KeyValueStore>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Chat session: one budgeted provider call per user turn.
pub mod chat;
/// Model table and context budgeter.
pub mod context;
/// Conversations, messages, and persisted preferences.
pub mod conversation;
/// API key resolution and redaction.
pub mod credentials;
/// Broadcast bus for chat state changes.
pub mod events;
/// LLM provider integration (OpenAI, Anthropic, Gemini, Mistral).
pub mod llm;
/// Key-value persistence.
pub mod store;
/// Approximate token counting.
pub mod tokens;

pub use chat::{ChatError, ChatSession};
pub use context::{BudgetedRequest, ContextBudgeter, ModelTable, WindowLookup};
pub use conversation::{Conversation, ConversationStore, Message, Preferences};
pub use credentials::ApiKey;
pub use events::{ChatEvent, EventBus};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
