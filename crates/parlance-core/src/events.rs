//! Event bus for chat state changes.
//!
//! Replaces ambient cross-component signalling with an explicit broadcast
//! channel. Front ends subscribe; the chat session publishes.

use parlance_config::ProviderKind;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::conversation::Message;

const EVENT_CAPACITY: usize = 256;

/// A change observable by front ends.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A message was added to a conversation.
    MessageAppended { conversation: Uuid, message: Message },
    /// The active model changed.
    ModelChanged { model: String },
    /// The active provider changed.
    ProviderChanged { provider: ProviderKind },
    /// A conversation's messages were cleared.
    ContextCleared { conversation: Uuid },
    /// A conversation was removed.
    ConversationDeleted { conversation: Uuid },
    /// A provider call failed; `error` is the text shown to the user.
    RequestFailed { conversation: Uuid, error: String },
}

/// Broadcast bus for [`ChatEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChatEvent) {
        trace!(?event, "publishing chat event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
