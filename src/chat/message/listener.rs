//! Chat listener callback interface.

use crate::chat::error::ChatError;
use crate::chat::message::models::ChatMessage;
use async_trait::async_trait;

/// Callbacks fired by a chat synchronization unit.
#[async_trait]
pub trait ChatListener: Send + Sync {
    /// The displayable message list changed (initial fetch, refetch on a
    /// change signal, or an optimistic local append).
    async fn on_messages_changed(&self, messages: Vec<ChatMessage>);

    /// A sent message was accepted by the backend.
    async fn on_message_sent(&self, message: ChatMessage);

    /// A fetch or send failed.
    async fn on_error(&self, error: ChatError);
}

/// Default no-op implementation.
pub struct EmptyChatListener;

#[async_trait]
impl ChatListener for EmptyChatListener {
    async fn on_messages_changed(&self, _messages: Vec<ChatMessage>) {}
    async fn on_message_sent(&self, _message: ChatMessage) {}
    async fn on_error(&self, _error: ChatError) {}
}
