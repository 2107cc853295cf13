//! Chat synchronization unit.
//!
//! One instance per open conversation. Fetches the bidirectional thread
//! with the peer at construction and again on every change signal, and
//! sends messages with an optimistic local append that is reconciled
//! against the next authoritative refetch.

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::message::api::MessageApi;
use crate::chat::message::listener::ChatListener;
use crate::chat::message::models::ChatMessage;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    // Optimistically appended ids the server has not echoed back yet.
    pending: HashSet<Uuid>,
}

/// Keeps one conversation's message list current and exposes send.
///
/// Without a persisted local user id the unit is constructible but
/// degraded: fetch publishes an empty list and send fails with
/// [`ChatError::Degraded`].
pub struct ChatSyncer {
    api: MessageApi,
    listener: Arc<dyn ChatListener>,
    local_user_id: Option<Uuid>,
    peer_id: Uuid,
    state: Mutex<ChatState>,
}

impl ChatSyncer {
    pub fn new(
        api: MessageApi,
        local_user_id: Option<Uuid>,
        peer_id: Uuid,
        listener: Arc<dyn ChatListener>,
    ) -> Self {
        if local_user_id.is_none() {
            warn!("[ChatSync] no local user id, unit is degraded (peer {peer_id})");
        }
        Self {
            api,
            listener,
            local_user_id,
            peer_id,
            state: Mutex::new(ChatState::default()),
        }
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn is_degraded(&self) -> bool {
        self.local_user_id.is_none()
    }

    /// "Own" is decided by sender id alone, never by receiver.
    pub fn is_own(&self, message: &ChatMessage) -> bool {
        self.local_user_id == Some(message.sender)
    }

    /// Fetches the authoritative thread and publishes the reconciled
    /// list. In the degraded state this publishes an empty list.
    pub async fn refresh(&self) -> ChatResult<Vec<ChatMessage>> {
        let Some(local) = self.local_user_id else {
            self.listener.on_messages_changed(Vec::new()).await;
            return Ok(Vec::new());
        };

        let thread = self.api.fetch_thread(local, self.peer_id).await?;

        let merged = {
            let mut state = self.state.lock().await;
            // Drop pending marks for everything the server now returns.
            for message in &thread {
                state.pending.remove(&message.id);
            }
            let still_pending: Vec<ChatMessage> = state
                .messages
                .iter()
                .filter(|m| state.pending.contains(&m.id))
                .cloned()
                .collect();
            let merged = reconcile(thread, still_pending);
            state.messages = merged.clone();
            merged
        };

        debug!(
            "[ChatSync] published {} messages for peer {}",
            merged.len(),
            self.peer_id
        );
        self.listener.on_messages_changed(merged.clone()).await;
        Ok(merged)
    }

    /// Reacts to a change signal on the messages table.
    pub async fn on_change_signal(&self) {
        if let Err(e) = self.refresh().await {
            warn!("[ChatSync] refresh on change signal failed: {e}");
            self.listener.on_error(e).await;
        }
    }

    /// Sends a text message: optimistic local append and publish first,
    /// then the insert; on failure the appended entry is rolled back and
    /// the error published.
    pub async fn send(&self, text: &str) -> ChatResult<ChatMessage> {
        let local = self.local_user_id.ok_or(ChatError::Degraded)?;
        let message = ChatMessage::text(local, self.peer_id, text);

        let optimistic = {
            let mut state = self.state.lock().await;
            state.pending.insert(message.id);
            state.messages.push(message.clone());
            state.messages.clone()
        };
        self.listener.on_messages_changed(optimistic).await;

        match self.api.insert_message(&message).await {
            Ok(()) => {
                info!("[ChatSync] sent message {} to {}", message.id, self.peer_id);
                self.listener.on_message_sent(message.clone()).await;
                Ok(message)
            }
            Err(e) => {
                let rolled_back = {
                    let mut state = self.state.lock().await;
                    state.pending.remove(&message.id);
                    state.messages.retain(|m| m.id != message.id);
                    state.messages.clone()
                };
                warn!("[ChatSync] send failed, rolled back optimistic entry: {e}");
                self.listener.on_messages_changed(rolled_back).await;
                self.listener.on_error(e.clone()).await;
                Err(e)
            }
        }
    }

    /// Snapshot of the current displayable list.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().await.messages.clone()
    }
}

/// Merges the authoritative server thread with optimistic entries the
/// server has not echoed yet. Server order wins; stragglers keep their
/// send order at the tail.
fn reconcile(server: Vec<ChatMessage>, still_pending: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let server_ids: HashSet<Uuid> = server.iter().map(|m| m.id).collect();
    let mut merged = server;
    merged.extend(
        still_pending
            .into_iter()
            .filter(|m| !server_ids.contains(&m.id)),
    );
    merged
}
