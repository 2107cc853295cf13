//! Message Repository: insert into the `messages` table and fetch the
//! thread between two participants via the backend-side aggregation
//! function. Single round trips, no caching, no retries.

use crate::chat::error::ChatResult;
use crate::chat::gateway::BackendGateway;
use crate::chat::message::models::ChatMessage;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const MESSAGES_TABLE: &str = "messages";
const FETCH_MESSAGES_FN: &str = "fetch_messages2";

/// Message calls against the Backend Gateway.
#[derive(Clone)]
pub struct MessageApi {
    gateway: Arc<BackendGateway>,
}

impl MessageApi {
    pub fn new(gateway: Arc<BackendGateway>) -> Self {
        Self { gateway }
    }

    /// Inserts one message row.
    pub async fn insert_message(&self, message: &ChatMessage) -> ChatResult<()> {
        self.gateway.insert(MESSAGES_TABLE, message).await
    }

    /// Fetches the full bidirectional thread between the two ids. The
    /// backend function is thread-scoped: it returns messages in both
    /// directions regardless of which id is passed as sender.
    pub async fn fetch_thread(
        &self,
        sender: Uuid,
        receiver: Uuid,
    ) -> ChatResult<Vec<ChatMessage>> {
        let thread: Vec<ChatMessage> = self
            .gateway
            .rpc(
                FETCH_MESSAGES_FN,
                &serde_json::json!({
                    "message_sender": sender,
                    "message_receiver": receiver,
                }),
            )
            .await?;
        debug!(
            "[MessageAPI] thread {sender} <-> {receiver}: {} messages",
            thread.len()
        );
        Ok(thread)
    }
}
