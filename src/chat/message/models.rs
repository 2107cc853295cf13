//! Chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row of the `messages` table. Immutable once created; there is no
/// edit or delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub message: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

impl ChatMessage {
    /// Builds a fresh text message: new id, current timestamp, no media.
    pub fn text(sender: Uuid, receiver: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            sender,
            receiver,
            message: body.into(),
            image: None,
            video: None,
        }
    }
}
