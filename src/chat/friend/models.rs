//! Profile and friend-list models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row of the `profiles` table. The id is immutable once created; the
/// friend list holds ids of other profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub friends_list: Vec<Uuid>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// UI-ready sectioned friend data: the "Me" section with the current user
/// and the "Friends" section sorted ascending by username.
#[derive(Debug, Clone, PartialEq)]
pub struct FriendSections {
    pub me: ChatUser,
    pub friends: Vec<ChatUser>,
}

/// Sorts resolved friends the way the friends screen displays them:
/// ascending, case-sensitive byte order of the username.
pub(crate) fn sort_by_username(friends: &mut [ChatUser]) {
    friends.sort_by(|a, b| a.username.cmp(&b.username));
}

#[cfg(test)]
pub(crate) fn test_user(username: &str) -> ChatUser {
    ChatUser {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        username: username.to_string(),
        email: format!("{username}@mail.com"),
        friends_list: Vec::new(),
        avatar_url: None,
    }
}
