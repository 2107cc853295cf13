//! Friend listener callback interface.

use crate::chat::error::ChatError;
use crate::chat::friend::models::{ChatUser, FriendSections};
use async_trait::async_trait;

/// Callbacks fired by the friends synchronization unit.
#[async_trait]
pub trait FriendListener: Send + Sync {
    /// The sectioned friend list was re-resolved (initially, after a
    /// change signal, or after a successful friend add).
    async fn on_friends_changed(&self, sections: FriendSections);

    /// A friend-add request completed and the relationship was inserted.
    async fn on_friend_added(&self, friend: ChatUser);

    /// A fetch, resolve or add failed.
    async fn on_error(&self, error: ChatError);
}

/// Default no-op implementation.
pub struct EmptyFriendListener;

#[async_trait]
impl FriendListener for EmptyFriendListener {
    async fn on_friends_changed(&self, _sections: FriendSections) {}
    async fn on_friend_added(&self, _friend: ChatUser) {}
    async fn on_error(&self, _error: ChatError) {}
}
