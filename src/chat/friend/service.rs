//! Friends synchronization unit.
//!
//! Keeps the resolved friend list consistent with server state: on the
//! current user arriving (and on every change signal afterwards) the
//! friend-id list is fetched and every id resolved to a full profile
//! concurrently, then the collected results are sorted and published as
//! sectioned data through the registered listener.

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::friend::api::FriendApi;
use crate::chat::friend::listener::FriendListener;
use crate::chat::friend::models::{sort_by_username, ChatUser, FriendSections};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct FriendState {
    current_user: Option<ChatUser>,
    friends: Vec<ChatUser>,
}

/// Resolves and republishes the friend list on demand and on change
/// signals. Holds the current user and the last emitted list as local
/// state; selection reads that cache by identifier, never by position.
pub struct FriendSyncer {
    api: FriendApi,
    listener: Arc<dyn FriendListener>,
    state: Mutex<FriendState>,
}

impl FriendSyncer {
    pub fn new(api: FriendApi, listener: Arc<dyn FriendListener>) -> Self {
        Self {
            api,
            listener,
            state: Mutex::new(FriendState::default()),
        }
    }

    /// Adopts the resolved current user and runs the initial
    /// fetch-and-resolve pass.
    pub async fn set_current_user(&self, user: ChatUser) -> ChatResult<FriendSections> {
        info!("[FriendSync] current user {} ({})", user.username, user.id);
        self.state.lock().await.current_user = Some(user);
        self.refresh().await
    }

    /// Re-runs the fetch-and-resolve sequence against the cached current
    /// user and publishes the result.
    pub async fn refresh(&self) -> ChatResult<FriendSections> {
        let me = {
            let state = self.state.lock().await;
            state.current_user.clone().ok_or(ChatError::Degraded)?
        };

        let ids = self.api.fetch_friend_ids(me.id).await?;
        debug!("[FriendSync] resolving {} friend ids", ids.len());

        // Fan-out: one concurrent fetch per id, joined back before emission.
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let api = self.api.clone();
            tasks.push(tokio::spawn(async move { api.fetch_profile(id).await }));
        }
        let mut friends = Vec::with_capacity(tasks.len());
        for task in tasks {
            let profile = task
                .await
                .map_err(|e| ChatError::Backend(format!("resolve task: {e}")))??;
            friends.push(profile);
        }

        // Completion order among the fan-out tasks is not deterministic;
        // the post-join sort is.
        sort_by_username(&mut friends);

        let sections = FriendSections {
            me,
            friends: friends.clone(),
        };
        self.state.lock().await.friends = friends;
        self.listener.on_friends_changed(sections.clone()).await;
        info!(
            "[FriendSync] published {} friends",
            sections.friends.len()
        );
        Ok(sections)
    }

    /// Reacts to a change signal on the profiles table. Errors are routed
    /// to the listener; repeated signals with unchanged backend state
    /// republish the identical list.
    pub async fn on_change_signal(&self) {
        if let Err(e) = self.refresh().await {
            warn!("[FriendSync] refresh on change signal failed: {e}");
            self.listener.on_error(e).await;
        }
    }

    /// Adds a friend by email. An unknown email is a typed `NotFound`,
    /// surfaced to both the caller and the listener; a match triggers one
    /// `insert_friend` call followed by a refresh.
    pub async fn add_friend(&self, email: &str) -> ChatResult<ChatUser> {
        let me_id = {
            let state = self.state.lock().await;
            state
                .current_user
                .as_ref()
                .map(|u| u.id)
                .ok_or(ChatError::Degraded)?
        };

        let result = self.add_friend_inner(me_id, email).await;
        match result {
            Ok(friend) => {
                self.listener.on_friend_added(friend.clone()).await;
                Ok(friend)
            }
            Err(e) => {
                warn!("[FriendSync] add friend {email} failed: {e}");
                self.listener.on_error(e.clone()).await;
                Err(e)
            }
        }
    }

    async fn add_friend_inner(&self, me_id: Uuid, email: &str) -> ChatResult<ChatUser> {
        let friend = self
            .api
            .fetch_profile_by_email(email)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("no user with email {email}")))?;

        self.api.insert_friend(me_id, friend.id).await?;
        self.refresh().await?;
        Ok(friend)
    }

    /// Replaces the current user's avatar reference, then refetches the
    /// own profile and republishes so the "Me" section shows the new
    /// avatar without waiting for a change signal.
    pub async fn update_avatar(&self, avatar_url: &str) -> ChatResult<()> {
        let me_id = {
            let state = self.state.lock().await;
            state
                .current_user
                .as_ref()
                .map(|u| u.id)
                .ok_or(ChatError::Degraded)?
        };

        self.api.update_avatar_url(me_id, avatar_url).await?;
        let me = self.api.fetch_profile(me_id).await?;
        info!("[FriendSync] avatar updated for {}", me.username);
        self.state.lock().await.current_user = Some(me);
        self.refresh().await?;
        Ok(())
    }

    /// Resolves a selected friend row from the last emitted list by
    /// identifier, so a refetch completing between selection and lookup
    /// cannot hand back the wrong user.
    pub async fn select_friend(&self, id: Uuid) -> Option<ChatUser> {
        let state = self.state.lock().await;
        state.friends.iter().find(|f| f.id == id).cloned()
    }

    /// Snapshot of the last emitted sectioned data, if any.
    pub async fn sections(&self) -> Option<FriendSections> {
        let state = self.state.lock().await;
        let me = state.current_user.clone()?;
        Some(FriendSections {
            me,
            friends: state.friends.clone(),
        })
    }

    /// Cached current-user id, once resolved.
    pub async fn current_user_id(&self) -> Option<Uuid> {
        self.state.lock().await.current_user.as_ref().map(|u| u.id)
    }
}
