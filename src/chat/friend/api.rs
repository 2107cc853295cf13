//! User/Friend Repository: thin typed wrapper over profile rows and the
//! friend-relationship RPC. Every call is a single round trip, no caching,
//! no retries.

use crate::chat::error::{ChatError, ChatResult};
use crate::chat::friend::models::ChatUser;
use crate::chat::gateway::BackendGateway;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const PROFILES_TABLE: &str = "profiles";
const INSERT_FRIEND_FN: &str = "insert_friend";

/// Profile and friend-relationship calls against the Backend Gateway.
#[derive(Clone)]
pub struct FriendApi {
    gateway: Arc<BackendGateway>,
}

impl FriendApi {
    pub fn new(gateway: Arc<BackendGateway>) -> Self {
        Self { gateway }
    }

    /// Fetches one profile by id; a missing row is a `NotFound`.
    pub async fn fetch_profile(&self, id: Uuid) -> ChatResult<ChatUser> {
        let mut rows: Vec<ChatUser> = self
            .gateway
            .select(PROFILES_TABLE, "*", &[("id", id.to_string())])
            .await?;
        rows.pop()
            .ok_or_else(|| ChatError::NotFound(format!("profile {id}")))
    }

    /// Looks a profile up by email; `None` when no row matches.
    pub async fn fetch_profile_by_email(&self, email: &str) -> ChatResult<Option<ChatUser>> {
        let mut rows: Vec<ChatUser> = self
            .gateway
            .select(PROFILES_TABLE, "*", &[("email", email.to_string())])
            .await?;
        Ok(rows.pop())
    }

    /// Fetches only the friend-id list of a profile.
    pub async fn fetch_friend_ids(&self, id: Uuid) -> ChatResult<Vec<Uuid>> {
        #[derive(Deserialize)]
        struct FriendIdsRow {
            #[serde(default)]
            friends_list: Vec<Uuid>,
        }

        let mut rows: Vec<FriendIdsRow> = self
            .gateway
            .select(PROFILES_TABLE, "friends_list", &[("id", id.to_string())])
            .await?;
        let row = rows
            .pop()
            .ok_or_else(|| ChatError::NotFound(format!("profile {id}")))?;
        debug!("[FriendAPI] {} friend ids for {id}", row.friends_list.len());
        Ok(row.friends_list)
    }

    /// Inserts the friend relationship for both sides through the
    /// backend-side function. The backend owns atomicity and symmetry;
    /// the client performs exactly one call per add.
    pub async fn insert_friend(&self, profile_id: Uuid, friend_id: Uuid) -> ChatResult<()> {
        info!("[FriendAPI] insert_friend({profile_id}, {friend_id})");
        let _: serde_json::Value = self
            .gateway
            .rpc(
                INSERT_FRIEND_FN,
                &serde_json::json!({
                    "profile_id": profile_id,
                    "friend_name": friend_id,
                }),
            )
            .await?;
        Ok(())
    }

    /// Updates the avatar reference of a profile.
    pub async fn update_avatar_url(&self, id: Uuid, avatar_url: &str) -> ChatResult<()> {
        self.gateway
            .update(
                PROFILES_TABLE,
                &[("id", id.to_string())],
                &serde_json::json!({ "avatar_url": avatar_url }),
            )
            .await
    }
}
