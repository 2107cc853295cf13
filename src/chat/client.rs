//! Chat client core: wires the Backend Gateway, Session Store,
//! synchronization units and the Realtime Bridge together.
//!
//! The client owns every background task it spawns and aborts them on
//! shutdown, so nothing keeps running on behalf of a torn-down client.

use crate::chat::auth::Session;
use crate::chat::error::{ChatError, ChatResult};
use crate::chat::friend::{EmptyFriendListener, FriendApi, FriendListener, FriendSyncer};
use crate::chat::gateway::{BackendGateway, GatewayConfig};
use crate::chat::message::{ChatListener, ChatSyncer, EmptyChatListener, MessageApi};
use crate::chat::realtime::{RealtimeBridge, RealtimeConfig, RealtimeEvent, TableSubscription};
use crate::chat::session::SessionStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

const PROFILES_TABLE: &str = "profiles";
const MESSAGES_TABLE: &str = "messages";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP base of the backend project.
    pub base_url: String,
    /// Project API key.
    pub api_key: String,
    /// Realtime WebSocket endpoint; derived from `base_url` by default.
    pub ws_url: String,
    /// Schema the watched tables live in.
    pub schema: String,
    /// Where the persisted user id lives.
    pub session_path: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let ws_url = derive_ws_url(&base_url);
        Self {
            base_url,
            api_key: api_key.into(),
            ws_url,
            schema: "public".to_string(),
            session_path: PathBuf::from("chatblur.session"),
        }
    }
}

fn derive_ws_url(base_url: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!("{}/realtime/v1/websocket", ws_base.trim_end_matches('/'))
}

/// The chat application client.
pub struct ChatClient {
    config: ClientConfig,
    gateway: Arc<BackendGateway>,
    session_store: SessionStore,
    friend_listener: Arc<dyn FriendListener>,
    chat_listener: Arc<dyn ChatListener>,
    friend_syncer: Option<Arc<FriendSyncer>>,
    chats: Arc<Mutex<HashMap<Uuid, Arc<ChatSyncer>>>>,
    bridge: Option<RealtimeBridge>,
    dispatch_task: Option<JoinHandle<()>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> ChatResult<Self> {
        let gateway = Arc::new(BackendGateway::new(GatewayConfig {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })?);
        let session_store = SessionStore::new(config.session_path.clone());
        Ok(Self {
            config,
            gateway,
            session_store,
            friend_listener: Arc::new(EmptyFriendListener),
            chat_listener: Arc::new(EmptyChatListener),
            friend_syncer: None,
            chats: Arc::new(Mutex::new(HashMap::new())),
            bridge: None,
            dispatch_task: None,
        })
    }

    /// Registers the friend listener. Call before [`connect`](Self::connect).
    pub fn set_friend_listener(&mut self, listener: Arc<dyn FriendListener>) {
        self.friend_listener = listener;
    }

    /// Registers the chat listener used by chats opened afterwards.
    pub fn set_chat_listener(&mut self, listener: Arc<dyn ChatListener>) {
        self.chat_listener = listener;
    }

    /// The user id persisted by the last successful sign-in, read at
    /// launch to decide the initial screen.
    pub fn persisted_user_id(&self) -> ChatResult<Option<Uuid>> {
        self.session_store.load()
    }

    // ===================== auth =====================

    pub async fn sign_up(&self, email: &str, password: &str) -> ChatResult<Session> {
        let session = self.gateway.sign_up(email, password).await?;
        self.session_store.save(session.user.id)?;
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ChatResult<Session> {
        let session = self.gateway.sign_in(email, password).await?;
        self.session_store.save(session.user.id)?;
        Ok(session)
    }

    /// Apple ID sign-in with an identity token obtained from the OS flow.
    pub async fn sign_in_with_apple(&self, id_token: &str) -> ChatResult<Session> {
        let session = self.gateway.sign_in_with_id_token("apple", id_token).await?;
        self.session_store.save(session.user.id)?;
        Ok(session)
    }

    /// Signs out backend-side, clears the persisted id and stops all
    /// synchronization.
    pub async fn sign_out(&mut self) -> ChatResult<()> {
        let result = self.gateway.sign_out().await;
        self.session_store.clear()?;
        self.shutdown().await;
        result
    }

    // ===================== sync =====================

    /// Resolves the current user, starts the friends synchronization unit
    /// and opens the realtime bridge for the profiles and messages tables.
    pub async fn connect(&mut self) -> ChatResult<()> {
        let auth_user = self.gateway.fetch_current_user().await?;
        self.session_store.save(auth_user.id)?;

        let friend_api = FriendApi::new(self.gateway.clone());
        let me = friend_api.fetch_profile(auth_user.id).await?;
        info!("[Client] connected as {} ({})", me.username, me.id);

        let friend_syncer = Arc::new(FriendSyncer::new(
            friend_api,
            self.friend_listener.clone(),
        ));
        friend_syncer.set_current_user(me).await?;
        self.friend_syncer = Some(friend_syncer.clone());

        let (bridge, events) = RealtimeBridge::open(
            RealtimeConfig {
                ws_url: self.config.ws_url.clone(),
                api_key: self.config.api_key.clone(),
            },
            vec![
                TableSubscription::inserts_and_updates(&self.config.schema, PROFILES_TABLE),
                TableSubscription::inserts_and_updates(&self.config.schema, MESSAGES_TABLE),
            ],
        );
        self.bridge = Some(bridge);
        self.dispatch_task = Some(spawn_dispatch(
            events,
            friend_syncer,
            self.chats.clone(),
        ));

        Ok(())
    }

    /// Handle to the friends synchronization unit, once connected.
    pub fn friends(&self) -> ChatResult<Arc<FriendSyncer>> {
        self.friend_syncer
            .clone()
            .ok_or_else(|| ChatError::Backend("client is not connected".to_string()))
    }

    /// Opens (or returns the already open) conversation with `peer_id`,
    /// running its initial history fetch. The local user id comes from
    /// the Session Store; without one the chat is degraded, not an error.
    ///
    /// The registry lock is held across the lookup and the insert, so
    /// concurrent calls for the same peer all land on one unit.
    pub async fn open_chat(&self, peer_id: Uuid) -> ChatResult<Arc<ChatSyncer>> {
        let mut chats = self.chats.lock().await;
        if let Some(existing) = chats.get(&peer_id) {
            return Ok(existing.clone());
        }

        let local_user_id = self.session_store.load()?;
        let syncer = Arc::new(ChatSyncer::new(
            MessageApi::new(self.gateway.clone()),
            local_user_id,
            peer_id,
            self.chat_listener.clone(),
        ));
        syncer.refresh().await?;
        chats.insert(peer_id, syncer.clone());
        Ok(syncer)
    }

    /// Drops the conversation with `peer_id`; pending fetches finish but
    /// their results are no longer published anywhere.
    pub async fn close_chat(&self, peer_id: Uuid) {
        self.chats.lock().await.remove(&peer_id);
    }

    /// Aborts the dispatch loop and the realtime connection and drops all
    /// open conversations.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
        self.bridge = None;
        self.friend_syncer = None;
        self.chats.lock().await.clear();
        info!("[Client] shut down");
    }
}

/// Routes realtime events to the owning synchronization units until the
/// bridge side of the channel goes away.
fn spawn_dispatch(
    mut events: mpsc::Receiver<RealtimeEvent>,
    friend_syncer: Arc<FriendSyncer>,
    chats: Arc<Mutex<HashMap<Uuid, Arc<ChatSyncer>>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RealtimeEvent::Changed(table) if table == PROFILES_TABLE => {
                    friend_syncer.on_change_signal().await;
                }
                RealtimeEvent::Changed(table) if table == MESSAGES_TABLE => {
                    let open: Vec<Arc<ChatSyncer>> =
                        chats.lock().await.values().cloned().collect();
                    for syncer in open {
                        syncer.on_change_signal().await;
                    }
                }
                RealtimeEvent::Changed(table) => {
                    warn!("[Client] change signal for unwatched table {table}");
                }
                RealtimeEvent::Connected => info!("[Client] realtime connected"),
                RealtimeEvent::Disconnected => warn!("[Client] realtime disconnected"),
                RealtimeEvent::Error(reason) => {
                    error!("[Client] realtime error: {reason}");
                }
            }
        }
    })
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
    }
}
