//! End-to-end synchronization flows against an in-process fake backend.
//!
//! The fake speaks just enough HTTP for the gateway: profile selects,
//! message inserts, the `insert_friend` / `fetch_messages2` functions and
//! the password sign-in endpoint. Realtime change signals are driven by
//! calling the syncers' `on_change_signal` directly, which is exactly what
//! the client's dispatch loop does.

use chatblur_sdk_core::chat::error::ChatError;
use chatblur_sdk_core::chat::friend::{FriendApi, FriendListener, FriendSections, FriendSyncer};
use chatblur_sdk_core::chat::gateway::{BackendGateway, GatewayConfig};
use chatblur_sdk_core::chat::message::{ChatListener, ChatMessage, ChatSyncer, MessageApi};
use chatblur_sdk_core::{ChatClient, ChatUser, ClientConfig};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

const PASSWORD: &str = "abc123!xyz";

// ===================== fake backend =====================

#[derive(Clone)]
struct Profile {
    id: Uuid,
    username: String,
    email: String,
    friends_list: Vec<Uuid>,
    avatar_url: Option<String>,
}

impl Profile {
    fn row(&self) -> Value {
        json!({
            "id": self.id,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "username": self.username,
            "email": self.email,
            "friends_list": self.friends_list,
            "avatar_url": self.avatar_url,
        })
    }

    fn session_json(&self) -> Value {
        json!({
            "access_token": format!("token-{}", self.id),
            "refresh_token": "refresh",
            "user": { "id": self.id, "email": self.email },
        })
    }
}

#[derive(Default)]
struct BackendState {
    profiles: Mutex<Vec<Profile>>,
    messages: Mutex<Vec<Value>>,
}

impl BackendState {
    fn add_profile(&self, username: &str) -> Uuid {
        self.add_account(&format!("{username}@mail.com"))
    }

    fn add_account(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        let username = email.split('@').next().unwrap_or("user").to_string();
        self.profiles.lock().unwrap().push(Profile {
            id,
            username,
            email: email.to_string(),
            friends_list: Vec::new(),
            avatar_url: None,
        });
        id
    }

    fn befriend(&self, a: Uuid, b: Uuid) {
        let mut profiles = self.profiles.lock().unwrap();
        for profile in profiles.iter_mut() {
            if profile.id == a && !profile.friends_list.contains(&b) {
                profile.friends_list.push(b);
            }
            if profile.id == b && !profile.friends_list.contains(&a) {
                profile.friends_list.push(a);
            }
        }
    }

    fn friend_ids(&self, id: Uuid) -> Vec<Uuid> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.friends_list.clone())
            .unwrap_or_default()
    }

    fn profile_by_email(&self, email: &str) -> Option<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.email == email)
            .cloned()
    }

    fn route(&self, method: &str, target: &str, body: &[u8], bearer: Option<&str>) -> (u16, String) {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let params = parse_query(query);
        match (method, path) {
            ("POST", "/auth/v1/signup") => {
                let req: Value = serde_json::from_slice(body).unwrap();
                let email = req["email"].as_str().unwrap_or_default();
                if self.profile_by_email(email).is_some() {
                    return (400, json!({"error": "already registered"}).to_string());
                }
                self.add_account(email);
                let profile = self.profile_by_email(email).unwrap();
                (200, profile.session_json().to_string())
            }
            ("POST", "/auth/v1/token") => {
                let req: Value = serde_json::from_slice(body).unwrap();
                let known = self.profile_by_email(req["email"].as_str().unwrap_or_default());
                match known {
                    Some(profile) if req["password"] == PASSWORD => {
                        (200, profile.session_json().to_string())
                    }
                    _ => (401, json!({"error": "invalid_grant"}).to_string()),
                }
            }
            ("GET", "/auth/v1/user") => {
                let user = bearer
                    .and_then(|token| token.strip_prefix("token-"))
                    .and_then(|raw| Uuid::parse_str(raw).ok())
                    .and_then(|id| {
                        self.profiles
                            .lock()
                            .unwrap()
                            .iter()
                            .find(|p| p.id == id)
                            .cloned()
                    });
                match user {
                    Some(profile) => (
                        200,
                        json!({ "id": profile.id, "email": profile.email }).to_string(),
                    ),
                    None => (401, json!({"error": "invalid token"}).to_string()),
                }
            }
            ("GET", "/rest/v1/profiles") => {
                let profiles = self.profiles.lock().unwrap();
                let matched: Vec<&Profile> = profiles
                    .iter()
                    .filter(|p| {
                        params
                            .get("id")
                            .map_or(true, |v| v == &format!("eq.{}", p.id))
                            && params
                                .get("email")
                                .map_or(true, |v| v == &format!("eq.{}", p.email))
                    })
                    .collect();
                let rows: Vec<Value> = match params.get("select").map(String::as_str) {
                    Some("friends_list") => matched
                        .iter()
                        .map(|p| json!({ "friends_list": p.friends_list }))
                        .collect(),
                    _ => matched.iter().map(|p| p.row()).collect(),
                };
                (200, Value::Array(rows).to_string())
            }
            ("PATCH", "/rest/v1/profiles") => {
                let patch: Value = serde_json::from_slice(body).unwrap();
                let mut profiles = self.profiles.lock().unwrap();
                for profile in profiles.iter_mut().filter(|p| {
                    params
                        .get("id")
                        .map_or(true, |v| v == &format!("eq.{}", p.id))
                }) {
                    if let Some(url) = patch["avatar_url"].as_str() {
                        profile.avatar_url = Some(url.to_string());
                    }
                }
                (204, String::new())
            }
            ("POST", "/rest/v1/rpc/insert_friend") => {
                let req: Value = serde_json::from_slice(body).unwrap();
                let a = Uuid::parse_str(req["profile_id"].as_str().unwrap()).unwrap();
                let b = Uuid::parse_str(req["friend_name"].as_str().unwrap()).unwrap();
                self.befriend(a, b);
                (200, "null".to_string())
            }
            ("POST", "/rest/v1/rpc/fetch_messages2") => {
                let req: Value = serde_json::from_slice(body).unwrap();
                let a = req["message_sender"].clone();
                let b = req["message_receiver"].clone();
                // Thread-scoped: both directions, regardless of who is
                // passed as sender.
                let thread: Vec<Value> = self
                    .messages
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|m| {
                        (m["sender"] == a && m["receiver"] == b)
                            || (m["sender"] == b && m["receiver"] == a)
                    })
                    .cloned()
                    .collect();
                (200, Value::Array(thread).to_string())
            }
            ("POST", "/rest/v1/messages") => {
                let row: Value = serde_json::from_slice(body).unwrap();
                self.messages.lock().unwrap().push(row);
                (201, String::new())
            }
            _ => (404, json!({"message": "no route"}).to_string()),
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (percent_decode(k), percent_decode(v)))
        .collect()
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

async fn start_backend(state: Arc<BackendState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let state = state.clone();
            tokio::spawn(handle_connection(stream, state));
        }
    });
    format!("http://{addr}")
}

async fn handle_connection(mut stream: TcpStream, state: Arc<BackendState>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let body = &buf[header_end..header_end + content_length];

    let mut request_line = head.lines().next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default();
    let target = request_line.next().unwrap_or_default();
    let bearer = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("authorization")
            .then(|| value.trim().strip_prefix("Bearer ").map(str::to_string))?
    });

    let (status, reply) = state.route(method, target, body, bearer.as_deref());
    let response = format!(
        "HTTP/1.1 {status} OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
        reply.len(),
    );
    let _ = stream.write_all(response.as_bytes()).await;
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ===================== recording listeners =====================

#[derive(Default)]
struct RecordingFriendListener {
    sections: Mutex<Vec<FriendSections>>,
    errors: Mutex<Vec<ChatError>>,
}

#[async_trait]
impl FriendListener for RecordingFriendListener {
    async fn on_friends_changed(&self, sections: FriendSections) {
        self.sections.lock().unwrap().push(sections);
    }
    async fn on_friend_added(&self, _friend: ChatUser) {}
    async fn on_error(&self, error: ChatError) {
        self.errors.lock().unwrap().push(error);
    }
}

#[derive(Default)]
struct RecordingChatListener {
    emissions: Mutex<Vec<Vec<ChatMessage>>>,
    errors: Mutex<Vec<ChatError>>,
}

#[async_trait]
impl ChatListener for RecordingChatListener {
    async fn on_messages_changed(&self, messages: Vec<ChatMessage>) {
        self.emissions.lock().unwrap().push(messages);
    }
    async fn on_message_sent(&self, _message: ChatMessage) {}
    async fn on_error(&self, error: ChatError) {
        self.errors.lock().unwrap().push(error);
    }
}

fn gateway(base_url: &str) -> Arc<BackendGateway> {
    Arc::new(
        BackendGateway::new(GatewayConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
        })
        .unwrap(),
    )
}

// ===================== tests =====================

#[tokio::test]
async fn friends_resolve_sorted_into_sections() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("happyduck");
    let bob = state.add_profile("bob");
    let alice = state.add_profile("Alice");
    let carl = state.add_profile("carl");
    for friend in [bob, alice, carl] {
        state.befriend(me, friend);
    }
    let base = start_backend(state).await;

    let api = FriendApi::new(gateway(&base));
    let listener = Arc::new(RecordingFriendListener::default());
    let syncer = FriendSyncer::new(api.clone(), listener.clone());

    let profile = api.fetch_profile(me).await.unwrap();
    let sections = syncer.set_current_user(profile).await.unwrap();

    assert_eq!(sections.me.id, me);
    assert_eq!(sections.friends.len(), 3);
    let names: Vec<&str> = sections.friends.iter().map(|f| f.username.as_str()).collect();
    assert_eq!(names, vec!["Alice", "bob", "carl"]);
    assert_eq!(listener.sections.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_change_signals_are_idempotent() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let friend = state.add_profile("friend");
    state.befriend(me, friend);
    let base = start_backend(state).await;

    let api = FriendApi::new(gateway(&base));
    let listener = Arc::new(RecordingFriendListener::default());
    let syncer = FriendSyncer::new(api.clone(), listener.clone());
    let profile = api.fetch_profile(me).await.unwrap();
    syncer.set_current_user(profile).await.unwrap();

    // two signals, no backend mutation in between
    syncer.on_change_signal().await;
    syncer.on_change_signal().await;

    let emissions = listener.sections.lock().unwrap();
    assert_eq!(emissions.len(), 3);
    assert_eq!(emissions[1], emissions[2]);
    assert!(listener.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn add_friend_unknown_email_is_not_found_and_inserts_nothing() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let base = start_backend(state.clone()).await;

    let api = FriendApi::new(gateway(&base));
    let listener = Arc::new(RecordingFriendListener::default());
    let syncer = FriendSyncer::new(api.clone(), listener.clone());
    let profile = api.fetch_profile(me).await.unwrap();
    syncer.set_current_user(profile).await.unwrap();

    let result = syncer.add_friend("ghost@mail.com").await;
    assert!(matches!(result, Err(ChatError::NotFound(_))));
    assert!(state.friend_ids(me).is_empty());
    assert!(matches!(
        listener.errors.lock().unwrap().as_slice(),
        [ChatError::NotFound(_)]
    ));
}

#[tokio::test]
async fn add_friend_by_email_inserts_and_republishes() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let dana = state.add_profile("dana");
    let base = start_backend(state.clone()).await;

    let api = FriendApi::new(gateway(&base));
    let listener = Arc::new(RecordingFriendListener::default());
    let syncer = FriendSyncer::new(api.clone(), listener.clone());
    let profile = api.fetch_profile(me).await.unwrap();
    syncer.set_current_user(profile).await.unwrap();

    let added = syncer.add_friend("dana@mail.com").await.unwrap();
    assert_eq!(added.id, dana);
    assert_eq!(state.friend_ids(me), vec![dana]);
    assert_eq!(state.friend_ids(dana), vec![me]);

    let emissions = listener.sections.lock().unwrap();
    let last = emissions.last().unwrap();
    assert!(last.friends.iter().any(|f| f.id == dana));

    // identifier-keyed selection resolves the new friend
    assert_eq!(syncer.select_friend(dana).await.unwrap().username, "dana");
    assert!(syncer.select_friend(Uuid::new_v4()).await.is_none());
}

#[tokio::test]
async fn sent_message_appears_after_change_signal() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let peer = state.add_profile("peer");
    let base = start_backend(state).await;

    let api = MessageApi::new(gateway(&base));
    let listener = Arc::new(RecordingChatListener::default());
    let syncer = ChatSyncer::new(api, Some(me), peer, listener.clone());

    assert!(syncer.refresh().await.unwrap().is_empty());

    let sent = syncer.send("hi").await.unwrap();
    assert!(syncer.is_own(&sent));

    // the optimistic emission arrives before any refetch
    {
        let emissions = listener.emissions.lock().unwrap();
        assert_eq!(emissions.last().unwrap().len(), 1);
    }

    syncer.on_change_signal().await;
    let emissions = listener.emissions.lock().unwrap();
    let latest = emissions.last().unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].sender, me);
    assert_eq!(latest[0].receiver, peer);
    assert_eq!(latest[0].message, "hi");
    assert!(listener.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn thread_fetch_returns_both_directions() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let peer = state.add_profile("peer");
    let base = start_backend(state).await;

    let api = MessageApi::new(gateway(&base));

    // the peer writes first, then the local user replies
    api.insert_message(&ChatMessage::text(peer, me, "hello"))
        .await
        .unwrap();
    api.insert_message(&ChatMessage::text(me, peer, "hey"))
        .await
        .unwrap();

    // local always passes itself as sender; the thread still contains
    // the peer's message
    let thread = api.fetch_thread(me, peer).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert!(thread.iter().any(|m| m.sender == peer));

    let listener = Arc::new(RecordingChatListener::default());
    let syncer = ChatSyncer::new(api, Some(me), peer, listener.clone());
    let merged = syncer.refresh().await.unwrap();
    let own: Vec<bool> = merged.iter().map(|m| syncer.is_own(m)).collect();
    assert_eq!(own, vec![false, true]);
}

#[tokio::test]
async fn signed_up_user_matches_fetch_current_user() {
    let state = Arc::new(BackendState::default());
    let base = start_backend(state).await;

    let gw = gateway(&base);
    let session = gw.sign_up("fresh@mail.com", PASSWORD).await.unwrap();
    let current = gw.fetch_current_user().await.unwrap();
    assert_eq!(current.id, session.user.id);
}

#[tokio::test]
async fn client_sign_up_persists_the_user_id() {
    let state = Arc::new(BackendState::default());
    let base = start_backend(state).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = ClientConfig::new(base, "test-key");
    config.session_path = dir.path().join("session");
    let client = ChatClient::new(config).unwrap();

    let session = client.sign_up("new@mail.com", PASSWORD).await.unwrap();
    assert_eq!(client.persisted_user_id().unwrap(), Some(session.user.id));
}

#[tokio::test]
async fn avatar_update_republishes_the_current_user() {
    let state = Arc::new(BackendState::default());
    let me = state.add_profile("me");
    let base = start_backend(state).await;

    let api = FriendApi::new(gateway(&base));
    let listener = Arc::new(RecordingFriendListener::default());
    let syncer = FriendSyncer::new(api.clone(), listener.clone());
    let profile = api.fetch_profile(me).await.unwrap();
    syncer.set_current_user(profile).await.unwrap();

    syncer
        .update_avatar("https://cdn.example/me.png")
        .await
        .unwrap();

    let emissions = listener.sections.lock().unwrap();
    let last = emissions.last().unwrap();
    assert_eq!(
        last.me.avatar_url.as_deref(),
        Some("https://cdn.example/me.png")
    );
}

#[tokio::test]
async fn bad_credentials_map_to_auth_error() {
    let state = Arc::new(BackendState::default());
    state.add_profile("me");
    let base = start_backend(state).await;

    let gw = gateway(&base);
    let err = gw.sign_in("me@mail.com", "wrong-password").await.unwrap_err();
    assert!(err.is_auth(), "expected Auth, got {err:?}");

    let ok = gw.sign_in("me@mail.com", PASSWORD).await.unwrap();
    assert_eq!(ok.user.email.as_deref(), Some("me@mail.com"));
}
