pub mod chat;

// Re-export the types most callers need.
pub use chat::{
    auth::Session,
    client::{ChatClient, ClientConfig},
    error::{ChatError, ChatResult},
    friend::{ChatUser, FriendListener, FriendSections, FriendSyncer},
    gateway::{BackendGateway, GatewayConfig},
    message::{ChatListener, ChatMessage, ChatSyncer},
    realtime::{RealtimeBridge, RealtimeConfig, RealtimeEvent, TableSubscription},
    session::SessionStore,
};
