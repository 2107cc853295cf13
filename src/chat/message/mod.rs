//! Messaging module: message repository, listener interface and the
//! per-conversation chat synchronization unit.

pub mod api;
pub mod listener;
pub mod models;
pub mod service;

pub use api::MessageApi;
pub use listener::{ChatListener, EmptyChatListener};
pub use models::ChatMessage;
pub use service::ChatSyncer;
