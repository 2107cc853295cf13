//! Friends module: profile repository, listener interface and the
//! realtime-driven friends synchronization unit.

pub mod api;
pub mod listener;
pub mod models;
pub mod service;

pub use api::FriendApi;
pub use listener::{EmptyFriendListener, FriendListener};
pub use models::{ChatUser, FriendSections};
pub use service::FriendSyncer;
