//! Chat client core modules.

pub mod auth;
pub mod client;
pub mod error;
pub mod friend;
pub mod gateway;
pub mod message;
pub mod realtime;
pub mod session;
