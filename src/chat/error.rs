//! Error taxonomy shared by the repositories and synchronization units.
//!
//! Repository failures are never retried here; they surface to the owning
//! syncer, which forwards them to its listener's error callback.

use thiserror::Error;

pub type ChatResult<T> = std::result::Result<T, ChatError>;

/// Client-side error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// A lookup matched no row (e.g. friend-add by an unknown email).
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad credentials or an expired/rejected session.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Any other backend call failure (transport, HTTP status, decode).
    #[error("backend request failed: {0}")]
    Backend(String),

    /// No persisted local user id; the unit is constructible but inert.
    #[error("no local session available, client is degraded")]
    Degraded,
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Backend(format!("decode failed: {e}"))
    }
}

impl ChatError {
    /// True for errors that should be shown as a sign-in problem rather
    /// than a generic backend alert.
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Auth(_))
    }
}
