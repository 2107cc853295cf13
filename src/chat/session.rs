//! Session Store: the single persisted key holding the signed-in user id.
//!
//! Written after a successful sign-in or session check, read at the next
//! launch to decide the initial screen, and cleared on sign-out so no stale
//! id survives the session it belonged to.

use crate::chat::error::{ChatError, ChatResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// File-backed store for the authenticated user's identifier.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the user id, replacing any previous value.
    pub fn save(&self, user_id: Uuid) -> ChatResult<()> {
        std::fs::write(&self.path, user_id.to_string())
            .map_err(|e| ChatError::Backend(format!("write session file: {e}")))?;
        debug!("[Session] saved user id {user_id}");
        Ok(())
    }

    /// Reads the persisted user id, `None` when nothing was saved yet.
    pub fn load(&self) -> ChatResult<Option<Uuid>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChatError::Backend(format!("read session file: {e}"))),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let id = Uuid::parse_str(trimmed)
            .map_err(|e| ChatError::Backend(format!("corrupt session file: {e}")))?;
        Ok(Some(id))
    }

    /// Removes the persisted id. Missing file is not an error.
    pub fn clear(&self) -> ChatResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("[Session] cleared persisted user id");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChatError::Backend(format!("clear session file: {e}"))),
        }
    }
}
