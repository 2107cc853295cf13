//! Auth DTOs and sign-up input rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Email/password credential pair for sign-up and password sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Token bundle plus user identity returned by the auth endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub user: AuthUser,
}

/// The authenticated identity carried inside a [`Session`].
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

const MAX_USERNAME_LEN: usize = 12;
const PASSWORD_SYMBOLS: &str = "@$!%*#?&";

/// Username rule: alphanumeric, shorter than 12 characters.
pub fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() < MAX_USERNAME_LEN
        && username.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Loose email shape check: `local@domain.tld`, no whitespace.
pub fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && tld.chars().count() >= 2,
        None => false,
    }
}

/// Password rule: at least 8 characters mixing letters, digits and one of
/// the allowed symbols.
pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SYMBOLS.contains(c))
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c))
}
