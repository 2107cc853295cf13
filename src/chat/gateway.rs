//! Backend Gateway: the one typed client over the hosted backend's HTTP
//! surface (auth, row storage, remote procedure calls).
//!
//! The gateway is constructed explicitly and injected into every
//! repository; there is no hidden shared singleton. All row and RPC
//! operations are single request/response round trips with no caching and
//! no retries.

use crate::chat::auth::{Credentials, Session};
use crate::chat::error::{ChatError, ChatResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Connection settings for one backend project.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// HTTP base, e.g. `https://example.supabase.co`.
    pub base_url: String,
    /// Project API key sent with every request.
    pub api_key: String,
}

/// Typed client over the backend's auth, row and RPC endpoints.
pub struct BackendGateway {
    http: reqwest::Client,
    config: GatewayConfig,
    // Bearer token of the signed-in session; absent until sign-in.
    access_token: RwLock<Option<String>>,
}

impl BackendGateway {
    pub fn new(config: GatewayConfig) -> ChatResult<Self> {
        let http = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("apikey"),
                    reqwest::header::HeaderValue::from_str(&config.api_key)
                        .map_err(|e| ChatError::Backend(format!("invalid api key: {e}")))?,
                );
                headers
            })
            .build()
            .map_err(|e| ChatError::Backend(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            config,
            access_token: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.config.api_key
    }

    async fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token.read().await.as_ref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ===================== auth =====================

    /// Registers a new account and adopts the returned session.
    pub async fn sign_up(&self, email: &str, password: &str) -> ChatResult<Session> {
        let url = format!("{}/auth/v1/signup", self.config.base_url);
        info!("[Gateway] sign-up for {email}");
        let response = self
            .http
            .post(&url)
            .json(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// Password sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> ChatResult<Session> {
        let url = format!("{}/auth/v1/token", self.config.base_url);
        info!("[Gateway] sign-in for {email}");
        let response = self
            .http
            .post(&url)
            .query(&[("grant_type", "password")])
            .json(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// External-provider sign-in (e.g. `provider = "apple"`) with an
    /// identity token obtained out of band.
    pub async fn sign_in_with_id_token(
        &self,
        provider: &str,
        id_token: &str,
    ) -> ChatResult<Session> {
        let url = format!("{}/auth/v1/token", self.config.base_url);
        info!("[Gateway] sign-in via {provider} id token");
        let response = self
            .http
            .post(&url)
            .query(&[("grant_type", "id_token")])
            .json(&serde_json::json!({
                "provider": provider,
                "id_token": id_token,
            }))
            .send()
            .await?;
        self.adopt_session(response).await
    }

    /// Fetches the session's user from the auth endpoint, verifying the
    /// held token is still accepted.
    pub async fn fetch_current_user(&self) -> ChatResult<crate::chat::auth::AuthUser> {
        let url = format!("{}/auth/v1/user", self.config.base_url);
        let response = self.authed(self.http.get(&url)).await.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(auth_error(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Invalidates the session backend-side and drops the held token.
    pub async fn sign_out(&self) -> ChatResult<()> {
        let url = format!("{}/auth/v1/logout", self.config.base_url);
        let response = self.authed(self.http.post(&url)).await.send().await?;
        let status = response.status();
        *self.access_token.write().await = None;
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(auth_error(status, &body));
        }
        info!("[Gateway] signed out");
        Ok(())
    }

    async fn adopt_session(&self, response: reqwest::Response) -> ChatResult<Session> {
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            error!(
                "[Gateway] auth request rejected, status {status}: {}",
                String::from_utf8_lossy(&body)
            );
            return Err(auth_error(status, &body));
        }
        let session: Session = serde_json::from_slice(&body)?;
        *self.access_token.write().await = Some(session.access_token.clone());
        debug!("[Gateway] session adopted for user {}", session.user.id);
        Ok(session)
    }

    // ===================== rows =====================

    /// Selects rows from `table`, optionally narrowed to `columns` and an
    /// equality `filters` list of `(column, value)` pairs.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        filters: &[(&str, String)],
    ) -> ChatResult<Vec<T>> {
        let url = format!("{}/rest/v1/{}", self.config.base_url, table);
        let mut query: Vec<(String, String)> = vec![("select".into(), columns.into())];
        for (column, value) in filters {
            query.push(((*column).into(), format!("eq.{value}")));
        }
        let response = self
            .authed(self.http.get(&url).query(&query))
            .await
            .send()
            .await?;
        decode_rows(response, table).await
    }

    /// Inserts one row into `table`.
    pub async fn insert<T: Serialize>(&self, table: &str, row: &T) -> ChatResult<()> {
        let url = format!("{}/rest/v1/{}", self.config.base_url, table);
        let response = self
            .authed(self.http.post(&url).json(row))
            .await
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            error!(
                "[Gateway] insert into {table} failed, status {status}: {}",
                String::from_utf8_lossy(&body)
            );
            return Err(ChatError::Backend(format!(
                "insert into {table} failed with status {status}"
            )));
        }
        debug!("[Gateway] inserted row into {table}");
        Ok(())
    }

    /// Patches rows of `table` matching the equality `filters`.
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        patch: &T,
    ) -> ChatResult<()> {
        let url = format!("{}/rest/v1/{}", self.config.base_url, table);
        let query: Vec<(String, String)> = filters
            .iter()
            .map(|(column, value)| ((*column).into(), format!("eq.{value}")))
            .collect();
        let response = self
            .authed(self.http.patch(&url).query(&query).json(patch))
            .await
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            error!(
                "[Gateway] update of {table} failed, status {status}: {}",
                String::from_utf8_lossy(&body)
            );
            return Err(ChatError::Backend(format!(
                "update of {table} failed with status {status}"
            )));
        }
        Ok(())
    }

    // ===================== rpc =====================

    /// Invokes a backend function with JSON parameters and decodes its
    /// result.
    pub async fn rpc<P: Serialize, T: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> ChatResult<T> {
        let url = format!("{}/rest/v1/rpc/{}", self.config.base_url, function);
        debug!("[Gateway] rpc {function}");
        let response = self
            .authed(self.http.post(&url).json(params))
            .await
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            error!(
                "[Gateway] rpc {function} failed, status {status}: {}",
                String::from_utf8_lossy(&body)
            );
            return Err(ChatError::Backend(format!(
                "rpc {function} failed with status {status}"
            )));
        }
        serde_json::from_slice(&body).map_err(|e| {
            error!(
                "[Gateway] rpc {function} decode failed: {e}, raw body: {}",
                String::from_utf8_lossy(&body)
            );
            ChatError::Backend(format!("rpc {function} decode failed: {e}"))
        })
    }
}

/// Reads a row-returning response once and decodes it, logging the raw
/// body on failure the way every repository expects.
async fn decode_rows<T: DeserializeOwned>(
    response: reqwest::Response,
    table: &str,
) -> ChatResult<Vec<T>> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        error!(
            "[Gateway] select from {table} failed, status {status}: {}",
            String::from_utf8_lossy(&body)
        );
        return Err(ChatError::Backend(format!(
            "select from {table} failed with status {status}"
        )));
    }
    serde_json::from_slice(&body).map_err(|e| {
        error!(
            "[Gateway] select from {table} decode failed: {e}, raw body: {}",
            String::from_utf8_lossy(&body)
        );
        ChatError::Backend(format!("select from {table} decode failed: {e}"))
    })
}

fn auth_error(status: reqwest::StatusCode, body: &[u8]) -> ChatError {
    let detail = String::from_utf8_lossy(body);
    if status.as_u16() == 400 || status.as_u16() == 401 || status.as_u16() == 403 {
        ChatError::Auth(format!("status {status}: {detail}"))
    } else {
        ChatError::Backend(format!("status {status}: {detail}"))
    }
}
