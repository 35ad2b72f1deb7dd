//! Session authenticator.
//!
//! Resolution order for [`Authenticator::authenticate`]:
//! 1. a persisted session that is still valid is returned as-is;
//! 2. an expired session with a refresh token is refreshed silently;
//! 3. otherwise the consent flow runs and its code is exchanged.
//!
//! Calls are serialised so concurrent callers never interleave session
//! writes or run two consent flows at once.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::consent::{ConsentFlow, ConsentGrant};
use crate::credentials::ClientSecrets;
use crate::error::{AuthError, AuthResult};
use crate::session::{Session, SessionStore};

/// Scope needed to upload videos.
pub const YOUTUBE_UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// Token lifetime assumed when the endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{}: {}", self.error, desc),
            None => self.error.clone(),
        }
    }
}

pub struct Authenticator {
    store: SessionStore,
    consent: Arc<dyn ConsentFlow>,
    http: reqwest::Client,
    lock: Mutex<()>,
}

impl Authenticator {
    pub fn new(store: SessionStore, consent: Arc<dyn ConsentFlow>, http: reqwest::Client) -> Self {
        Self {
            store,
            consent,
            http,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Produce a usable session for the given client-secrets blob.
    pub async fn authenticate(&self, credentials_blob: &str) -> AuthResult<Session> {
        let secrets = ClientSecrets::parse(credentials_blob)?;
        let _guard = self.lock.lock().await;

        if let Some(session) = self.store.load().await? {
            if session.client_id != secrets.client_id {
                info!("Persisted session belongs to another client, starting consent");
            } else if session.is_valid() {
                debug!("Reusing persisted session");
                return Ok(session);
            } else if session.can_refresh() {
                let refreshed = self.refresh_locked(&session).await?;
                return Ok(refreshed);
            }
        }

        let grant = self.consent.obtain_code(&secrets, &[YOUTUBE_UPLOAD_SCOPE]).await?;
        let session = self.exchange_code(&secrets, &grant).await?;
        self.store.save(&session).await?;
        info!("Authentication completed through consent");
        Ok(session)
    }

    /// Most recently persisted session, if any.
    pub async fn current_session(&self) -> AuthResult<Option<Session>> {
        let _guard = self.lock.lock().await;
        self.store.load().await
    }

    /// Return `session` if still valid, otherwise refresh it silently.
    pub async fn fresh_session(&self, session: &Session) -> AuthResult<Session> {
        if session.is_valid() {
            return Ok(session.clone());
        }
        let _guard = self.lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(stored) = self.store.load().await? {
            if stored.client_id == session.client_id && stored.is_valid() {
                return Ok(stored);
            }
        }
        if !session.can_refresh() {
            return Err(AuthError::refresh_rejected("session expired and has no refresh token"));
        }
        self.refresh_locked(session).await
    }

    /// Drop the persisted session so the next authentication runs consent.
    pub async fn forget(&self) -> AuthResult<()> {
        let _guard = self.lock.lock().await;
        self.store.clear().await
    }

    /// Refresh and persist. Caller must hold `lock`.
    async fn refresh_locked(&self, session: &Session) -> AuthResult<Session> {
        match self.refresh(session).await {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                info!("Session refreshed");
                Ok(refreshed)
            }
            Err(e @ AuthError::RefreshRejected(_)) => {
                warn!("Refresh rejected, clearing persisted session: {}", e);
                self.store.clear().await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, session: &Session) -> AuthResult<Session> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::refresh_rejected("no refresh token"))?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
            ("client_id", session.client_id.clone()),
        ];
        if let Some(secret) = &session.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.http.post(&session.token_uri).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.describe())
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(if status.is_client_error() {
                AuthError::refresh_rejected(reason)
            } else {
                AuthError::token_exchange(reason)
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::token_exchange(format!("unreadable token response: {}", e)))?;
        Ok(Session {
            access_token: token.access_token,
            // Refresh responses usually omit the refresh token; keep the old one.
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at: chrono::Utc::now()
                + chrono::Duration::seconds(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
            scopes: token
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_else(|| session.scopes.clone()),
            token_uri: session.token_uri.clone(),
            client_id: session.client_id.clone(),
            client_secret: session.client_secret.clone(),
        })
    }

    async fn exchange_code(&self, secrets: &ClientSecrets, grant: &ConsentGrant) -> AuthResult<Session> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", grant.code.clone()),
            ("redirect_uri", grant.redirect_uri.clone()),
            ("client_id", secrets.client_id.clone()),
        ];
        if let Some(secret) = &secrets.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self.http.post(&secrets.token_uri).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.describe())
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(AuthError::token_exchange(reason));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::token_exchange(format!("unreadable token response: {}", e)))?;
        let scopes = token
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| vec![YOUTUBE_UPLOAD_SCOPE.to_string()]);
        Ok(Session::from_token(
            secrets,
            token.access_token,
            token.refresh_token,
            token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            scopes,
        ))
    }
}
