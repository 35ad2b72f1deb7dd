//! Interactive user consent.
//!
//! [`LoopbackConsent`] runs the installed-app flow: a one-route HTTP server
//! on an ephemeral loopback port receives the authorization redirect.

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::credentials::ClientSecrets;
use crate::error::{AuthError, AuthResult};

/// Authorization code returned by a completed consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentGrant {
    pub code: String,
    /// Redirect URI the code was issued for; must be repeated in the exchange.
    pub redirect_uri: String,
}

/// Obtains an authorization code from the resource owner.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn obtain_code(&self, secrets: &ClientSecrets, scopes: &[&str]) -> AuthResult<ConsentGrant>;
}

/// Called with the authorization URL the user has to open.
pub type UrlHandler = Arc<dyn Fn(&Url) + Send + Sync>;

/// Installed-app consent over a loopback redirect.
#[derive(Clone)]
pub struct LoopbackConsent {
    timeout: Duration,
    on_url: Option<UrlHandler>,
}

impl LoopbackConsent {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            on_url: None,
        }
    }

    /// Deliver the authorization URL somewhere besides the log.
    pub fn with_url_handler(mut self, handler: UrlHandler) -> Self {
        self.on_url = Some(handler);
        self
    }
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<HashMap<String, String>>>>>;

#[async_trait]
impl ConsentFlow for LoopbackConsent {
    async fn obtain_code(&self, secrets: &ClientSecrets, scopes: &[&str]) -> AuthResult<ConsentGrant> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state = Uuid::new_v4().simple().to_string();

        let auth_url = authorization_url(secrets, scopes, &redirect_uri, &state)?;
        info!("Open this URL to authorize the application: {}", auth_url);
        if let Some(handler) = &self.on_url {
            handler(&auth_url);
        }

        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let app = Router::new().route("/", get(callback)).with_state(slot);
        let server = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                warn!("Consent listener stopped: {}", e);
            }
        });

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        let _ = stop_tx.send(());
        // The server only has to deliver the confirmation page; don't wait on it.
        drop(server);

        let params = match outcome {
            Ok(Ok(params)) => params,
            Ok(Err(_)) => return Err(AuthError::consent_denied("consent listener closed")),
            Err(_) => return Err(AuthError::ConsentTimeout(self.timeout.as_secs())),
        };

        let code = parse_callback(&params, &state)?;
        Ok(ConsentGrant { code, redirect_uri })
    }
}

async fn callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let sender = slot.lock().ok().and_then(|mut s| s.take());
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }
    Html("<html><body>Authorization received. You may close this window.</body></html>")
}

/// Build the authorization URL for an offline-access code grant.
pub fn authorization_url(
    secrets: &ClientSecrets,
    scopes: &[&str],
    redirect_uri: &str,
    state: &str,
) -> AuthResult<Url> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|e| AuthError::malformed(format!("auth_uri: {}", e)))
}

/// Extract the authorization code from redirect parameters.
pub fn parse_callback(params: &HashMap<String, String>, expected_state: &str) -> AuthResult<String> {
    if let Some(error) = params.get("error") {
        return Err(AuthError::consent_denied(error.clone()));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::consent_denied("state mismatch in redirect"));
    }
    params
        .get("code")
        .filter(|c| !c.is_empty())
        .cloned()
        .ok_or_else(|| AuthError::consent_denied("redirect carried no authorization code"))
}
