//! OAuth client secrets.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Client identity from a Google client-secrets JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct SecretsDocument {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client-secrets blob (`{"installed": {...}}` or `{"web": {...}}`).
    pub fn parse(blob: &str) -> AuthResult<Self> {
        let blob = blob.trim();
        if blob.is_empty() {
            return Err(AuthError::malformed("credentials are empty"));
        }
        let doc: SecretsDocument =
            serde_json::from_str(blob).map_err(|e| AuthError::malformed(e.to_string()))?;
        let secrets = doc
            .installed
            .or(doc.web)
            .ok_or_else(|| AuthError::malformed("expected an 'installed' or 'web' section"))?;

        if secrets.client_id.trim().is_empty() {
            return Err(AuthError::malformed("client_id is empty"));
        }
        for uri in [&secrets.auth_uri, &secrets.token_uri] {
            url::Url::parse(uri).map_err(|e| AuthError::malformed(format!("{}: {}", uri, e)))?;
        }
        Ok(secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed() {
        let blob = r#"{"installed": {"client_id": "abc.apps.googleusercontent.com",
            "client_secret": "s3cret", "redirect_uris": ["http://localhost"]}}"#;
        let secrets = ClientSecrets::parse(blob).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URI);
    }

    #[test]
    fn test_parse_web() {
        let blob = r#"{"web": {"client_id": "w", "token_uri": "http://127.0.0.1:9/token"}}"#;
        let secrets = ClientSecrets::parse(blob).unwrap();
        assert_eq!(secrets.token_uri, "http://127.0.0.1:9/token");
        assert_eq!(secrets.client_secret, None);
    }

    #[test]
    fn test_malformed() {
        for blob in ["", "not json", "{}", r#"{"installed": {"client_id": ""}}"#,
                     r#"{"installed": {"client_id": "x", "token_uri": "::"}}"#] {
            assert!(
                matches!(ClientSecrets::parse(blob), Err(AuthError::MalformedCredentials(_))),
                "{}",
                blob
            );
        }
    }
}
