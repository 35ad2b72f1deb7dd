//! Error types for authentication and publishing.

use thiserror::Error;

/// Result type for authentication.
pub type AuthResult<T> = Result<T, AuthError>;
/// Result type for publishing.
pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("Consent denied: {0}")]
    ConsentDenied(String),

    #[error("No consent received within {0} seconds")]
    ConsentTimeout(u64),

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token endpoint unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedCredentials(msg.into())
    }

    pub fn consent_denied(msg: impl Into<String>) -> Self {
        Self::ConsentDenied(msg.into())
    }

    pub fn refresh_rejected(msg: impl Into<String>) -> Self {
        Self::RefreshRejected(msg.into())
    }

    pub fn token_exchange(msg: impl Into<String>) -> Self {
        Self::TokenExchange(msg.into())
    }

    /// Machine-readable failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedCredentials(_) => "malformed_credentials",
            AuthError::ConsentDenied(_) => "consent_denied",
            AuthError::ConsentTimeout(_) => "consent_timeout",
            AuthError::RefreshRejected(_) => "refresh_rejected",
            AuthError::TokenExchange(_) => "token_exchange",
            AuthError::Http(_) => "network",
            AuthError::Io(_) | AuthError::Json(_) => "session_storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Session rejected by the platform: {0}")]
    SessionRejected(String),

    #[error("Chunk transfer failed: {0}")]
    ChunkTransfer(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Cannot read asset: {0}")]
    AssetRead(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Upload cancelled")]
    Cancelled,
}

impl PublishError {
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }

    pub fn session_rejected(msg: impl Into<String>) -> Self {
        Self::SessionRejected(msg.into())
    }

    pub fn chunk_transfer(msg: impl Into<String>) -> Self {
        Self::ChunkTransfer(msg.into())
    }

    pub fn asset_read(msg: impl Into<String>) -> Self {
        Self::AssetRead(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Machine-readable failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::InvalidMetadata(_) => "invalid_metadata",
            PublishError::SessionRejected(_) => "session_rejected",
            PublishError::ChunkTransfer(_) => "chunk_transfer",
            PublishError::Network(_) => "network",
            PublishError::AssetRead(_) => "asset_read",
            PublishError::Protocol(_) => "protocol",
            PublishError::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for PublishError {
    fn from(e: std::io::Error) -> Self {
        Self::AssetRead(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(AuthError::malformed("x").kind(), "malformed_credentials");
        assert_eq!(AuthError::ConsentTimeout(300).kind(), "consent_timeout");
        assert_eq!(PublishError::invalid_metadata("title").kind(), "invalid_metadata");
        assert_eq!(PublishError::session_rejected("401").kind(), "session_rejected");
        assert_eq!(
            PublishError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")).kind(),
            "asset_read"
        );
    }
}
