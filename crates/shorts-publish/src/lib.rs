//! Authentication and publishing to the video platform.
//!
//! - [`Authenticator`] turns client secrets into a reusable [`Session`],
//!   reusing or refreshing the persisted one before asking for consent.
//! - [`Publisher`] uploads a finished asset in chunks over an
//!   [`UploadTransport`] and reports progress as it goes.

pub mod auth;
pub mod consent;
pub mod credentials;
pub mod error;
pub mod publisher;
pub mod session;
pub mod upload;

pub use auth::{Authenticator, YOUTUBE_UPLOAD_SCOPE};
pub use consent::{ConsentFlow, ConsentGrant, LoopbackConsent, UrlHandler};
pub use credentials::ClientSecrets;
pub use error::{AuthError, AuthResult, PublishError, PublishResult};
pub use publisher::Publisher;
pub use session::{Session, SessionStore, TOKEN_REFRESH_MARGIN_SECS};
pub use upload::{
    ChunkResponse, ChunkedUpload, UploadTransport, YouTubeTransport, CHUNK_ALIGNMENT,
    DEFAULT_CHUNK_SIZE,
};
