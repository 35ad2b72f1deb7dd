use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the remote platform to a published video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RemoteVideoId(pub String);

impl RemoteVideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public watch URL for the video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for RemoteVideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RemoteVideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteVideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
