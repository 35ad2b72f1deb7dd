//! Source URL classification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// Fetch strategy for a source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Video platform page; resolved through the platform's stream list
    Platform,
    /// Plain HTTP(S) file
    Generic,
}

const PLATFORM_HOSTS: &[&str] = &["youtube.com", "youtu.be"];

impl SourceKind {
    /// Classify a parsed URL by host.
    pub fn classify(url: &Url) -> Self {
        let Some(host) = url.host_str() else {
            return SourceKind::Generic;
        };
        let host = host.to_ascii_lowercase();
        let is_platform = PLATFORM_HOSTS
            .iter()
            .any(|p| host == *p || host.ends_with(&format!(".{}", p)));
        if is_platform {
            SourceKind::Platform
        } else {
            SourceKind::Generic
        }
    }
}
