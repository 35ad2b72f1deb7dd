//! Local media files passed between stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A video file on local disk, produced by one stage and consumed by the next.
///
/// Assets are handed over by path. A stage never rewrites an asset it did not
/// create; it writes a new one instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MediaAsset {
    /// Location on disk
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Container format, taken from the lower-cased file extension
    pub container: String,
}

impl MediaAsset {
    /// Describe a file that has already been written.
    pub fn new(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        let path = path.into();
        let container = container_of(&path);
        Self {
            path,
            size_bytes,
            container,
        }
    }

    /// File name component, if the path has one.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Size in megabytes, for log lines.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

fn container_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_extension() {
        let asset = MediaAsset::new("uploads/clip.MP4", 1024);
        assert_eq!(asset.container, "mp4");
        assert_eq!(asset.file_name(), Some("clip.MP4"));
    }

    #[test]
    fn test_container_missing_extension() {
        let asset = MediaAsset::new("uploads/raw", 0);
        assert_eq!(asset.container, "");
    }
}
