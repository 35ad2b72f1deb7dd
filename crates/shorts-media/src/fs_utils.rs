//! Filesystem helpers shared by the media stages.

use chrono::Utc;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

/// Create a directory (and parents) if it does not exist yet.
pub async fn ensure_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if !fs::try_exists(path).await.unwrap_or(false) {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Eight hex characters from a fresh v4 UUID.
pub fn short_suffix() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// `<prefix>_<UTC yyyymmddTHHMMSS.mmm>_<8 hex>.<ext>`
///
/// The random suffix keeps names distinct even within one millisecond.
pub fn unique_name(prefix: &str, ext: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        prefix,
        Utc::now().format("%Y%m%dT%H%M%S%.3f"),
        short_suffix(),
        ext
    )
}

/// Insert `_<8 hex>` before the extension of `name`.
pub fn suffixed_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, short_suffix(), ext),
        _ => format!("{}_{}", name, short_suffix()),
    }
}

/// Size of a file in bytes.
pub async fn file_size(path: impl AsRef<Path>) -> std::io::Result<u64> {
    Ok(fs::metadata(path).await?.len())
}
