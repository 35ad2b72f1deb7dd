//! Intake of user-uploaded files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::info;

use shorts_models::MediaAsset;

use crate::error::{IntakeError, IntakeResult};
use crate::fs_utils::{ensure_dir, suffixed_name};

/// Longest file name kept after sanitising.
const MAX_FILENAME_LEN: usize = 128;

/// Reduce a client-supplied file name to a safe base name.
///
/// Directory components are dropped, whitespace becomes `_`, only ASCII
/// letters, digits, `.`, `_` and `-` survive, and leading dots are removed.
/// Returns `None` if nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let truncated: String = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if cleaned.len() > MAX_FILENAME_LEN && ext.len() < 16 => {
            let keep = MAX_FILENAME_LEN.saturating_sub(ext.len() + 1);
            format!("{}.{}", &stem[..keep.min(stem.len())], ext)
        }
        _ => cleaned.chars().take(MAX_FILENAME_LEN).collect(),
    };

    if truncated.is_empty() || truncated.chars().all(|c| c == '.' || c == '_' || c == '-') {
        None
    } else {
        Some(truncated)
    }
}

/// Store uploaded bytes in `intake_dir` under a sanitised, collision-free name.
pub async fn store_upload(
    intake_dir: impl AsRef<Path>,
    original_name: &str,
    data: &[u8],
) -> IntakeResult<MediaAsset> {
    let mut writer = UploadWriter::create(intake_dir, original_name).await?;
    writer.write_chunk(data).await?;
    writer.finish().await
}

/// Incremental upload into the intake directory.
///
/// Chunks go to a hidden temporary file next to the final location. Only
/// [`finish`](Self::finish) links it to its sanitised name, and an existing
/// file with the same name is never replaced. Dropping the writer unfinished
/// removes the temporary file.
pub struct UploadWriter {
    dir: PathBuf,
    name: String,
    scratch: NamedTempFile,
    file: tokio::fs::File,
    size: u64,
}

impl UploadWriter {
    pub async fn create(intake_dir: impl AsRef<Path>, original_name: &str) -> IntakeResult<Self> {
        let name = sanitize_filename(original_name)
            .ok_or_else(|| IntakeError::InvalidFilename(original_name.to_string()))?;

        let dir = intake_dir.as_ref().to_path_buf();
        ensure_dir(&dir).await?;

        let scratch = tempfile::Builder::new().prefix(".upload-").tempfile_in(&dir)?;
        let file = tokio::fs::File::from_std(scratch.as_file().try_clone()?);
        Ok(Self {
            dir,
            name,
            scratch,
            file,
            size: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> IntakeResult<()> {
        self.file.write_all(chunk).await?;
        self.size += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Move the upload to its final name.
    pub async fn finish(mut self) -> IntakeResult<MediaAsset> {
        if self.size == 0 {
            return Err(IntakeError::Empty);
        }
        self.file.flush().await?;
        self.file.sync_all().await?;

        let Self {
            dir,
            name,
            scratch,
            size,
            ..
        } = self;
        let stored = persist_new(scratch, &dir, &name)?;

        info!(path = %stored.display(), size, "Stored uploaded file");
        Ok(MediaAsset::new(stored, size))
    }
}

fn persist_new(scratch: NamedTempFile, dir: &Path, name: &str) -> std::io::Result<PathBuf> {
    let target = dir.join(name);
    match scratch.persist_noclobber(&target) {
        Ok(_) => Ok(target),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            let alternative = dir.join(suffixed_name(name));
            e.file
                .persist_noclobber(&alternative)
                .map(|_| alternative)
                .map_err(|e| e.error)
        }
        Err(e) => Err(e.error),
    }
}
