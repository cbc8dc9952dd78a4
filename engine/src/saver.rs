//! Disk persistence seam.
//!
//! The save pipeline and the batch executor never write files directly; they
//! go through [`FileSaver`] so tests can substitute a saver that fails on
//! demand or records what was asked of it.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

use thiserror::Error;
use tracing::debug;

use vellum_utils::{AtomicWriteOptions, FileSyncPolicy, atomic_write_with_options};

use crate::tracked_file::TrackedFile;

/// Per-call knobs for one file save.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    /// Write even when the disk copy diverged from the baseline. Set only
    /// after the user explicitly chose an overwrite action.
    pub force: bool,
    /// File sync policy for the underlying atomic write.
    pub file_sync: FileSyncPolicy,
}

/// A single-file save failure.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The disk copy changed since the last save or reload and the caller
    /// did not force the write.
    #[error("disk copy of {path} changed since last sync; refusing to overwrite")]
    DiskChanged { path: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Save future type alias.
pub type SaveFut<'a> = Pin<Box<dyn Future<Output = Result<(), SaveError>> + Send + 'a>>;

/// Persists one tracked file and updates its in-memory fingerprints.
pub trait FileSaver: Send + Sync {
    /// Write `content` (or the file's canonical content when `None`) to the
    /// file's path. On success the implementation must leave the file marked
    /// saved: content, baseline, and disk fingerprint in agreement.
    fn save_file<'a>(
        &'a self,
        file: &'a mut TrackedFile,
        content: Option<String>,
        options: SaveOptions,
    ) -> SaveFut<'a>;
}

/// The production saver: atomic temp-file-and-rename writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSaver;

impl FileSaver for DiskSaver {
    fn save_file<'a>(
        &'a self,
        file: &'a mut TrackedFile,
        content: Option<String>,
        options: SaveOptions,
    ) -> SaveFut<'a> {
        Box::pin(async move {
            let text = content.unwrap_or_else(|| file.content().to_string());

            if !options.force {
                file.refresh_disk_state().await;
                if file.has_external_change() {
                    return Err(SaveError::DiskChanged {
                        path: file.path().display().to_string(),
                    });
                }
            }

            write_atomically(file.path(), &text, options.file_sync)
                .await
                .map_err(|source| SaveError::Io {
                    path: file.path().display().to_string(),
                    source,
                })?;

            let mtime = tokio::fs::metadata(file.path())
                .await
                .ok()
                .and_then(|meta| meta.modified().ok());
            file.mark_saved(text, mtime);
            debug!(path = %file.path().display(), forced = options.force, "Saved file");
            Ok(())
        })
    }
}

async fn write_atomically(path: &Path, text: &str, file_sync: FileSyncPolicy) -> io::Result<()> {
    let path = path.to_path_buf();
    let bytes = text.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || {
        atomic_write_with_options(&path, &bytes, AtomicWriteOptions { file_sync })
    })
    .await
    .map_err(|e| io::Error::other(format!("save write task failed: {e}")))?
}
