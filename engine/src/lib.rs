//! File consistency and conflict-resolution engine for Vellum.
//!
//! A logical document is one primary file plus any number of fragment files
//! embedded into it. This crate keeps the in-memory canonical content, the
//! on-disk copies, and a live editing surface consistent: it detects external
//! changes, negotiates resolutions with the user through a conflict dialog,
//! and applies the chosen actions transactionally.
//!
//! [`DocumentSession`] is the facade host applications embed; the modules
//! underneath are usable on their own:
//!
//! - `tracked_file` / `registry`: per-file state and the path-keyed index
//! - `snapshot`: the optimistic-concurrency token over registry state
//! - `bridge`: the suspended request/response conflict dialog handshake
//! - `executor`: the phased, fail-fast batch action executor
//! - `save`: the serialized save pipeline with pre-save conflict checks
//! - `sync_check`: read-only drift diagnostics

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use vellum_types::{
    ActionRequest, BatchReport, ConflictReply, ContentSyncReport, FileKind, SnapshotToken,
    TrackedFilesState,
};
use vellum_utils::{normalize_path, recover_bak_file};

pub mod bridge;
pub mod config;
pub mod executor;
pub mod registry;
pub mod save;
pub mod saver;
pub mod snapshot;
pub mod sync_check;
pub mod tracked_file;

pub use bridge::{ConflictBridge, ConflictResolution, ConflictTransport, DEFAULT_DIALOG_TIMEOUT};
pub use config::{ConfigError, SessionConfig, SessionConfigFile};
pub use executor::execute_batch;
pub use registry::{Anomaly, ConsistencyReport, FileRegistry};
pub use save::{PipelineError, SaveOutcome, SavePipeline, SaveScope};
pub use saver::{DiskSaver, FileSaver, SaveError, SaveFut, SaveOptions};
pub use snapshot::compute_snapshot_token;
pub use sync_check::verify_content_sync;
pub use tracked_file::TrackedFile;


/// Session-level failures surfaced to the embedding application.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("path does not resolve: {path:?}")]
    BadPath { path: String },
    #[error("file is not tracked: {path}")]
    NotTracked { path: String },
    #[error("{kind} is not a fragment kind")]
    NotAFragment { kind: &'static str },
}

/// One open logical document and everything needed to keep it consistent.
///
/// Methods take `&self`; all mutable state lives behind the registry mutex
/// and the pipeline's own serialization. Dropping the session cancels every
/// pending conflict dialog so no caller is left hanging.
pub struct DocumentSession {
    registry: tokio::sync::Mutex<FileRegistry>,
    bridge: Arc<ConflictBridge>,
    pipeline: SavePipeline,
    saver: Arc<dyn FileSaver>,
}

impl DocumentSession {
    /// Open a session on an existing primary file.
    pub async fn open(primary_path: PathBuf, config: SessionConfig) -> Result<Self, SessionError> {
        let primary_path = normalize_path(&primary_path);
        let (content, mtime) = read_with_mtime(&primary_path).await?;
        let relative = primary_path
            .file_name()
            .map_or_else(|| primary_path.clone(), PathBuf::from);

        let primary = TrackedFile::adopted(
            primary_path.clone(),
            relative,
            FileKind::Primary,
            content,
            mtime,
        );
        info!(path = %primary_path.display(), "Opened document session");
        Ok(Self {
            registry: tokio::sync::Mutex::new(FileRegistry::new(primary)),
            bridge: Arc::new(ConflictBridge::new(config.dialog_timeout)),
            pipeline: SavePipeline::with_file_sync(config.file_sync),
            saver: Arc::new(DiskSaver),
        })
    }

    /// Replace the disk saver. Used by embeddings that need custom
    /// persistence and by tests.
    #[must_use]
    pub fn with_saver(mut self, saver: Arc<dyn FileSaver>) -> Self {
        self.saver = saver;
        self
    }

    /// Track a fragment file, reading its current disk content as the
    /// baseline. Re-tracking an already-tracked path re-adopts from disk.
    pub async fn track_fragment(&self, raw_path: &str, kind: FileKind) -> Result<(), SessionError> {
        if !kind.is_fragment() {
            return Err(SessionError::NotAFragment {
                kind: kind.as_str(),
            });
        }
        let mut registry = self.registry.lock().await;
        let path = registry
            .resolve(raw_path)
            .ok_or_else(|| SessionError::BadPath {
                path: raw_path.to_string(),
            })?;
        let relative = relative_to(&path, registry.primary_dir());
        let (content, mtime) = read_with_mtime(&path).await?;
        registry.track(TrackedFile::adopted(path, relative, kind, content, mtime));
        Ok(())
    }

    /// Stop tracking a fragment. Returns false for unknown paths and for the
    /// primary file, which cannot be untracked.
    pub async fn untrack(&self, raw_path: &str) -> bool {
        let mut registry = self.registry.lock().await;
        let Some(path) = registry.resolve(raw_path) else {
            return false;
        };
        registry.unregister(&path).is_some()
    }

    /// Replace a file's canonical content (a programmatic edit).
    pub async fn update_content(&self, raw_path: &str, content: String) -> Result<(), SessionError> {
        self.with_file(raw_path, |file| file.set_content(content))
            .await
    }

    /// Record the live text of the secondary editing surface.
    pub async fn update_editor_buffer(
        &self,
        raw_path: &str,
        text: String,
    ) -> Result<(), SessionError> {
        self.with_file(raw_path, |file| file.set_editor_buffer(text))
            .await
    }

    /// Enter or leave edit mode. Leaving discards unflushed keystrokes; the
    /// caller is responsible for flushing or confirming first.
    pub async fn set_edit_mode(&self, raw_path: &str, editing: bool) -> Result<(), SessionError> {
        self.with_file(raw_path, |file| {
            if editing {
                file.enter_edit_mode();
            } else {
                file.exit_edit_mode();
            }
        })
        .await
    }

    /// Full registry view plus the token required for batch submissions.
    /// Refreshes disk state first, so the summaries reflect current reality.
    pub async fn tracked_files_state(&self) -> TrackedFilesState {
        let mut registry = self.registry.lock().await;
        registry.refresh_all_disk_state().await;
        registry.state_summary()
    }

    /// Execute a batch of conflict-resolution actions against the current
    /// state. See [`executor::execute_batch`] for the phase contract.
    pub async fn apply_batch_file_actions(
        &self,
        token: &SnapshotToken,
        requests: &[ActionRequest],
    ) -> BatchReport {
        let mut registry = self.registry.lock().await;
        execute_batch(&mut registry, self.saver.as_ref(), token, requests).await
    }

    /// Route a conflict dialog answer to its waiting session.
    pub fn handle_conflict_reply(&self, reply: ConflictReply) {
        self.bridge.handle_reply(reply);
    }

    /// Cancel every pending conflict dialog.
    pub fn cancel_all_dialogs(&self) {
        self.bridge.cancel_all();
    }

    /// Number of conflict dialogs currently awaiting an answer.
    #[must_use]
    pub fn pending_dialogs(&self) -> usize {
        self.bridge.pending_count()
    }

    /// Save dirty files in scope, running the pre-save conflict handshake
    /// over `transport` when external changes are found.
    pub async fn save(
        &self,
        transport: &dyn ConflictTransport,
        scope: SaveScope,
    ) -> Result<SaveOutcome, PipelineError> {
        self.pipeline
            .save(
                &self.registry,
                &self.bridge,
                transport,
                self.saver.as_ref(),
                scope,
            )
            .await
    }

    /// Read-only three-way digest diagnostics across all tracked files.
    pub async fn verify_content_sync(
        &self,
        frontend_digests: Option<&HashMap<String, String>>,
    ) -> ContentSyncReport {
        let registry = self.registry.lock().await;
        verify_content_sync(&registry, frontend_digests).await
    }

    /// Registry self-check diagnostics.
    pub async fn consistency_report(&self) -> ConsistencyReport {
        self.registry.lock().await.consistency_report()
    }

    async fn with_file(
        &self,
        raw_path: &str,
        apply: impl FnOnce(&mut TrackedFile),
    ) -> Result<(), SessionError> {
        let mut registry = self.registry.lock().await;
        match registry.find_by_path_mut(raw_path) {
            Some(file) => {
                apply(file);
                Ok(())
            }
            None => Err(SessionError::NotTracked {
                path: raw_path.to_string(),
            }),
        }
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.bridge.cancel_all();
    }
}

/// Read a file and its mtime for adoption, restoring a leftover `.bak` from
/// an interrupted atomic write first.
async fn read_with_mtime(path: &Path) -> Result<(String, Option<std::time::SystemTime>), SessionError> {
    let recover_path = path.to_path_buf();
    let _ = tokio::task::spawn_blocking(move || recover_bak_file(&recover_path)).await;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SessionError::Read {
            path: path.display().to_string(),
            source,
        })?;
    let mtime = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok());
    Ok((content, mtime))
}

/// Best-effort relative form for display: strip the primary directory prefix
/// when the path lives under it, otherwise keep the absolute path.
fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}
