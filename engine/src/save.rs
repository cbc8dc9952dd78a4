//! The save pipeline: pre-save conflict detection, the dialog round trip,
//! then persisting dirty in-scope files.
//!
//! All saves serialize behind one async mutex, so two overlapping save
//! requests run back to back instead of deduplicating into a shared result.
//! The second save sees the state the first one left behind and usually
//! finds nothing left to do.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use vellum_types::{ActionRequest, BatchReport, ConflictMode};
use vellum_utils::{FileSyncPolicy, normalize_path};

use crate::bridge::{ConflictBridge, ConflictResolution, ConflictTransport};
use crate::executor::execute_batch;
use crate::registry::FileRegistry;
use crate::saver::{FileSaver, SaveError, SaveOptions};
use crate::snapshot::compute_snapshot_token;
use crate::tracked_file::TrackedFile;

/// Which tracked files one save request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveScope {
    /// The primary file and every fragment.
    Document,
    PrimaryOnly,
    Fragments,
    /// One file, by absolute or registry-resolved path.
    Single(PathBuf),
}

impl SaveScope {
    fn covers(&self, file: &TrackedFile) -> bool {
        match self {
            Self::Document => true,
            Self::PrimaryOnly => file.kind().is_primary(),
            Self::Fragments => file.kind().is_fragment(),
            Self::Single(path) => normalize_path(file.path()) == normalize_path(path),
        }
    }
}

/// Terminal state of one save request.
#[derive(Debug)]
pub enum SaveOutcome {
    /// These files were written to disk.
    Saved { files: Vec<String> },
    /// Nothing in scope was dirty.
    NoChanges,
    /// The user cancelled the pre-save conflict dialog (or it timed out).
    Cancelled,
    /// The user resolved the conflict by loading disk content, so there was
    /// nothing left to write.
    ReloadedInstead { report: BatchReport },
    /// The conflict-resolution batch did not succeed; no further save was
    /// attempted. The report explains each item.
    ConflictActionsFailed { report: BatchReport },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Serializes save requests and runs the pre-save conflict handshake.
#[derive(Debug, Default)]
pub struct SavePipeline {
    lock: tokio::sync::Mutex<()>,
    file_sync: FileSyncPolicy,
}

impl SavePipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file_sync(file_sync: FileSyncPolicy) -> Self {
        Self {
            lock: tokio::sync::Mutex::new(()),
            file_sync,
        }
    }

    /// Save every dirty file the scope covers.
    ///
    /// When in-scope files changed on disk since the last sync, the save
    /// suspends on a conflict dialog first and only proceeds as the user
    /// directed. The registry lock is never held across the dialog await.
    pub async fn save(
        &self,
        registry: &tokio::sync::Mutex<FileRegistry>,
        bridge: &ConflictBridge,
        transport: &dyn ConflictTransport,
        saver: &dyn FileSaver,
        scope: SaveScope,
    ) -> Result<SaveOutcome, PipelineError> {
        let _serialized = self.lock.lock().await;

        let (conflicted, token) = {
            let mut registry = registry.lock().await;
            refresh_in_scope(&mut registry, &scope).await;
            let conflicted: Vec<_> = registry
                .all()
                .filter(|file| scope.covers(file) && file.has_external_change())
                .map(TrackedFile::summary)
                .collect();
            (conflicted, compute_snapshot_token(&registry))
        };

        if !conflicted.is_empty() {
            info!(
                conflicts = conflicted.len(),
                "External changes detected before save; asking the user"
            );
            let resolution = bridge
                .show_conflict(transport, ConflictMode::PreSaveConflict, conflicted, token.clone())
                .await;
            let resolutions = match resolution {
                ConflictResolution::Cancelled => return Ok(SaveOutcome::Cancelled),
                ConflictResolution::Apply(resolutions) => resolutions,
            };

            let requests: Vec<ActionRequest> = resolutions
                .iter()
                .map(|r| ActionRequest::new(r.path.clone(), r.action))
                .collect();
            let reloaded = resolutions.iter().any(|r| r.action.is_reload());

            let mut registry = registry.lock().await;
            let report = execute_batch(&mut registry, saver, &token, &requests).await;
            if !report.success {
                return Ok(SaveOutcome::ConflictActionsFailed { report });
            }
            if reloaded {
                // Disk content was adopted; there is nothing left to write.
                return Ok(SaveOutcome::ReloadedInstead { report });
            }
            drop(registry);
        }

        let mut registry = registry.lock().await;
        let saved = self
            .save_dirty_in_scope(&mut registry, saver, &scope)
            .await?;
        if saved.is_empty() {
            debug!("Nothing in scope was dirty");
            Ok(SaveOutcome::NoChanges)
        } else {
            info!(files = saved.len(), "Save complete");
            Ok(SaveOutcome::Saved { files: saved })
        }
    }

    async fn save_dirty_in_scope(
        &self,
        registry: &mut FileRegistry,
        saver: &dyn FileSaver,
        scope: &SaveScope,
    ) -> Result<Vec<String>, PipelineError> {
        let mut saved = Vec::new();
        for file in registry.all_mut() {
            if !scope.covers(file) {
                continue;
            }
            file.flush_editor_buffer();
            if !file.has_internal_change() {
                continue;
            }
            // A file the user chose to leave conflicted stays untouched.
            if file.has_external_change() {
                debug!(
                    path = %file.path().display(),
                    "Leaving conflicted file unsaved as resolved"
                );
                continue;
            }
            saver
                .save_file(
                    file,
                    None,
                    SaveOptions {
                        force: false,
                        file_sync: self.file_sync,
                    },
                )
                .await?;
            saved.push(file.path().display().to_string());
        }
        Ok(saved)
    }
}

async fn refresh_in_scope(registry: &mut FileRegistry, scope: &SaveScope) {
    for file in registry.all_mut() {
        if scope.covers(file) {
            file.refresh_disk_state().await;
        }
    }
}
