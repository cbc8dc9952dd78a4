//! Batch file actions and their structured per-item outcomes.
//!
//! Once a batch enters the executor, nothing throws: every request ends as
//! exactly one [`ActionOutcome`], and the batch-level summary is derived from
//! the outcome list, never tracked separately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five recognized per-file actions a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileAction {
    /// Write canonical content over the disk file.
    Overwrite,
    /// Back up the *disk* content to a visible conflict file, then overwrite.
    OverwriteWithExternalBackup,
    /// Discard canonical content and adopt the disk content.
    LoadExternal,
    /// Back up the *canonical* content to a visible conflict file, then adopt disk.
    LoadExternalWithLocalBackup,
    /// Do nothing for this file.
    Skip,
}

impl FileAction {
    /// Parse a wire action name. `None` means the action is unsupported.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "overwrite" => Some(Self::Overwrite),
            "overwrite-with-external-backup" => Some(Self::OverwriteWithExternalBackup),
            "load-external" => Some(Self::LoadExternal),
            "load-external-with-local-backup" => Some(Self::LoadExternalWithLocalBackup),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::OverwriteWithExternalBackup => "overwrite-with-external-backup",
            Self::LoadExternal => "load-external",
            Self::LoadExternalWithLocalBackup => "load-external-with-local-backup",
            Self::Skip => "skip",
        }
    }

    #[must_use]
    pub const fn requires_backup(self) -> bool {
        matches!(
            self,
            Self::OverwriteWithExternalBackup | Self::LoadExternalWithLocalBackup
        )
    }

    /// Whether this action writes canonical content to disk.
    #[must_use]
    pub const fn is_overwrite(self) -> bool {
        matches!(self, Self::Overwrite | Self::OverwriteWithExternalBackup)
    }

    /// Whether this action replaces canonical content with disk content.
    #[must_use]
    pub const fn is_reload(self) -> bool {
        matches!(self, Self::LoadExternal | Self::LoadExternalWithLocalBackup)
    }
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw (path, action) pair as submitted by the presentation layer.
///
/// Both fields stay unparsed strings at the wire boundary; the executor's
/// preflight phase is the single place they are validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub path: String,
    pub action: String,
}

impl ActionRequest {
    #[must_use]
    pub fn new(path: impl Into<String>, action: FileAction) -> Self {
        Self {
            path: path.into(),
            action: action.as_str().to_string(),
        }
    }
}

/// Structured per-item failure taxonomy.
///
/// Validation and backup-phase errors never reach disk mutation; only
/// `ExecutionError` can occur after mutation has begun.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum ActionError {
    #[error("request path is empty")]
    MissingPath,
    #[error("unsupported action: {raw}")]
    UnsupportedAction { raw: String },
    #[error("file is not tracked: {path}")]
    FileNotFound { path: String },
    #[error("file is not accessible: {reason}")]
    Inaccessible { reason: String },
    #[error("editor buffer holds unsaved keystrokes; overwrite would discard them")]
    EditorDirtyBlocksOverwrite,
    #[error("unsaved changes present; use load-external-with-local-backup")]
    UnsavedBlocksUnsafeReload,
    #[error("duplicate request resolving to the same file")]
    DuplicateRequest,
    #[error("backup creation failed: {detail}")]
    BackupFailed { detail: String },
    #[error("snapshot token is stale; refresh file state and retry")]
    SnapshotStale,
    #[error("batch aborted during preflight")]
    BatchAborted,
    #[error("{detail}")]
    ExecutionError { detail: String },
}

/// Why an item was skipped rather than applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The caller asked for `skip`; reported skipped, never an error.
    Requested,
    /// A prior request in the same batch resolved to the same file.
    Duplicate,
    /// An earlier item failed during the apply phase; this one was never attempted.
    BatchStopped,
}

impl SkipReason {
    #[must_use]
    pub const fn note(self) -> &'static str {
        match self {
            Self::Requested => "skip requested",
            Self::Duplicate => "duplicate request resolving to the same file",
            Self::BatchStopped => "batch stopped after prior failure",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.note())
    }
}

/// Terminal state of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ActionStatus {
    Applied,
    Skipped { reason: SkipReason },
    Failed { error: ActionError },
}

impl ActionStatus {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One result per request, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Resolved absolute path when resolution succeeded, otherwise the raw
    /// request path echoed back.
    pub path: String,
    /// `None` when the wire action name did not parse.
    pub action: Option<FileAction>,
    #[serde(flatten)]
    pub status: ActionStatus,
    /// Path of the visible backup file, when one was created for this item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

impl ActionOutcome {
    #[must_use]
    pub fn applied(path: impl Into<String>, action: FileAction) -> Self {
        Self {
            path: path.into(),
            action: Some(action),
            status: ActionStatus::Applied,
            backup: None,
        }
    }

    #[must_use]
    pub fn skipped(path: impl Into<String>, action: Option<FileAction>, reason: SkipReason) -> Self {
        Self {
            path: path.into(),
            action,
            status: ActionStatus::Skipped { reason },
            backup: None,
        }
    }

    #[must_use]
    pub fn failed(path: impl Into<String>, action: Option<FileAction>, error: ActionError) -> Self {
        Self {
            path: path.into(),
            action,
            status: ActionStatus::Failed { error },
            backup: None,
        }
    }

    #[must_use]
    pub fn with_backup(mut self, backup: impl Into<String>) -> Self {
        self.backup = Some(backup.into());
        self
    }
}

/// Batch-level summary derived from the per-item outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub applied_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub backup_count: usize,
    pub results: Vec<ActionOutcome>,
}

impl BatchReport {
    /// Summarize a finished outcome list. `success` means no item failed.
    #[must_use]
    pub fn summarize(results: Vec<ActionOutcome>) -> Self {
        let mut applied = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut backups = 0;
        for outcome in &results {
            match &outcome.status {
                ActionStatus::Applied => applied += 1,
                ActionStatus::Skipped { .. } => skipped += 1,
                ActionStatus::Failed { .. } => failed += 1,
            }
            if outcome.backup.is_some() {
                backups += 1;
            }
        }
        Self {
            success: failed == 0,
            applied_count: applied,
            failed_count: failed,
            skipped_count: skipped,
            backup_count: backups,
            results,
        }
    }
}
