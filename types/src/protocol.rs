//! Wire payloads exchanged with the presentation layer.
//!
//! Field names are camelCase on the wire to match the presentation layer's
//! conventions. These types are deliberately plain data: the engine owns all
//! behavior.

use serde::{Deserialize, Serialize};

use crate::action::FileAction;
use crate::file_state::FileStateSummary;
use crate::ids::SessionId;
use crate::token::SnapshotToken;

/// Pull-based state refresh: the full registry view plus the token a caller
/// must hold to submit batch actions against this state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFilesState {
    pub primary_path: String,
    pub files: Vec<FileStateSummary>,
    pub snapshot_token: SnapshotToken,
}

/// Why a conflict dialog is being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictMode {
    /// A save found in-scope files whose disk content diverged from baseline.
    PreSaveConflict,
    /// The engine wants permission to reload externally-changed files.
    ReloadRequest,
    /// User-initiated review of accumulated external changes.
    ExternalChangeReview,
}

/// Core → UI: one conflict dialog request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRequest {
    pub session_id: SessionId,
    pub mode: ConflictMode,
    pub files: Vec<FileStateSummary>,
    pub snapshot_token: SnapshotToken,
}

/// The user's chosen action for one file in a conflict dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResolution {
    pub path: String,
    pub action: FileAction,
}

/// UI → core: the dialog's answer for a pending session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReply {
    pub session_id: SessionId,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub resolutions: Vec<FileResolution>,
    /// Token the responder saw when answering. A mismatch against the
    /// session's expected token forces cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_token: Option<SnapshotToken>,
}

/// Read-only three-way digest comparison result for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSyncResult {
    pub path: String,
    pub registry_digest: String,
    /// `None` when the disk copy could not be read.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub disk_digest: Option<String>,
    /// `None` when the frontend did not supply a digest for this file.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub frontend_digest: Option<String>,
    pub in_sync: bool,
}

/// Diagnostic summary across all tracked files; never used for mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSyncReport {
    pub matching_files: usize,
    pub mismatched_files: usize,
    pub file_results: Vec<FileSyncResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_reply_defaults_allow_minimal_payloads() {
        let id = SessionId::generate();
        let raw = format!("{{\"sessionId\":\"{id}\"}}");
        let reply: ConflictReply = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(reply.session_id, id);
        assert!(!reply.cancelled);
        assert!(reply.resolutions.is_empty());
        assert!(reply.responded_token.is_none());
    }

    #[test]
    fn conflict_request_uses_camel_case_wire_names() {
        let request = ConflictRequest {
            session_id: SessionId::generate(),
            mode: ConflictMode::PreSaveConflict,
            files: Vec::new(),
            snapshot_token: SnapshotToken::from_digest("abc123".to_string()),
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["mode"], "pre-save-conflict");
        assert!(json.get("sessionId").is_some());
        assert!(json.get("snapshotToken").is_some());
    }
}
