//! Per-file state as exposed to read-only observers.

use serde::{Deserialize, Serialize};

/// Role of a tracked file within the logical document.
///
/// The three fragment variants correspond to the embedding styles the primary
/// document supports: block embeds, inline embeds, and slide embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    Primary,
    FragmentBlock,
    FragmentInline,
    FragmentSlide,
}

impl FileKind {
    #[must_use]
    pub const fn is_primary(self) -> bool {
        matches!(self, Self::Primary)
    }

    #[must_use]
    pub const fn is_fragment(self) -> bool {
        !self.is_primary()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::FragmentBlock => "fragment-block",
            Self::FragmentInline => "fragment-inline",
            Self::FragmentSlide => "fragment-slide",
        }
    }
}

/// Disk accessibility of a tracked file at the last refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiskState {
    Ok,
    Missing,
    PermissionDenied,
    Io,
}

impl DiskState {
    #[must_use]
    pub const fn is_accessible(self) -> bool {
        matches!(self, Self::Ok)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Missing => "missing",
            Self::PermissionDenied => "permission-denied",
            Self::Io => "io-error",
        }
    }
}

impl std::fmt::Display for DiskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conflict-relevant snapshot of one tracked file, sent to the presentation
/// layer in state refreshes and conflict requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStateSummary {
    pub path: String,
    pub relative_path: String,
    pub kind: FileKind,
    pub disk_state: DiskState,
    /// OS error code string from the last failed disk access, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub access_error: Option<String>,
    /// Disk content hash differs from the baseline hash.
    pub has_external_change: bool,
    /// Canonical content differs from the baseline (programmatic edits).
    pub has_internal_change: bool,
    /// A live text-editing surface holds keystrokes not yet flushed into
    /// canonical content.
    pub has_editor_buffer_change: bool,
    pub in_edit_mode: bool,
}

impl FileStateSummary {
    /// Derived flag: anything unsaved from either mutation source.
    #[must_use]
    pub fn has_any_unsaved(&self) -> bool {
        self.has_internal_change || self.has_editor_buffer_change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_any_unsaved_is_or_of_the_two_flags() {
        let mut summary = FileStateSummary {
            path: "/doc/board.md".to_string(),
            relative_path: "board.md".to_string(),
            kind: FileKind::Primary,
            disk_state: DiskState::Ok,
            access_error: None,
            has_external_change: false,
            has_internal_change: false,
            has_editor_buffer_change: false,
            in_edit_mode: false,
        };
        assert!(!summary.has_any_unsaved());
        summary.has_internal_change = true;
        assert!(summary.has_any_unsaved());
        summary.has_internal_change = false;
        summary.has_editor_buffer_change = true;
        assert!(summary.has_any_unsaved());
    }

    #[test]
    fn kind_and_disk_state_use_kebab_wire_names() {
        assert_eq!(
            serde_json::to_value(FileKind::FragmentBlock).expect("serialize"),
            "fragment-block"
        );
        assert_eq!(
            serde_json::to_value(DiskState::PermissionDenied).expect("serialize"),
            "permission-denied"
        );
    }
}
