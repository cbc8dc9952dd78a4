//! One tracked physical file and its three independent dirty flags.
//!
//! A `TrackedFile` owns the canonical in-memory text plus the `baseline` it
//! was last known to share with disk. Divergence is always detected by
//! comparing content digests, never timestamps: the mtime is carried only as
//! snapshot-token input.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use tracing::debug;

use vellum_types::{DiskState, FileKind, FileStateSummary};
use vellum_utils::{atomic_write_new, content_digest};

/// In-memory state for one physical file of the logical document.
#[derive(Debug)]
pub struct TrackedFile {
    path: PathBuf,
    relative_path: PathBuf,
    kind: FileKind,
    /// Canonical text, owned by the registry.
    content: String,
    /// Content last known to match disk (updated on save and reload).
    baseline: String,
    /// Live keystrokes from the secondary editing surface, not yet flushed
    /// into canonical content.
    editor_buffer: Option<String>,
    in_edit_mode: bool,
    disk_state: DiskState,
    disk_digest: Option<String>,
    disk_mtime: Option<SystemTime>,
    access_error: Option<String>,
}

impl TrackedFile {
    /// Track a file whose content was just read from disk, so content,
    /// baseline, and disk copy all agree.
    #[must_use]
    pub fn adopted(
        path: PathBuf,
        relative_path: PathBuf,
        kind: FileKind,
        content: String,
        disk_mtime: Option<SystemTime>,
    ) -> Self {
        let disk_digest = Some(content_digest(&content));
        Self {
            path,
            relative_path,
            kind,
            baseline: content.clone(),
            content,
            editor_buffer: None,
            in_edit_mode: false,
            disk_state: DiskState::Ok,
            disk_digest,
            disk_mtime,
            access_error: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    #[must_use]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    #[must_use]
    pub fn disk_state(&self) -> DiskState {
        self.disk_state
    }

    #[must_use]
    pub fn disk_mtime(&self) -> Option<SystemTime> {
        self.disk_mtime
    }

    /// OS error code string from the last failed disk access.
    #[must_use]
    pub fn last_access_error_code(&self) -> Option<&str> {
        self.access_error.as_deref()
    }

    /// Replace canonical content (a programmatic edit). Baseline is untouched,
    /// so the file becomes internally dirty until saved.
    pub fn set_content(&mut self, content: String) {
        self.content = content;
    }

    pub fn enter_edit_mode(&mut self) {
        self.in_edit_mode = true;
    }

    /// Leave edit mode and drop any unflushed keystrokes.
    ///
    /// Only called after the user consented to discard them (reload actions)
    /// or after the buffer has been flushed.
    pub fn exit_edit_mode(&mut self) {
        self.in_edit_mode = false;
        self.editor_buffer = None;
    }

    #[must_use]
    pub fn is_in_edit_mode(&self) -> bool {
        self.in_edit_mode
    }

    /// Record the current text of the secondary editing surface.
    pub fn set_editor_buffer(&mut self, text: String) {
        self.editor_buffer = Some(text);
    }

    /// Whether the editing surface holds keystrokes not yet flushed into
    /// canonical content.
    #[must_use]
    pub fn is_dirty_in_editor(&self) -> bool {
        self.editor_buffer
            .as_ref()
            .is_some_and(|buffer| *buffer != self.content)
    }

    /// Flush editor keystrokes into canonical content. Returns true when the
    /// canonical content changed.
    pub fn flush_editor_buffer(&mut self) -> bool {
        match self.editor_buffer.take() {
            Some(buffer) if buffer != self.content => {
                self.content = buffer;
                true
            }
            _ => false,
        }
    }

    /// Canonical content differs from baseline (programmatic edits).
    #[must_use]
    pub fn has_internal_change(&self) -> bool {
        self.content != self.baseline
    }

    #[must_use]
    pub fn has_editor_buffer_change(&self) -> bool {
        self.is_dirty_in_editor()
    }

    #[must_use]
    pub fn has_any_unsaved(&self) -> bool {
        self.has_internal_change() || self.has_editor_buffer_change()
    }

    /// Disk content hash differs from the baseline hash.
    ///
    /// A missing or unreadable disk copy is an accessibility problem, not an
    /// external content change; preflight blocks acting on those separately.
    #[must_use]
    pub fn has_external_change(&self) -> bool {
        self.disk_state.is_accessible()
            && self
                .disk_digest
                .as_ref()
                .is_some_and(|digest| *digest != content_digest(&self.baseline))
    }

    /// Re-read disk metadata and content hash, classifying access failures.
    pub async fn refresh_disk_state(&mut self) {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(disk_content) => {
                self.disk_state = DiskState::Ok;
                self.disk_digest = Some(content_digest(&disk_content));
                self.access_error = None;
                self.disk_mtime = tokio::fs::metadata(&self.path)
                    .await
                    .ok()
                    .and_then(|meta| meta.modified().ok());
            }
            Err(e) => {
                self.disk_state = classify_io_error(&e);
                self.disk_digest = None;
                self.disk_mtime = None;
                self.access_error = Some(e.kind().to_string());
                debug!(
                    path = %self.path.display(),
                    state = %self.disk_state,
                    "Disk refresh failed: {e}"
                );
            }
        }
    }

    /// Read the current disk content without touching any in-memory state.
    pub async fn read_from_disk(&self) -> io::Result<String> {
        tokio::fs::read_to_string(&self.path).await
    }

    /// Adopt the disk content: replaces canonical content and baseline, exits
    /// edit mode, and discards any editor keystrokes.
    pub async fn reload(&mut self) -> io::Result<()> {
        let disk_content = match self.read_from_disk().await {
            Ok(content) => content,
            Err(e) => {
                self.disk_state = classify_io_error(&e);
                self.access_error = Some(e.kind().to_string());
                return Err(e);
            }
        };
        self.exit_edit_mode();
        self.baseline = disk_content.clone();
        self.disk_digest = Some(content_digest(&disk_content));
        self.content = disk_content;
        self.disk_state = DiskState::Ok;
        self.access_error = None;
        self.disk_mtime = tokio::fs::metadata(&self.path)
            .await
            .ok()
            .and_then(|meta| meta.modified().ok());
        Ok(())
    }

    /// Record a successful save of `content`: canonical content, baseline,
    /// and the disk fingerprint now agree.
    pub fn mark_saved(&mut self, content: String, disk_mtime: Option<SystemTime>) {
        self.disk_digest = Some(content_digest(&content));
        self.baseline = content.clone();
        self.content = content;
        self.editor_buffer = None;
        self.disk_state = DiskState::Ok;
        self.access_error = None;
        self.disk_mtime = disk_mtime;
    }

    /// The content a local backup should preserve: the canonical text.
    #[must_use]
    pub fn content_for_backup(&self) -> &str {
        &self.content
    }

    /// Write `content` to a visibly-named conflict file next to the original.
    ///
    /// Never overwrites an existing file: a numeric suffix is appended until
    /// an unused name is found.
    pub async fn create_visible_conflict_file(&self, content: &str) -> io::Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        for attempt in 0u32..100 {
            let candidate = self.conflict_file_path(&stamp, attempt);
            match write_new(&candidate, content).await {
                Ok(()) => {
                    debug!(
                        original = %self.path.display(),
                        backup = %candidate.display(),
                        "Created conflict backup"
                    );
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not find an unused conflict backup name",
        ))
    }

    fn conflict_file_path(&self, stamp: &str, attempt: u32) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("file");
        let ext = self.path.extension().and_then(|s| s.to_str());
        let counter = if attempt == 0 {
            String::new()
        } else {
            format!("-{attempt}")
        };
        let name = match ext {
            Some(ext) => format!("{stem}.conflict-{stamp}{counter}.{ext}"),
            None => format!("{stem}.conflict-{stamp}{counter}"),
        };
        self.path.with_file_name(name)
    }

    /// Conflict-relevant snapshot of this file for the presentation layer.
    #[must_use]
    pub fn summary(&self) -> FileStateSummary {
        FileStateSummary {
            path: self.path.display().to_string(),
            relative_path: self.relative_path.display().to_string(),
            kind: self.kind,
            disk_state: self.disk_state,
            access_error: self.access_error.clone(),
            has_external_change: self.has_external_change(),
            has_internal_change: self.has_internal_change(),
            has_editor_buffer_change: self.has_editor_buffer_change(),
            in_edit_mode: self.in_edit_mode,
        }
    }

    /// Digest of the canonical content, used by the snapshot token and the
    /// sync diagnostics.
    #[must_use]
    pub fn content_digest(&self) -> String {
        content_digest(&self.content)
    }
}

fn classify_io_error(e: &io::Error) -> DiskState {
    match e.kind() {
        io::ErrorKind::NotFound => DiskState::Missing,
        io::ErrorKind::PermissionDenied => DiskState::PermissionDenied,
        _ => DiskState::Io,
    }
}

async fn write_new(path: &Path, content: &str) -> io::Result<()> {
    let path = path.to_path_buf();
    let bytes = content.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || atomic_write_new(&path, &bytes))
        .await
        .map_err(|e| io::Error::other(format!("backup write task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vellum_types::{DiskState, FileKind};

    use super::TrackedFile;

    fn in_memory_file(content: &str) -> TrackedFile {
        TrackedFile::adopted(
            PathBuf::from("/doc/board.md"),
            PathBuf::from("board.md"),
            FileKind::Primary,
            content.to_string(),
            None,
        )
    }

    #[test]
    fn fresh_file_has_no_changes() {
        let file = in_memory_file("hello");
        assert!(!file.has_internal_change());
        assert!(!file.has_editor_buffer_change());
        assert!(!file.has_external_change());
        assert!(!file.has_any_unsaved());
    }

    #[test]
    fn set_content_makes_file_internally_dirty_until_marked_saved() {
        let mut file = in_memory_file("hello");
        file.set_content("hello world".to_string());
        assert!(file.has_internal_change());
        assert!(file.has_any_unsaved());

        file.mark_saved("hello world".to_string(), None);
        assert!(!file.has_internal_change());
        assert_eq!(file.baseline(), "hello world");
    }

    #[test]
    fn editor_buffer_equal_to_content_is_not_dirty() {
        let mut file = in_memory_file("hello");
        file.set_editor_buffer("hello".to_string());
        assert!(!file.is_dirty_in_editor());

        file.set_editor_buffer("hello!".to_string());
        assert!(file.is_dirty_in_editor());
    }

    #[test]
    fn flush_editor_buffer_moves_keystrokes_into_content() {
        let mut file = in_memory_file("hello");
        file.set_editor_buffer("hello there".to_string());
        assert!(file.flush_editor_buffer());
        assert_eq!(file.content(), "hello there");
        assert!(!file.is_dirty_in_editor());
        // Flushed but not yet saved.
        assert!(file.has_internal_change());
    }

    #[test]
    fn exit_edit_mode_discards_buffer() {
        let mut file = in_memory_file("hello");
        file.enter_edit_mode();
        file.set_editor_buffer("draft".to_string());
        file.exit_edit_mode();
        assert!(!file.is_in_edit_mode());
        assert!(!file.is_dirty_in_editor());
        assert_eq!(file.content(), "hello");
    }

    #[tokio::test]
    async fn refresh_classifies_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.md");
        let mut file = TrackedFile::adopted(
            path.clone(),
            PathBuf::from("gone.md"),
            FileKind::FragmentBlock,
            "x".to_string(),
            None,
        );
        file.refresh_disk_state().await;
        assert_eq!(file.disk_state(), DiskState::Missing);
        assert!(file.last_access_error_code().is_some());
        assert!(!file.has_external_change());
    }

    #[tokio::test]
    async fn refresh_detects_external_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frag.md");
        tokio::fs::write(&path, "original").await.expect("seed");

        let mut file = TrackedFile::adopted(
            path.clone(),
            PathBuf::from("frag.md"),
            FileKind::FragmentBlock,
            "original".to_string(),
            None,
        );
        file.refresh_disk_state().await;
        assert!(!file.has_external_change());

        tokio::fs::write(&path, "changed on disk").await.expect("mutate");
        file.refresh_disk_state().await;
        assert!(file.has_external_change());
    }

    #[tokio::test]
    async fn reload_adopts_disk_content_and_clears_dirty_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frag.md");
        tokio::fs::write(&path, "disk version").await.expect("seed");

        let mut file = TrackedFile::adopted(
            path.clone(),
            PathBuf::from("frag.md"),
            FileKind::FragmentInline,
            "memory version".to_string(),
            None,
        );
        file.enter_edit_mode();
        file.set_editor_buffer("keystrokes".to_string());

        file.reload().await.expect("reload");
        assert_eq!(file.content(), "disk version");
        assert_eq!(file.baseline(), "disk version");
        assert!(!file.is_in_edit_mode());
        assert!(!file.has_any_unsaved());
        assert!(!file.has_external_change());
    }

    #[tokio::test]
    async fn conflict_backup_gets_a_visible_name_and_never_clobbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, "current").await.expect("seed");

        let file = TrackedFile::adopted(
            path.clone(),
            PathBuf::from("notes.md"),
            FileKind::FragmentBlock,
            "current".to_string(),
            None,
        );

        let first = file
            .create_visible_conflict_file("backup one")
            .await
            .expect("first backup");
        let second = file
            .create_visible_conflict_file("backup two")
            .await
            .expect("second backup");

        assert_ne!(first, second);
        let name = first.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("notes.conflict-"));
        assert!(name.ends_with(".md"));
        assert_eq!(
            tokio::fs::read_to_string(&first).await.expect("read"),
            "backup one"
        );
        assert_eq!(
            tokio::fs::read_to_string(&second).await.expect("read"),
            "backup two"
        );
        // Original untouched.
        assert_eq!(
            tokio::fs::read_to_string(&path).await.expect("read"),
            "current"
        );
    }
}
