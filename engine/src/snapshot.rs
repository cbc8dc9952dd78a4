//! Snapshot token generation.
//!
//! The token is the optimistic-concurrency authority for every mutating
//! submission: a dialog built from state at time T0 may be answered at T1
//! after files changed underneath it, and the token - not wall-clock time -
//! decides whether the answer still applies.

use std::time::UNIX_EPOCH;

use vellum_types::SnapshotToken;
use vellum_utils::content_digest;

use crate::registry::FileRegistry;

/// Derive the registry fingerprint from the ordered set of
/// (path, content digest, disk mtime, accessibility) across all tracked
/// files. Deterministic and cheap enough to recompute on every refresh.
#[must_use]
pub fn compute_snapshot_token(registry: &FileRegistry) -> SnapshotToken {
    let mut acc = String::new();
    for file in registry.all() {
        acc.push_str(&file.path().display().to_string());
        acc.push('\u{1f}');
        acc.push_str(&file.content_digest());
        acc.push('\u{1f}');
        let mtime_nanos = file
            .disk_mtime()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        acc.push_str(&mtime_nanos.to_string());
        acc.push('\u{1f}');
        acc.push_str(file.disk_state().as_str());
        acc.push('\n');
    }
    SnapshotToken::from_digest(content_digest(&acc))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vellum_types::FileKind;

    use super::compute_snapshot_token;
    use crate::registry::FileRegistry;
    use crate::tracked_file::TrackedFile;

    fn registry() -> FileRegistry {
        let mut registry = FileRegistry::new(TrackedFile::adopted(
            PathBuf::from("/doc/board.md"),
            PathBuf::from("board.md"),
            FileKind::Primary,
            "primary content".to_string(),
            None,
        ));
        registry.track(TrackedFile::adopted(
            PathBuf::from("/doc/notes.md"),
            PathBuf::from("notes.md"),
            FileKind::FragmentBlock,
            "fragment content".to_string(),
            None,
        ));
        registry
    }

    #[test]
    fn identical_state_produces_identical_tokens() {
        let a = registry();
        let b = registry();
        assert_eq!(compute_snapshot_token(&a), compute_snapshot_token(&b));
        // Recomputation over unchanged state is stable too.
        assert_eq!(compute_snapshot_token(&a), compute_snapshot_token(&a));
    }

    #[test]
    fn content_mutation_invalidates_the_token() {
        let mut registry = registry();
        let before = compute_snapshot_token(&registry);

        registry
            .get_mut(&PathBuf::from("/doc/notes.md"))
            .expect("fragment")
            .set_content("edited".to_string());

        assert_ne!(before, compute_snapshot_token(&registry));
    }

    #[test]
    fn tracking_or_untracking_a_file_invalidates_the_token() {
        let mut registry = registry();
        let before = compute_snapshot_token(&registry);

        registry.track(TrackedFile::adopted(
            PathBuf::from("/doc/extra.md"),
            PathBuf::from("extra.md"),
            FileKind::FragmentInline,
            String::new(),
            None,
        ));
        let with_extra = compute_snapshot_token(&registry);
        assert_ne!(before, with_extra);

        registry.unregister(&PathBuf::from("/doc/extra.md"));
        assert_eq!(before, compute_snapshot_token(&registry));
    }
}
