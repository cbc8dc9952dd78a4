//! The file registry: single mutable source of truth for canonical content.
//!
//! A pure in-memory index keyed by normalized absolute path. Nothing here
//! mutates disk; disk access is delegated to each tracked file's own methods,
//! and only the save pipeline and batch executor are permitted to call the
//! mutating ones.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use vellum_types::{FileStateSummary, TrackedFilesState};
use vellum_utils::{normalize_path, resolve_against};

use crate::snapshot::compute_snapshot_token;
use crate::tracked_file::TrackedFile;

/// Ordered index of all tracked files. Iteration order is the path order,
/// which keeps snapshot tokens deterministic.
#[derive(Debug)]
pub struct FileRegistry {
    primary_path: PathBuf,
    files: BTreeMap<PathBuf, TrackedFile>,
}

/// One detected registry anomaly. These are diagnostics, never fixed
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// An entry's stored path is not in normalized form, so lookups can miss it.
    UnnormalizedPath { path: PathBuf },
    /// Two entries resolve to the same absolute path.
    ResolvedPathCollision { first: PathBuf, second: PathBuf },
    /// A fragment entry points at the session's primary file.
    FragmentShadowsPrimary { path: PathBuf },
    /// An entry is flagged primary but is not the session's primary file.
    StrayPrimaryFlag { path: PathBuf },
    /// The session's primary file is not tracked at all.
    PrimaryUntracked { path: PathBuf },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnnormalizedPath { path } => {
                write!(f, "entry path is not normalized: {}", path.display())
            }
            Self::ResolvedPathCollision { first, second } => write!(
                f,
                "entries resolve to the same file: {} and {}",
                first.display(),
                second.display()
            ),
            Self::FragmentShadowsPrimary { path } => {
                write!(f, "fragment entry points at the primary file: {}", path.display())
            }
            Self::StrayPrimaryFlag { path } => {
                write!(f, "entry flagged primary is not the primary file: {}", path.display())
            }
            Self::PrimaryUntracked { path } => {
                write!(f, "primary file is not tracked: {}", path.display())
            }
        }
    }
}

/// Result of a registry self-check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    pub anomalies: Vec<Anomaly>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.anomalies.is_empty()
    }
}

impl FileRegistry {
    /// Create a registry around its primary file.
    #[must_use]
    pub fn new(primary: TrackedFile) -> Self {
        let primary_path = normalize_path(primary.path());
        let mut files = BTreeMap::new();
        files.insert(primary_path.clone(), primary);
        Self {
            primary_path,
            files,
        }
    }

    #[must_use]
    pub fn primary_path(&self) -> &Path {
        &self.primary_path
    }

    /// Directory relative paths are resolved against.
    #[must_use]
    pub fn primary_dir(&self) -> &Path {
        self.primary_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Track a file, replacing any previous entry for the same resolved path.
    pub fn track(&mut self, file: TrackedFile) -> Option<TrackedFile> {
        let key = normalize_path(file.path());
        self.files.insert(key, file)
    }

    /// Stop tracking a file. The primary file cannot be unregistered.
    pub fn unregister(&mut self, path: &Path) -> Option<TrackedFile> {
        let key = normalize_path(path);
        if key == self.primary_path {
            return None;
        }
        self.files.remove(&key)
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(&normalize_path(path))
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut TrackedFile> {
        self.files.get_mut(&normalize_path(path))
    }

    /// Resolve a raw caller path (absolute or relative to the primary file's
    /// directory) to the registry key form. Empty paths do not resolve.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<PathBuf> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(resolve_against(self.primary_dir(), Path::new(raw)))
    }

    /// Look up by absolute or relative path.
    #[must_use]
    pub fn find_by_path(&self, raw: &str) -> Option<&TrackedFile> {
        let key = self.resolve(raw)?;
        self.files.get(&key)
    }

    pub fn find_by_path_mut(&mut self, raw: &str) -> Option<&mut TrackedFile> {
        let key = self.resolve(raw)?;
        self.files.get_mut(&key)
    }

    #[must_use]
    pub fn primary(&self) -> Option<&TrackedFile> {
        self.files.get(&self.primary_path)
    }

    pub fn primary_mut(&mut self) -> Option<&mut TrackedFile> {
        self.files.get_mut(&self.primary_path)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files
            .values()
            .filter(|file| file.kind().is_fragment())
    }

    pub fn all(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut TrackedFile> {
        self.files.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Re-read disk metadata for every tracked file.
    pub async fn refresh_all_disk_state(&mut self) {
        for file in self.files.values_mut() {
            file.refresh_disk_state().await;
        }
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<FileStateSummary> {
        self.files.values().map(TrackedFile::summary).collect()
    }

    /// Full state refresh payload for the presentation layer.
    #[must_use]
    pub fn state_summary(&self) -> TrackedFilesState {
        TrackedFilesState {
            primary_path: self.primary_path.display().to_string(),
            files: self.summaries(),
            snapshot_token: compute_snapshot_token(self),
        }
    }

    /// Detect anomalies: colliding resolved paths, stray primary flags, a
    /// fragment entry shadowing the primary, or a missing primary entry.
    #[must_use]
    pub fn consistency_report(&self) -> ConsistencyReport {
        let mut anomalies = Vec::new();
        let mut resolved: BTreeMap<PathBuf, &PathBuf> = BTreeMap::new();

        for (key, file) in &self.files {
            let normalized = normalize_path(file.path());
            if *key != normalized {
                anomalies.push(Anomaly::UnnormalizedPath { path: key.clone() });
            }
            if let Some(existing) = resolved.insert(normalized.clone(), key) {
                anomalies.push(Anomaly::ResolvedPathCollision {
                    first: existing.clone(),
                    second: key.clone(),
                });
            }

            let is_primary_path = normalized == self.primary_path;
            if file.kind().is_fragment() && is_primary_path {
                anomalies.push(Anomaly::FragmentShadowsPrimary { path: key.clone() });
            }
            if file.kind().is_primary() && !is_primary_path {
                anomalies.push(Anomaly::StrayPrimaryFlag { path: key.clone() });
            }
        }

        if !self.files.contains_key(&self.primary_path) {
            anomalies.push(Anomaly::PrimaryUntracked {
                path: self.primary_path.clone(),
            });
        }

        ConsistencyReport { anomalies }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vellum_types::FileKind;

    use super::{Anomaly, FileRegistry};
    use crate::tracked_file::TrackedFile;

    fn file(path: &str, relative: &str, kind: FileKind) -> TrackedFile {
        TrackedFile::adopted(
            PathBuf::from(path),
            PathBuf::from(relative),
            kind,
            String::new(),
            None,
        )
    }

    fn registry_with_fragment() -> FileRegistry {
        let mut registry = FileRegistry::new(file("/doc/board.md", "board.md", FileKind::Primary));
        registry.track(file(
            "/doc/frags/notes.md",
            "frags/notes.md",
            FileKind::FragmentBlock,
        ));
        registry
    }

    #[test]
    fn find_by_path_accepts_absolute_and_relative_forms() {
        let registry = registry_with_fragment();

        let by_abs = registry.find_by_path("/doc/frags/notes.md").expect("absolute");
        assert_eq!(by_abs.relative_path(), PathBuf::from("frags/notes.md"));

        let by_rel = registry.find_by_path("frags/notes.md").expect("relative");
        assert_eq!(by_rel.path(), by_abs.path());

        let by_messy = registry
            .find_by_path("./frags/../frags/notes.md")
            .expect("unnormalized relative");
        assert_eq!(by_messy.path(), by_abs.path());

        assert!(registry.find_by_path("frags/other.md").is_none());
        assert!(registry.find_by_path("").is_none());
        assert!(registry.find_by_path("   ").is_none());
    }

    #[test]
    fn unregister_refuses_the_primary_file() {
        let mut registry = registry_with_fragment();
        assert!(registry.unregister(&PathBuf::from("/doc/board.md")).is_none());
        assert!(registry
            .unregister(&PathBuf::from("/doc/frags/notes.md"))
            .is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn fragments_excludes_the_primary() {
        let registry = registry_with_fragment();
        let fragments: Vec<_> = registry.fragments().collect();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].kind().is_fragment());
        assert!(registry.primary().is_some());
    }

    #[test]
    fn consistent_registry_reports_no_anomalies() {
        let registry = registry_with_fragment();
        assert!(registry.consistency_report().is_consistent());
    }

    #[test]
    fn fragment_pointing_at_primary_is_an_anomaly() {
        let mut registry = FileRegistry::new(file("/doc/board.md", "board.md", FileKind::Primary));
        // A fragment entry resolving to the primary path replaces it.
        registry.track(file("/doc/board.md", "board.md", FileKind::FragmentBlock));

        let report = registry.consistency_report();
        assert!(report
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::FragmentShadowsPrimary { .. })));
    }

    #[test]
    fn stray_primary_flag_is_an_anomaly() {
        let mut registry = registry_with_fragment();
        registry.track(file("/doc/extra.md", "extra.md", FileKind::Primary));

        let report = registry.consistency_report();
        assert!(report
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::StrayPrimaryFlag { .. })));
    }
}
