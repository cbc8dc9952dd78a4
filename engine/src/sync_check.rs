//! Read-only sync diagnostics.
//!
//! Compares, per tracked file, the registry's canonical digest against a
//! fresh disk digest and an optional digest supplied by the frontend. Used to
//! surface drift in diagnostics; it never mutates anything, not even cached
//! disk fingerprints.

use std::collections::HashMap;

use tracing::debug;

use vellum_types::{ContentSyncReport, FileSyncResult};
use vellum_utils::content_digest;

use crate::registry::FileRegistry;

/// Three-way digest comparison across all tracked files.
///
/// `frontend_digests` maps registry paths (absolute, as displayed) to the
/// digest of the content the frontend currently shows. Files the frontend
/// does not report are compared registry-vs-disk only. A file counts as
/// in sync when every digest that could be obtained agrees.
pub async fn verify_content_sync(
    registry: &FileRegistry,
    frontend_digests: Option<&HashMap<String, String>>,
) -> ContentSyncReport {
    let mut file_results = Vec::with_capacity(registry.len());
    let mut matching = 0usize;

    for file in registry.all() {
        let path = file.path().display().to_string();
        let registry_digest = file.content_digest();
        let disk_digest = match file.read_from_disk().await {
            Ok(disk_content) => Some(content_digest(&disk_content)),
            Err(e) => {
                debug!(path = %path, "Sync check could not read disk copy: {e}");
                None
            }
        };
        let frontend_digest = frontend_digests
            .and_then(|digests| digests.get(&path))
            .cloned();

        let disk_matches = disk_digest
            .as_ref()
            .is_none_or(|digest| *digest == registry_digest);
        let frontend_matches = frontend_digest
            .as_ref()
            .is_none_or(|digest| *digest == registry_digest);
        // An unreadable disk copy is a mismatch: the canonical content has
        // nothing on disk backing it.
        let in_sync = disk_digest.is_some() && disk_matches && frontend_matches;

        if in_sync {
            matching += 1;
        }
        file_results.push(FileSyncResult {
            path,
            registry_digest,
            disk_digest,
            frontend_digest,
            in_sync,
        });
    }

    ContentSyncReport {
        matching_files: matching,
        mismatched_files: file_results.len() - matching,
        file_results,
    }
}
