//! Batched file-action executor.
//!
//! Executes one batch of (path, action) requests in four strict phases:
//! token check, preflight validation, backup creation, sequential apply.
//! No disk mutation happens until every item has cleared preflight and every
//! required backup exists. The executor never returns an error: every request
//! ends as exactly one outcome, in input order.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{info, warn};

use vellum_types::{
    ActionError, ActionOutcome, ActionRequest, BatchReport, FileAction, SkipReason, SnapshotToken,
};

use crate::registry::FileRegistry;
use crate::saver::{FileSaver, SaveOptions};
use crate::snapshot::compute_snapshot_token;

/// Per-item state between phases.
enum Slot {
    /// Outcome already decided (skips, duplicates, preflight failures).
    Terminal(ActionOutcome),
    /// Cleared preflight; waiting for backup and apply.
    Ready {
        key: PathBuf,
        display: String,
        action: FileAction,
        backup: Option<String>,
    },
}

/// Run one batch against the registry.
///
/// The submitted `token` must match the registry's current fingerprint; a
/// mismatch rejects every item with no disk access at all. Preflight is
/// all-or-nothing: one invalid item aborts the whole batch before any backup
/// or write. The apply phase is fail-fast: the first failing item stops the
/// batch and the remaining items are reported skipped.
pub async fn execute_batch(
    registry: &mut FileRegistry,
    saver: &dyn FileSaver,
    token: &SnapshotToken,
    requests: &[ActionRequest],
) -> BatchReport {
    if compute_snapshot_token(registry) != *token {
        warn!(
            requests = requests.len(),
            "Rejecting batch: snapshot token is stale"
        );
        let results = requests
            .iter()
            .map(|request| {
                ActionOutcome::failed(
                    request.path.clone(),
                    FileAction::parse(&request.action),
                    ActionError::SnapshotStale,
                )
            })
            .collect();
        return BatchReport::summarize(results);
    }

    let mut slots = preflight(registry, requests);

    if slots.iter().any(
        |slot| matches!(slot, Slot::Terminal(outcome) if outcome.status.is_failed()),
    ) {
        warn!("Rejecting batch: preflight failed; no file was touched");
        let results = slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Terminal(outcome) => outcome,
                Slot::Ready {
                    display, action, ..
                } => ActionOutcome::failed(display, Some(action), ActionError::BatchAborted),
            })
            .collect();
        return BatchReport::summarize(results);
    }

    if let Err(failed_index) = create_backups(registry, &mut slots).await {
        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Slot::Terminal(outcome) => outcome,
                Slot::Ready {
                    display,
                    action,
                    backup,
                    ..
                } => {
                    // The failing item already became Terminal; every other
                    // ready item is aborted, keeping any backup it got.
                    debug_assert_ne!(index, failed_index);
                    let outcome =
                        ActionOutcome::failed(display, Some(action), ActionError::BatchAborted);
                    match backup {
                        Some(backup) => outcome.with_backup(backup),
                        None => outcome,
                    }
                }
            })
            .collect();
        return BatchReport::summarize(results);
    }

    let results = apply(registry, saver, slots).await;
    let report = BatchReport::summarize(results);
    info!(
        applied = report.applied_count,
        failed = report.failed_count,
        skipped = report.skipped_count,
        backups = report.backup_count,
        "Batch finished"
    );
    report
}

/// Validate every request without touching disk.
fn preflight(registry: &FileRegistry, requests: &[ActionRequest]) -> Vec<Slot> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut slots = Vec::with_capacity(requests.len());

    for request in requests {
        let parsed = FileAction::parse(&request.action);

        if request.path.trim().is_empty() {
            slots.push(Slot::Terminal(ActionOutcome::failed(
                request.path.clone(),
                parsed,
                ActionError::MissingPath,
            )));
            continue;
        }
        let Some(action) = parsed else {
            slots.push(Slot::Terminal(ActionOutcome::failed(
                request.path.clone(),
                None,
                ActionError::UnsupportedAction {
                    raw: request.action.clone(),
                },
            )));
            continue;
        };
        let Some((key, file)) = registry
            .resolve(&request.path)
            .and_then(|key| registry.get(&key).map(|file| (key, file)))
        else {
            slots.push(Slot::Terminal(ActionOutcome::failed(
                request.path.clone(),
                Some(action),
                ActionError::FileNotFound {
                    path: request.path.clone(),
                },
            )));
            continue;
        };
        let display = key.display().to_string();

        // An explicit skip is inert: exempt from accessibility and dirty
        // checks, and it does not claim the path for duplicate detection.
        if action == FileAction::Skip {
            slots.push(Slot::Terminal(ActionOutcome::skipped(
                display,
                Some(action),
                SkipReason::Requested,
            )));
            continue;
        }
        if !seen.insert(key.clone()) {
            slots.push(Slot::Terminal(ActionOutcome::skipped(
                display,
                Some(action),
                SkipReason::Duplicate,
            )));
            continue;
        }
        if !file.disk_state().is_accessible() {
            let reason = file
                .last_access_error_code()
                .unwrap_or_else(|| file.disk_state().as_str())
                .to_string();
            slots.push(Slot::Terminal(ActionOutcome::failed(
                display,
                Some(action),
                ActionError::Inaccessible { reason },
            )));
            continue;
        }
        if action.is_overwrite() && file.is_dirty_in_editor() {
            slots.push(Slot::Terminal(ActionOutcome::failed(
                display,
                Some(action),
                ActionError::EditorDirtyBlocksOverwrite,
            )));
            continue;
        }
        if action == FileAction::LoadExternal && file.has_any_unsaved() {
            slots.push(Slot::Terminal(ActionOutcome::failed(
                display,
                Some(action),
                ActionError::UnsavedBlocksUnsafeReload,
            )));
            continue;
        }

        slots.push(Slot::Ready {
            key,
            display,
            action,
            backup: None,
        });
    }

    slots
}

/// Create every required backup before any destructive write.
///
/// On failure the failing slot becomes Terminal and its index is returned;
/// backups already created stay on their slots so the report can mention them.
async fn create_backups(registry: &FileRegistry, slots: &mut [Slot]) -> Result<(), usize> {
    for index in 0..slots.len() {
        let (key, action) = match &slots[index] {
            Slot::Ready { key, action, .. } if action.requires_backup() => (key.clone(), *action),
            _ => continue,
        };
        let Some(file) = registry.get(&key) else {
            // The key came from this registry moments ago.
            continue;
        };

        let created = match action {
            FileAction::OverwriteWithExternalBackup => match file.read_from_disk().await {
                Ok(disk_content) => file.create_visible_conflict_file(&disk_content).await,
                Err(e) => Err(e),
            },
            FileAction::LoadExternalWithLocalBackup => {
                file.create_visible_conflict_file(file.content_for_backup())
                    .await
            }
            _ => unreachable!("requires_backup covers exactly the two backup actions"),
        };

        match created {
            Ok(backup_path) => {
                if let Slot::Ready { backup, .. } = &mut slots[index] {
                    *backup = Some(backup_path.display().to_string());
                }
            }
            Err(e) => {
                warn!(path = %key.display(), "Backup creation failed, aborting batch: {e}");
                slots[index] = Slot::Terminal(ActionOutcome::failed(
                    key.display().to_string(),
                    Some(action),
                    ActionError::BackupFailed {
                        detail: e.to_string(),
                    },
                ));
                return Err(index);
            }
        }
    }
    Ok(())
}

/// Apply ready items in input order, stopping at the first failure.
async fn apply(
    registry: &mut FileRegistry,
    saver: &dyn FileSaver,
    slots: Vec<Slot>,
) -> Vec<ActionOutcome> {
    let mut results = Vec::with_capacity(slots.len());
    let mut stopped = false;

    for slot in slots {
        let Slot::Ready {
            key,
            display,
            action,
            backup,
        } = slot
        else {
            let Slot::Terminal(outcome) = slot else {
                unreachable!()
            };
            results.push(outcome);
            continue;
        };

        let attach_backup = |outcome: ActionOutcome| match &backup {
            Some(path) => outcome.with_backup(path.clone()),
            None => outcome,
        };

        if stopped {
            results.push(attach_backup(ActionOutcome::skipped(
                display,
                Some(action),
                SkipReason::BatchStopped,
            )));
            continue;
        }

        let Some(file) = registry.get_mut(&key) else {
            results.push(attach_backup(ActionOutcome::failed(
                display,
                Some(action),
                ActionError::ExecutionError {
                    detail: "file vanished from the registry mid-batch".to_string(),
                },
            )));
            stopped = true;
            continue;
        };

        let applied = if action.is_overwrite() {
            // Preflight approved the overwrite; the saver must not re-check.
            saver
                .save_file(
                    file,
                    None,
                    SaveOptions {
                        force: true,
                        ..SaveOptions::default()
                    },
                )
                .await
                .map_err(|e| e.to_string())
        } else {
            file.reload().await.map_err(|e| e.to_string())
        };

        match applied {
            Ok(()) => results.push(attach_backup(ActionOutcome::applied(display, action))),
            Err(detail) => {
                warn!(path = %key.display(), %action, "Apply failed, stopping batch: {detail}");
                results.push(attach_backup(ActionOutcome::failed(
                    display,
                    Some(action),
                    ActionError::ExecutionError { detail },
                )));
                stopped = true;
            }
        }
    }

    results
}
