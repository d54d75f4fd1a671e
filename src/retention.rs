//! Retention policy: retire build directories beyond the keep-count.
//!
//! Pruning is strictly best-effort. The current build already finished by the
//! time this runs, so a failure here is reported to the caller as a warning
//! and must never fail the invocation.

use crate::identity::BuildRecord;
use crate::records::{RecordStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("refusing to keep fewer than 1 build, not deleting any (keep = {0})")]
    KeepTooSmall(usize),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not remove old build dir {path}: {source}")]
    RemoveDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Records for `project` beyond the `keep` most recent, oldest excess only,
/// newest first. `keep` must be at least 1: a keep-count of zero would mean
/// silently deleting every build, which is always a configuration mistake.
pub fn find_prunable(
    store: &RecordStore,
    project: &str,
    keep: usize,
) -> Result<Vec<BuildRecord>, RetentionError> {
    if keep < 1 {
        return Err(RetentionError::KeepTooSmall(keep));
    }

    let mut records = store.find_matching(Some(project), None, None)?;
    let cut = keep.min(records.len());
    Ok(records.split_off(cut))
}

/// Delete the build directories of every prunable record for `project`.
///
/// Removal is report-and-continue: one failed deletion is logged and does not
/// stop the remaining deletions; the first failure is returned at the end. A
/// directory that is already gone counts as pruned.
pub fn prune_old_builds(
    store: &RecordStore,
    project: &str,
    keep: usize,
) -> Result<(), RetentionError> {
    let prunable = find_prunable(store, project, keep)?;

    let mut first_error = None;
    for record in &prunable {
        let build_dir = record.identity.build_dir();
        info!(path = %build_dir.display(), "removing old build dir");

        match std::fs::remove_dir_all(&build_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %build_dir.display(), "old build dir already gone");
            }
            Err(source) => {
                warn!(path = %build_dir.display(), %source, "could not remove old build dir");
                first_error.get_or_insert(RetentionError::RemoveDir {
                    path: build_dir,
                    source,
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
