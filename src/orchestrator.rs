//! Build invocation sequencing.
//!
//! One invocation walks a fixed state machine:
//!
//! ```text
//! NEW -> CLAIMED -> RUNNING -> {SUCCEEDED, FAILED} -> ARCHIVED -> PRUNED
//! ```
//!
//! Claim and run failures are fatal to the invocation. The source tree is
//! archived regardless of the build result, so logs and a (possibly broken)
//! tarball are always available for postmortem. Pruning and report refresh
//! run last and can only downgrade to warnings.

use crate::config::Config;
use crate::identity::BuildIdentity;
use crate::logging::LogTee;
use crate::records::RecordStore;
use crate::{archive, report, retention, runner};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Per-invocation behavior toggles, threaded explicitly instead of read from
/// ambient global state.
#[derive(Clone, Default)]
pub struct BuildOptions {
    /// Log the actions a build would take without taking any of them.
    pub dry_run: bool,
    /// Delete the source directory after archiving it.
    pub remove_src: bool,
    /// Tee sink for the per-build runner log, attached once the logs
    /// directory exists.
    pub log_tee: Option<LogTee>,
}

/// Run one build invocation end to end. Returns `Err` when the invocation
/// must exit non-zero: configuration or claim failure, build failure,
/// or archive failure.
pub async fn run_build(
    src_dir: &Path,
    config_path: &Path,
    root_dir: &Path,
    project: &str,
    tag: &str,
    options: &BuildOptions,
) -> Result<()> {
    let config = Config::load(config_path).context("invalid build configuration")?;

    let identity = BuildIdentity::starting_now(root_dir, project, tag);
    info!(
        project = %identity.project,
        tag = %identity.tag,
        started_at = %identity.started_at_str(),
        "starting build"
    );
    info!(build_dir = %identity.build_dir().display(), "build dir");

    if options.dry_run {
        info!("dry run, printing actions without taking them");
        info!("would claim build record");
        info!(
            script = %config.build_script.display(),
            args = ?config.build_script_args,
            timeout_secs = config.timeout_in_secs,
            src_dir = %src_dir.display(),
            "would run build script"
        );
        info!(tarball = %identity.tarball_path().display(), "would archive source dir");
        if options.remove_src {
            info!(src_dir = %src_dir.display(), "would remove source dir");
        }
        info!(keep = config.num_builds_to_keep, "would prune old builds");
        return Ok(());
    }

    let store = RecordStore::new(root_dir);
    run_claimed(&store, &identity, src_dir, &config, options).await
}

/// Everything from the claim onward. Split out so tests can drive a known
/// identity into the claim race.
async fn run_claimed(
    store: &RecordStore,
    identity: &BuildIdentity,
    src_dir: &Path,
    config: &Config,
    options: &BuildOptions,
) -> Result<()> {
    // The claim is the mutual-exclusion point: if it fails, another build
    // owns this identity and we must not touch anything on disk.
    store.claim(identity).context("could not claim build record")?;

    let logs_dir = identity.logs_dir();
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        mark_failed_best_effort(store, identity);
        return Err(e).with_context(|| format!("could not create logs dir {}", logs_dir.display()));
    }

    if let Some(tee) = &options.log_tee {
        if let Err(e) = tee.attach_file(&identity.runner_log_path()) {
            warn!(%e, "could not open runner log file, logging to stderr only");
        }
    }

    let stdout_path = identity.stdout_log_path();
    let stderr_path = identity.stderr_log_path();
    let sinks = std::fs::File::create(&stdout_path)
        .and_then(|out| std::fs::File::create(&stderr_path).map(|err| (out, err)));
    let (stdout, stderr) = match sinks {
        Ok(files) => files,
        Err(e) => {
            mark_failed_best_effort(store, identity);
            return Err(e).context("could not create build output files");
        }
    };

    info!(
        script = %config.build_script.display(),
        args = ?config.build_script_args,
        timeout_secs = config.timeout_in_secs,
        src_dir = %src_dir.display(),
        "running build script"
    );

    let run_result = runner::run_build_script(
        src_dir,
        &config.build_script,
        &config.build_script_args,
        config.timeout_in_secs,
        stdout,
        stderr,
    )
    .await;

    info!(stdout = %stdout_path.display(), stderr = %stderr_path.display(), "build output captured");

    let run_error = match run_result {
        Ok(()) => {
            info!("completed build successfully");
            if let Err(e) = store.mark_succeeded(identity) {
                // The build already happened; a bookkeeping failure must not
                // un-run it.
                warn!(%e, "could not mark build succeeded in record store");
            }
            None
        }
        Err(e) if e.is_dirty_state() => {
            mark_failed_best_effort(store, identity);
            return Err(e).context("build script may still be running, skipping cleanup");
        }
        Err(e) => {
            warn!(%e, "completed build with error");
            mark_failed_best_effort(store, identity);
            Some(e)
        }
    };
    let succeeded = run_error.is_none();

    // Archive even a failed build; the tree that failed is exactly what a
    // postmortem needs.
    let tarball_path = identity.tarball_path();
    info!(src_dir = %src_dir.display(), tarball = %tarball_path.display(), "archiving source dir");
    archive::create_tarball(src_dir, &tarball_path)?;

    if options.remove_src {
        info!(src_dir = %src_dir.display(), "removing source dir");
        if let Err(e) = std::fs::remove_dir_all(src_dir) {
            warn!(%e, "could not remove source dir");
        }
    }

    if succeeded {
        if let Err(e) = retention::prune_old_builds(store, &identity.project, config.num_builds_to_keep)
        {
            warn!(%e, "could not prune old builds");
        }
    }

    refresh_report(store, identity);

    match run_error {
        None => Ok(()),
        Some(e) => Err(anyhow::Error::new(e).context("build failed")),
    }
}

fn mark_failed_best_effort(store: &RecordStore, identity: &BuildIdentity) {
    if let Err(e) = store.mark_failed(identity) {
        warn!(%e, "could not mark build failed in record store");
    }
}

fn refresh_report(store: &RecordStore, identity: &BuildIdentity) {
    let records = match store.find_matching(None, None, None) {
        Ok(records) => records,
        Err(e) => {
            warn!(%e, "could not list builds for report");
            return;
        }
    };
    if let Err(e) = report::render_report(&identity.root_dir, &records) {
        warn!(%e, "could not render build report");
    }
}
