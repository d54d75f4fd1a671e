//! Build identity and recorded-build types.
//!
//! A build attempt is identified by `(project, tag, started_at)` within one
//! results root. That triple is the record store's primary key and is encoded
//! into the build directory path, so it must never collide.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Timestamp format used in the record store, second precision, UTC.
/// Lexical order matches chronological order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format used for build directory names.
pub const DIR_DATE_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Immutable identification of one build attempt: the results root, the
/// project, the build tag, and the start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdentity {
    pub root_dir: PathBuf,
    pub project: String,
    pub tag: String,
    pub started_at: DateTime<Utc>,
}

impl BuildIdentity {
    /// Identity for a build starting now. The start time is truncated to
    /// second precision so it round-trips through the record store.
    pub fn starting_now(root_dir: &Path, project: &str, tag: &str) -> Self {
        let now = Utc::now();
        let started_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self::at(root_dir, project, tag, started_at)
    }

    /// Identity for a build with a known start time.
    pub fn at(root_dir: &Path, project: &str, tag: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            root_dir: root_dir.to_path_buf(),
            project: project.to_string(),
            tag: tag.to_string(),
            started_at,
        }
    }

    /// Start time as stored in the record store.
    pub fn started_at_str(&self) -> String {
        self.started_at.format(DATE_FORMAT).to_string()
    }
}

/// Lifecycle state of a recorded build. Created as `Running`, transitions
/// exactly once to `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Running => "RUNNING",
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(BuildStatus::Running),
            "SUCCEEDED" => Some(BuildStatus::Succeeded),
            "FAILED" => Some(BuildStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted build attempt: the identity plus its status and end time.
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub identity: BuildIdentity,
    pub status: BuildStatus,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildRecord {
    /// Elapsed time of the build: end minus start if it finished, otherwise
    /// time elapsed so far.
    pub fn duration(&self) -> chrono::Duration {
        match self.finished_at {
            Some(end) => end - self.identity.started_at,
            None => Utc::now() - self.identity.started_at,
        }
    }
}
