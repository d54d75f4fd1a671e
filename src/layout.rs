//! Filesystem layout conventions for a results root.
//!
//! Everything kiln writes lives under a single root directory:
//!
//! ```text
//! <root>/builds.db
//! <root>/builds.html
//! <root>/builds/<project>/<tag>/<date_tag>/      build dir
//!     build.tar.gz                               source tarball
//!     logs/
//!         stdout                                 captured script stdout
//!         stderr                                 captured script stderr
//!         kiln.log                               runner log
//! ```
//!
//! These are pure path computations; nothing here touches the filesystem.

use crate::identity::{BuildIdentity, DIR_DATE_FORMAT};
use std::path::{Path, PathBuf};

pub const BUILDS_DIR: &str = "builds";
pub const LOGS_DIR: &str = "logs";
pub const STDOUT_LOG_NAME: &str = "stdout";
pub const STDERR_LOG_NAME: &str = "stderr";
pub const RUNNER_LOG_NAME: &str = "kiln.log";
pub const TARBALL_NAME: &str = "build.tar.gz";
pub const BUILD_DB_NAME: &str = "builds.db";
pub const REPORT_NAME: &str = "builds.html";

impl BuildIdentity {
    /// Directory-name-safe form of the start time.
    pub fn date_tag(&self) -> String {
        self.started_at.format(DIR_DATE_FORMAT).to_string()
    }

    /// Directory holding everything produced by this build.
    pub fn build_dir(&self) -> PathBuf {
        self.root_dir
            .join(BUILDS_DIR)
            .join(&self.project)
            .join(&self.tag)
            .join(self.date_tag())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.build_dir().join(LOGS_DIR)
    }

    pub fn stdout_log_path(&self) -> PathBuf {
        self.logs_dir().join(STDOUT_LOG_NAME)
    }

    pub fn stderr_log_path(&self) -> PathBuf {
        self.logs_dir().join(STDERR_LOG_NAME)
    }

    pub fn runner_log_path(&self) -> PathBuf {
        self.logs_dir().join(RUNNER_LOG_NAME)
    }

    pub fn tarball_path(&self) -> PathBuf {
        self.build_dir().join(TARBALL_NAME)
    }
}

/// Path of the record store database for a results root.
pub fn build_db_path(root_dir: &Path) -> PathBuf {
    root_dir.join(BUILD_DB_NAME)
}

/// Path of the HTML build report for a results root.
pub fn report_path(root_dir: &Path) -> PathBuf {
    root_dir.join(REPORT_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn known_identity() -> BuildIdentity {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 11).unwrap();
        BuildIdentity::at(Path::new("/var/kiln"), "myproj", "main", started)
    }

    #[test]
    fn build_dir_encodes_project_tag_and_date() {
        assert_eq!(
            known_identity().build_dir(),
            PathBuf::from("/var/kiln/builds/myproj/main/2024_03_09_17_05_11")
        );
    }

    #[test]
    fn log_paths_live_under_logs_dir() {
        let id = known_identity();
        let logs = id.logs_dir();
        assert_eq!(logs, id.build_dir().join("logs"));
        assert_eq!(id.stdout_log_path(), logs.join("stdout"));
        assert_eq!(id.stderr_log_path(), logs.join("stderr"));
        assert_eq!(id.runner_log_path(), logs.join("kiln.log"));
    }

    #[test]
    fn tarball_sits_in_build_dir() {
        let id = known_identity();
        assert_eq!(id.tarball_path(), id.build_dir().join("build.tar.gz"));
    }

    #[test]
    fn root_level_paths() {
        let root = Path::new("/var/kiln");
        assert_eq!(build_db_path(root), PathBuf::from("/var/kiln/builds.db"));
        assert_eq!(report_path(root), PathBuf::from("/var/kiln/builds.html"));
    }
}
