//! Process runner: executes the build script under a hard wall-clock timeout.
//!
//! The caller decides where output goes; this module only redirects the
//! child's stdout and stderr into pre-opened files, races completion against
//! the timeout, and kills the child when the timer fires. One execution
//! attempt per call, no retries.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("timeout must be at least 1 second, got {0}")]
    InvalidTimeout(u64),

    #[error("could not launch build script {script}: {source}")]
    Launch {
        script: PathBuf,
        source: std::io::Error,
    },

    #[error("build script exited with {status}")]
    ScriptFailed { status: std::process::ExitStatus },

    #[error("could not observe build script completion: {0}")]
    Wait(std::io::Error),

    #[error("build timed out after {0} seconds")]
    TimedOut(u64),

    #[error("could not kill timed-out build script: {0}")]
    Termination(std::io::Error),
}

impl RunnerError {
    /// True when the child may still be alive. The caller must not run
    /// cleanup that assumes the process is gone.
    pub fn is_dirty_state(&self) -> bool {
        matches!(self, RunnerError::Termination(_))
    }
}

/// Run the build script in `build_dir`, writing its stdout and stderr to the
/// supplied files, enforcing the wall-clock timeout.
///
/// On timeout the child is killed and its completion is still awaited before
/// this returns, so the output files are fully flushed and the process table
/// entry is reaped. The returned error distinguishes a timeout
/// ([`RunnerError::TimedOut`]) from the script's own failure, and a failed
/// kill ([`RunnerError::Termination`]) from both.
pub async fn run_build_script(
    build_dir: &Path,
    script: &Path,
    args: &[String],
    timeout_in_secs: u64,
    stdout: std::fs::File,
    stderr: std::fs::File,
) -> Result<(), RunnerError> {
    if timeout_in_secs == 0 {
        return Err(RunnerError::InvalidTimeout(timeout_in_secs));
    }

    let mut command = Command::new(script);
    command
        .args(args)
        .current_dir(build_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    // Own process group; the timeout kill signals the whole group so the
    // script's children die with it.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|source| RunnerError::Launch {
        script: script.to_path_buf(),
        source,
    })?;

    let timeout = Duration::from_secs(timeout_in_secs);
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(RunnerError::ScriptFailed { status }),
        Ok(Err(source)) => Err(RunnerError::Wait(source)),
        Err(_elapsed) => {
            warn!(
                secs = timeout_in_secs,
                "build timed out, killing build script"
            );
            if let Err(source) = kill_build_group(&mut child) {
                warn!(%source, "could not kill build script, aborting in dirty state");
                return Err(RunnerError::Termination(source));
            }

            // Never report the timeout before observing actual termination:
            // the child must be reaped and its output files closed before the
            // caller inspects them.
            if let Err(source) = child.wait().await {
                return Err(RunnerError::Termination(source));
            }
            info!("timed-out build script killed");
            Err(RunnerError::TimedOut(timeout_in_secs))
        }
    }
}

/// Kill the build script and everything it spawned. The child was made the
/// leader of its own process group at spawn, so its pid doubles as the pgid
/// and one SIGKILL to the group reaches the whole script, not just the shell.
#[cfg(unix)]
fn kill_build_group(child: &mut tokio::process::Child) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped; nothing left to signal.
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        // The group died between the timer firing and the signal landing.
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn kill_build_group(child: &mut tokio::process::Child) -> std::io::Result<()> {
    child.start_kill()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct Sinks {
        dir: tempfile::TempDir,
    }

    impl Sinks {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn open(&self) -> (std::fs::File, std::fs::File) {
            let stdout = std::fs::File::create(self.dir.path().join("stdout")).unwrap();
            let stderr = std::fs::File::create(self.dir.path().join("stderr")).unwrap();
            (stdout, stderr)
        }

        fn stdout_contents(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("stdout")).unwrap()
        }

        fn stderr_contents(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("stderr")).unwrap()
        }
    }

    fn sh_args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn successful_script_captures_output() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("echo out; echo err >&2"),
            5,
            stdout,
            stderr,
        )
        .await
        .unwrap();

        assert_eq!(sinks.stdout_contents(), "out\n");
        assert_eq!(sinks.stderr_contents(), "err\n");
    }

    #[tokio::test]
    async fn script_runs_in_the_given_directory() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("pwd"),
            5,
            stdout,
            stderr,
        )
        .await
        .unwrap();

        let reported = sinks.stdout_contents();
        let expected = sinks.dir.path().canonicalize().unwrap();
        assert_eq!(
            Path::new(reported.trim_end()).canonicalize().unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_script_failure() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        let err = run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("exit 3"),
            5,
            stdout,
            stderr,
        )
        .await
        .unwrap_err();

        match err {
            RunnerError::ScriptFailed { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("expected ScriptFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_script_is_a_launch_error() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        let err = run_build_script(
            sinks.dir.path(),
            Path::new("/nonexistent/build.sh"),
            &[],
            5,
            stdout,
            stderr,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[tokio::test]
    async fn long_sleep_is_killed_at_the_timeout() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        let started = Instant::now();
        let err = run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("sleep 5"),
            1,
            stdout,
            stderr,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::TimedOut(1)));
        // Killed at the one-second mark plus a bounded grace period, well
        // before the five-second sleep finishes.
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kill_reaches_backgrounded_children() {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        // The script backgrounds a long sleep and records its pid; killing
        // only the shell would leave the sleep running with the output files
        // still open.
        let err = run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("sleep 30 & echo $! > child_pid; wait"),
            1,
            stdout,
            stderr,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RunnerError::TimedOut(1)));

        let pid: i32 = std::fs::read_to_string(sinks.dir.path().join("child_pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();

        // The group kill is synchronous but reaping by init is not; poll
        // briefly before declaring the child survived.
        let mut alive = true;
        for _ in 0..20 {
            if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive, "backgrounded child {pid} survived the timeout kill");
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected_before_launch() {
        let sinks = Sinks::new();
        let (stdout, stderr) = sinks.open();

        let err = run_build_script(
            sinks.dir.path(),
            Path::new("/bin/sh"),
            &sh_args("echo should-not-run"),
            0,
            stdout,
            stderr,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RunnerError::InvalidTimeout(0)));
        assert_eq!(sinks.stdout_contents(), "");
    }

    #[test]
    fn only_termination_is_dirty_state() {
        let termination =
            RunnerError::Termination(std::io::Error::new(std::io::ErrorKind::Other, "nope"));
        assert!(termination.is_dirty_state());
        assert!(!RunnerError::TimedOut(1).is_dirty_state());
    }
}
