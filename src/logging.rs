//! Log tee for build invocations.
//!
//! The runner log always goes to stderr. During a build, once the build's
//! logs directory exists, the same stream is additionally copied into
//! `logs/kiln.log` so the report can link a per-build log. The tee is a
//! `MakeWriter` handed to `tracing_subscriber` at startup; the file sink is
//! attached later because its path depends on the claimed build identity.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Writer factory that duplicates log output to stderr and, once attached,
/// to a per-build log file.
#[derive(Clone, Default)]
pub struct LogTee {
    file: Arc<Mutex<Option<File>>>,
}

impl LogTee {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start copying log output into the file at `path`.
    pub fn attach_file(&self, path: &Path) -> std::io::Result<()> {
        let file = File::create(path)?;
        if let Ok(mut sink) = self.file.lock() {
            *sink = Some(file);
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogTee {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: Arc::clone(&self.file),
        }
    }
}

pub struct TeeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = std::io::stderr().write(buf)?;
        if let Ok(mut sink) = self.file.lock() {
            if let Some(file) = sink.as_mut() {
                // The stderr copy already succeeded; a full log-file disk is
                // not worth killing the build over.
                let _ = file.write_all(&buf[..written]);
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Ok(mut sink) = self.file.lock() {
            if let Some(file) = sink.as_mut() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_reach_attached_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.log");

        let tee = LogTee::new();
        tee.attach_file(&path).unwrap();

        let mut writer = tee.make_writer();
        writer.write_all(b"starting build\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "starting build\n");
    }

    #[test]
    fn unattached_tee_still_writes_stderr_only() {
        let tee = LogTee::new();
        let mut writer = tee.make_writer();
        writer.write_all(b"no file yet\n").unwrap();
        writer.flush().unwrap();
    }
}
