//! Source tree archiving.
//!
//! Writes a gzipped tarball of the source directory's contents into the build
//! directory, so the exact tree that was built stays available after the
//! source dir is removed.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

/// Archive the contents of `src_dir` (as relative paths) into a `.tar.gz`
/// at `tarball_path`.
pub fn create_tarball(src_dir: &Path, tarball_path: &Path) -> Result<()> {
    let file = File::create(tarball_path)
        .with_context(|| format!("could not create tarball {}", tarball_path.display()))?;

    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(".", src_dir)
        .with_context(|| format!("could not archive source dir {}", src_dir.display()))?;

    let encoder = builder
        .into_inner()
        .context("could not finish writing tarball")?;
    encoder.finish().context("could not finish gzip stream")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn tarball_round_trips_source_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("build.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.path().join("sub/lib.c"), "int x;\n").unwrap();

        let out = tempfile::tempdir().unwrap();
        let tarball = out.path().join("build.tar.gz");
        create_tarball(src.path(), &tarball).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tarball).unwrap()));
        let mut contents = std::collections::HashMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_path_buf();
            let mut body = String::new();
            entry.read_to_string(&mut body).unwrap();
            contents.insert(path, body);
        }

        assert_eq!(contents[Path::new("./build.sh")], "#!/bin/sh\n");
        assert_eq!(contents[Path::new("./sub/lib.c")], "int x;\n");
    }

    #[test]
    fn missing_source_dir_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let tarball = out.path().join("build.tar.gz");
        assert!(create_tarball(Path::new("/nonexistent/src"), &tarball).is_err());
    }
}
