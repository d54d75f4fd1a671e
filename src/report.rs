//! HTML build report rendering.
//!
//! Renders `<root>/builds.html` from the record store's newest-first listing,
//! with relative links into each build's logs and tarball. Rendering is
//! fallible and returns a `Result`; a bad template or row never panics the
//! build that triggered the refresh.

use crate::identity::BuildRecord;
use crate::layout;
use anyhow::{Context, Result};
use askama::Template;
use std::path::Path;

/// Upper bound on rows in the report. Eventually, this will be configurable.
pub const REPORT_MAX_BUILDS: usize = 100;

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    rows: Vec<ReportRow>,
    css_href: Option<String>,
}

struct ReportRow {
    project: String,
    tag: String,
    status: String,
    started_at: String,
    finished_at: String,
    duration: String,
    stdout_href: String,
    stderr_href: String,
    runner_log_href: String,
    tarball_href: String,
}

/// Render the report for `root_dir` to `<root>/builds.html`.
pub fn render_report(root_dir: &Path, records: &[BuildRecord]) -> Result<()> {
    let html = render(root_dir, records)?;
    let path = layout::report_path(root_dir);
    std::fs::write(&path, html)
        .with_context(|| format!("could not write report {}", path.display()))?;
    Ok(())
}

fn render(root_dir: &Path, records: &[BuildRecord]) -> Result<String> {
    let rows = records
        .iter()
        .take(REPORT_MAX_BUILDS)
        .map(|record| row_for(root_dir, record))
        .collect();

    // A builds.css next to the report overrides the inline style.
    let css_href = root_dir
        .join("builds.css")
        .is_file()
        .then(|| "builds.css".to_string());

    let template = ReportTemplate { rows, css_href };
    template.render().context("could not render build report")
}

fn row_for(root_dir: &Path, record: &BuildRecord) -> ReportRow {
    let id = &record.identity;
    ReportRow {
        project: id.project.clone(),
        tag: id.tag.clone(),
        status: record.status.to_string(),
        started_at: id.started_at.to_rfc2822(),
        finished_at: record
            .finished_at
            .map(|t| t.to_rfc2822())
            .unwrap_or_default(),
        duration: format_duration(record.duration()),
        stdout_href: relative_href(root_dir, &id.stdout_log_path()),
        stderr_href: relative_href(root_dir, &id.stderr_log_path()),
        runner_log_href: relative_href(root_dir, &id.runner_log_path()),
        tarball_href: relative_href(root_dir, &id.tarball_path()),
    }
}

/// Link target relative to the report's own directory (the root), falling
/// back to the absolute path for records from a foreign root.
fn relative_href(root_dir: &Path, path: &Path) -> String {
    path.strip_prefix(root_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds().max(0);
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {mins:02}m {secs:02}s")
    } else if mins > 0 {
        format!("{mins}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}
