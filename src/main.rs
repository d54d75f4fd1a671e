use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use kiln::identity::DATE_FORMAT;
use kiln::orchestrator::BuildOptions;
use kiln::records::RecordStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kiln",
    about = "Single-machine build runner with durable build records",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one build: claim a record, run the script, archive, prune
    Build {
        /// Source directory the build script runs in
        src_dir: PathBuf,

        /// Build configuration file (TOML)
        config_file: PathBuf,

        /// Results root directory
        root_dir: PathBuf,

        /// Project the build belongs to
        project: String,

        /// Sub-grouping within the project, e.g. a branch name
        tag: String,

        /// Print the actions that would be taken without taking them
        #[arg(long)]
        dry_run: bool,

        /// Remove the source dir after archiving it
        #[arg(long)]
        remove_src: bool,
    },

    /// List build directories matching the given criteria, newest first
    List {
        /// Results root directory
        root_dir: PathBuf,

        /// Only builds of this project
        project: Option<String>,

        /// Only builds with this tag
        tag: Option<String>,

        /// Only the build started at this time ("YYYY-MM-DD HH:MM:SS", UTC)
        datetime: Option<String>,
    },

    /// Print one path of the named build (or the latest matching one)
    Print {
        /// Which path to print
        which: PathKind,

        /// Results root directory
        root_dir: PathBuf,

        /// Project of the build
        project: String,

        /// Tag of the build
        tag: String,

        /// Start time of the build ("YYYY-MM-DD HH:MM:SS", UTC); latest if omitted
        datetime: Option<String>,
    },

    /// Render the HTML build report for a results root
    Report {
        /// Results root directory
        root_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PathKind {
    BuildDir,
    Stdout,
    Stderr,
    Log,
    Tarball,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_tee = kiln::logging::LogTee::new();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(log_tee.clone())
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            src_dir,
            config_file,
            root_dir,
            project,
            tag,
            dry_run,
            remove_src,
        } => {
            let options = BuildOptions {
                dry_run,
                remove_src,
                log_tee: Some(log_tee),
            };
            kiln::orchestrator::run_build(
                &src_dir,
                &config_file,
                &root_dir,
                &project,
                &tag,
                &options,
            )
            .await?;
        }

        Commands::List {
            root_dir,
            project,
            tag,
            datetime,
        } => {
            let store = RecordStore::new(&root_dir);
            let started_at = parse_datetime(datetime.as_deref())?;
            let records = store
                .find_matching(project.as_deref(), tag.as_deref(), started_at)
                .context("could not list builds")?;
            for record in records {
                println!("{}", record.identity.build_dir().display());
            }
        }

        Commands::Print {
            which,
            root_dir,
            project,
            tag,
            datetime,
        } => {
            let store = RecordStore::new(&root_dir);
            let started_at = parse_datetime(datetime.as_deref())?;
            let record = store
                .find_latest(Some(&project), Some(&tag), started_at)
                .context("could not look up build")?;
            let Some(record) = record else {
                bail!("no matching build for {project}/{tag}");
            };

            let id = &record.identity;
            let path = match which {
                PathKind::BuildDir => id.build_dir(),
                PathKind::Stdout => id.stdout_log_path(),
                PathKind::Stderr => id.stderr_log_path(),
                PathKind::Log => id.runner_log_path(),
                PathKind::Tarball => id.tarball_path(),
            };
            println!("{}", path.display());
        }

        Commands::Report { root_dir } => {
            let store = RecordStore::new(&root_dir);
            let records = store
                .find_matching(None, None, None)
                .context("could not list builds for report")?;
            kiln::report::render_report(&root_dir, &records)?;
            tracing::info!(path = %kiln::layout::report_path(&root_dir).display(), "report rendered");
        }
    }

    Ok(())
}

fn parse_datetime(datetime: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    datetime
        .map(|s| {
            NaiveDateTime::parse_from_str(s, DATE_FORMAT)
                .map(|naive| naive.and_utc())
                .with_context(|| format!("invalid datetime {s:?}, expected YYYY-MM-DD HH:MM:SS"))
        })
        .transpose()
}
