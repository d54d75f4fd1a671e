//! Durable record store for build attempts.
//!
//! One SQLite database per results root (`<root>/builds.db`), one row per
//! build attempt, keyed by `(project, tag, started_at)`. Claiming an identity
//! is an INSERT that fails on duplicate key; that failure is the only
//! cross-process coordination primitive in the system, and it holds across
//! separate invocations because the constraint lives in the store itself.
//!
//! Every operation opens its own connection and releases it on return, error
//! paths included. Concurrent invocations for different keys proceed
//! independently; racers on the same key are serialized by the unique index,
//! with the loser failing fast.

pub mod schema;

use crate::identity::{BuildIdentity, BuildRecord, BuildStatus, DATE_FORMAT};
use crate::layout;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The identity is already claimed by another build. Expected under
    /// racing invocations; the loser must not run the build script.
    #[error("build already claimed for {project}/{tag} at {started_at}")]
    ClaimConflict {
        project: String,
        tag: String,
        started_at: String,
    },

    #[error("could not create record store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("record store error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Handle on the record store of one results root. Holds no connection;
/// see the module docs.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root_dir: PathBuf,
}

impl RecordStore {
    pub fn new(root_dir: &Path) -> Self {
        Self {
            root_dir: root_dir.to_path_buf(),
        }
    }

    /// Insert a RUNNING row for `identity`, asserting exclusive ownership of
    /// that build identity. Fails with [`StoreError::ClaimConflict`] if any
    /// build (running or finished) already holds the key.
    ///
    /// A crash between claim and the matching mark call leaves the row
    /// RUNNING forever; the identity stays claimed, which is correct because
    /// its build directory may be half-written.
    pub fn claim(&self, identity: &BuildIdentity) -> Result<(), StoreError> {
        let conn = self.open()?;

        let inserted = conn.execute(
            "INSERT INTO builds (project, tag, started_at, status)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                identity.project,
                identity.tag,
                identity.started_at_str(),
                BuildStatus::Running.as_str(),
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::ClaimConflict {
                    project: identity.project.clone(),
                    tag: identity.tag.clone(),
                    started_at: identity.started_at_str(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record that the build finished successfully, setting the end time.
    pub fn mark_succeeded(&self, identity: &BuildIdentity) -> Result<(), StoreError> {
        self.update_status(identity, BuildStatus::Succeeded)
    }

    /// Record that the build failed (non-zero exit, timeout, or launch
    /// failure), setting the end time.
    pub fn mark_failed(&self, identity: &BuildIdentity) -> Result<(), StoreError> {
        self.update_status(identity, BuildStatus::Failed)
    }

    fn update_status(
        &self,
        identity: &BuildIdentity,
        status: BuildStatus,
    ) -> Result<(), StoreError> {
        let conn = self.open()?;
        let finished_at = Utc::now().format(DATE_FORMAT).to_string();

        conn.execute(
            "UPDATE builds SET status = ?1, finished_at = ?2
             WHERE project = ?3 AND tag = ?4 AND started_at = ?5",
            rusqlite::params![
                status.as_str(),
                finished_at,
                identity.project,
                identity.tag,
                identity.started_at_str(),
            ],
        )?;
        Ok(())
    }

    /// All records matching the given filters, most recent first. Each
    /// absent filter matches every value for that field.
    pub fn find_matching(
        &self,
        project: Option<&str>,
        tag: Option<&str>,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<BuildRecord>, StoreError> {
        let mut query = String::from(
            "SELECT project, tag, started_at, finished_at, status FROM builds WHERE 1 = 1",
        );
        let mut args: Vec<String> = Vec::new();

        if let Some(project) = project {
            query.push_str(" AND project = ?");
            args.push(project.to_string());
        }
        if let Some(tag) = tag {
            query.push_str(" AND tag = ?");
            args.push(tag.to_string());
        }
        if let Some(started_at) = started_at {
            query.push_str(" AND started_at = ?");
            args.push(started_at.format(DATE_FORMAT).to_string());
        }
        query.push_str(" ORDER BY started_at DESC");

        let conn = self.open()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            self.record_from_row(row)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// The most recent record matching the filters, if any.
    pub fn find_latest(
        &self,
        project: Option<&str>,
        tag: Option<&str>,
        started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<BuildRecord>, StoreError> {
        let records = self.find_matching(project, tag, started_at)?;
        Ok(records.into_iter().next())
    }

    fn record_from_row(&self, row: &rusqlite::Row<'_>) -> Result<BuildRecord, rusqlite::Error> {
        let project: String = row.get(0)?;
        let tag: String = row.get(1)?;
        let started_at: String = row.get(2)?;
        let finished_at: Option<String> = row.get(3)?;
        let status: String = row.get(4)?;

        let started_at = parse_store_datetime(&started_at, 2)?;
        let finished_at = match finished_at {
            Some(s) => Some(parse_store_datetime(&s, 3)?),
            None => None,
        };
        let status = BuildStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!("unknown build status {status:?}").into(),
            )
        })?;

        Ok(BuildRecord {
            identity: BuildIdentity::at(&self.root_dir, &project, &tag, started_at),
            status,
            finished_at,
        })
    }

    /// Open a connection and make sure the schema exists. The connection is
    /// dropped (and with it the implicit transaction scope) when the calling
    /// operation returns.
    fn open(&self) -> Result<Connection, StoreError> {
        let db_path = layout::build_db_path(&self.root_dir);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&db_path)?;
        schema::ensure(&conn)?;
        Ok(conn)
    }
}

fn parse_store_datetime(s: &str, column: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
