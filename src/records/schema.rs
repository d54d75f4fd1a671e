//! Record store schema.
//!
//! The unique index on `(project, tag, started_at)` is not an optimization:
//! it is the locking mechanism that stops two invocations from claiming the
//! same build identity (and therefore the same build directory). Any schema
//! change must preserve "insert fails atomically on duplicate key".

use rusqlite::Connection;

/// Create the builds table and its unique identity index if they do not
/// exist. Safe to run on every connection open; there is no separate
/// migration step.
pub fn ensure(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS builds (
            id INTEGER PRIMARY KEY,
            project TEXT NOT NULL,
            tag TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS builds_identity_idx
            ON builds (project, tag, started_at);",
    )
}
