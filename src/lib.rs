//! Kiln -- single-machine build runner.
//!
//! Given a source directory and a build script, kiln claims a durable build
//! record, runs the script under a hard wall-clock timeout, captures its
//! output, archives the source tree, and retires builds past the retention
//! limit. It is invoked once per build; the record store's unique identity
//! index is the only coordination between invocations.

pub mod archive;
pub mod config;
pub mod identity;
pub mod layout;
pub mod logging;
pub mod orchestrator;
pub mod records;
pub mod report;
pub mod retention;
pub mod runner;
