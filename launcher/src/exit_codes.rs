//! Stable exit codes for launcher CLI commands.
//!
//! Codes not listed here are passed through from child processes: a failing
//! `compose up` or the application's own exit status.

/// Command succeeded.
pub const OK: i32 = 0;
/// Missing entry point, invalid config, spawn failure, or other launcher errors.
pub const FAILURE: i32 = 1;
/// `launcher status` found no running containers.
pub const STOPPED: i32 = 3;
