//! Local stack launcher.
//!
//! Brings up the project's container stack, picks a Python interpreter,
//! installs the project's dependencies, and runs the web application in the
//! foreground. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic rules (runtime preference, compose
//!   arguments, probe interpretation, outcomes). No I/O.
//! - **[`io`]**: Side-effecting adapters (config files, child processes,
//!   compose, Python). Processes go through [`io::process::ProcessRunner`] so
//!   tests can script them.
//!
//! Orchestration modules ([`init`], [`launch`], [`stack`]) combine the two to implement
//! CLI commands.

pub mod core;
pub mod exit_codes;
pub mod init;
pub mod io;
pub mod launch;
pub mod logging;
pub mod stack;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
