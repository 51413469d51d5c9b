//! Shared types for the launch sequence.

use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use crate::exit_codes;

/// Interpreter chosen for dependency installation and the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runtime {
    /// Interpreter inside the project virtualenv.
    Virtualenv(PathBuf),
    /// Bare command name, resolved through `PATH` when spawned.
    Fallback(String),
}

impl Runtime {
    /// Program to hand to `Command::new`.
    pub fn program(&self) -> &OsStr {
        match self {
            Runtime::Virtualenv(path) => path.as_os_str(),
            Runtime::Fallback(name) => OsStr::new(name),
        }
    }

    pub fn is_virtualenv(&self) -> bool {
        matches!(self, Runtime::Virtualenv(_))
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Virtualenv(path) => write!(f, "virtualenv interpreter {}", path.display()),
            Runtime::Fallback(name) => write!(f, "'{name}' from PATH (no virtualenv found)"),
        }
    }
}

/// Terminal state of `launcher launch`.
///
/// Stack and application failures are expected outcomes, not launcher errors:
/// each maps to the exit code the process reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// `.env` was required but absent; nothing was started.
    EnvFileMissing { path: PathBuf },
    /// `compose up` (or the restart's `compose down`) exited nonzero.
    StackFailed { code: i32 },
    /// The application entry point does not exist; the runtime was not invoked on it.
    EntrypointMissing { path: PathBuf },
    /// The application ran and exited with `code`.
    AppExited { code: i32 },
}

impl LaunchOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchOutcome::EnvFileMissing { .. } => exit_codes::FAILURE,
            LaunchOutcome::StackFailed { code } => *code,
            LaunchOutcome::EntrypointMissing { .. } => exit_codes::FAILURE,
            LaunchOutcome::AppExited { code } => *code,
        }
    }
}
