//! Compose argument construction.

use std::ffi::OsString;
use std::path::PathBuf;

/// Build the argument list following the tool prefix: `-f <file>` per file, then `extra`.
pub fn compose_args(files: &[PathBuf], extra: &[&str]) -> Vec<OsString> {
    let mut args = Vec::with_capacity(files.len() * 2 + extra.len());
    for file in files {
        args.push(OsString::from("-f"));
        args.push(file.clone().into_os_string());
    }
    args.extend(extra.iter().map(OsString::from));
    args
}

/// `compose ps --quiet` prints one container id per line; any id means the stack is up.
pub fn stack_is_running(ps_quiet_stdout: &str) -> bool {
    ps_quiet_stdout.lines().any(|line| !line.trim().is_empty())
}
