//! Interpreter resolution: virtualenv first, bare command second.

use std::path::{Path, PathBuf};

use crate::core::types::Runtime;

/// Virtualenv directory for `configured`, relative to `root` unless absolute.
pub fn virtualenv_dir(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// Interpreter paths a virtualenv may contain, in preference order.
pub fn virtualenv_candidates(venv_dir: &Path) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![venv_dir.join("Scripts").join("python.exe")]
    } else {
        vec![
            venv_dir.join("bin").join("python3"),
            venv_dir.join("bin").join("python"),
        ]
    }
}

/// Pick the first candidate for which `exists` holds, else the bare `fallback` command.
///
/// Existence only: no version or capability probing.
pub fn resolve_runtime<F>(candidates: &[PathBuf], fallback: &str, exists: F) -> Runtime
where
    F: Fn(&Path) -> bool,
{
    candidates
        .iter()
        .find(|candidate| exists(candidate))
        .map(|candidate| Runtime::Virtualenv(candidate.clone()))
        .unwrap_or_else(|| Runtime::Fallback(fallback.to_string()))
}
