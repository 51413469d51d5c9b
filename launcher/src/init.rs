//! Orchestration for `launcher init`: write the default `launcher.toml`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::io::config::{LauncherConfig, write_config};

/// Write the default config to `config_path`. An existing file is kept unless `force`.
///
/// Returns whether the file was written.
pub fn run_init<W: Write>(config_path: &Path, force: bool, out: &mut W) -> Result<bool> {
    let written = write_config(config_path, &LauncherConfig::default(), force)?;
    let reported = if written {
        info!(path = %config_path.display(), force, "wrote default config");
        writeln!(out, "init: wrote {}", config_path.display())
    } else {
        writeln!(
            out,
            "init: {} already exists (use --force to overwrite)",
            config_path.display()
        )
    };
    reported.context("write status")?;
    Ok(written)
}
