//! Orchestration for `launcher status` and `launcher down`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::io::compose::{Compose, should_use_gpu_override};
use crate::io::config::LauncherConfig;
use crate::io::process::ProcessRunner;

/// Report whether the stack has running containers. Prints `running` or `stopped`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_status<R: ProcessRunner, W: Write>(
    root: &Path,
    config: &LauncherConfig,
    runner: &R,
    out: &mut W,
) -> Result<bool> {
    config.validate()?;
    let probe_timeout = config.probe_timeout();
    let gpu = should_use_gpu_override(runner, root, &config.compose, probe_timeout);
    let running = Compose::new(runner, root, &config.compose, gpu, probe_timeout)
        .is_running()
        .context("check stack status")?;
    writeln!(out, "{}", if running { "running" } else { "stopped" })
        .context("write status")?;
    Ok(running)
}

/// Stop the stack as started with and without the GPU override.
///
/// Containers started in either mode are removed. Both `down` calls run; the
/// first nonzero exit code is returned.
#[instrument(skip_all, fields(root = %root.display(), no_gpu = no_gpu))]
pub fn run_down<R: ProcessRunner, W: Write>(
    root: &Path,
    config: &LauncherConfig,
    no_gpu: bool,
    runner: &R,
    out: &mut W,
) -> Result<i32> {
    config.validate()?;
    let probe_timeout = config.probe_timeout();
    let mut variants = Vec::with_capacity(2);
    if !no_gpu && gpu_override_present(root, config) {
        variants.push(("gpu", Compose::new(runner, root, &config.compose, true, probe_timeout)));
    }
    variants.push(("base", Compose::new(runner, root, &config.compose, false, probe_timeout)));

    let mut first_failure = None;
    for (label, compose) in &variants {
        writeln!(out, "down: stopping stack ({label} compose files)").context("write status")?;
        let code = compose
            .down()
            .with_context(|| format!("stop stack ({label})"))?;
        debug!(label, exit_code = code, "compose down");
        if code != 0 {
            writeln!(out, "down: {label} shutdown exited with code {code}")
                .context("write status")?;
            if first_failure.is_none() {
                first_failure = Some(code);
            }
        }
    }
    Ok(first_failure.unwrap_or(0))
}

fn gpu_override_present(root: &Path, config: &LauncherConfig) -> bool {
    config
        .compose
        .gpu_override_file
        .as_ref()
        .is_some_and(|file| root.join(file).exists())
}
