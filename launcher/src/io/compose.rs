//! Container orchestration adapter (`docker compose` and compatibles).
//!
//! Only exit codes and `ps` output are consumed; what the stack contains is
//! the compose files' business.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::compose::{compose_args, stack_is_running};
use crate::core::gpu::runtimes_include_nvidia;
use crate::io::config::ComposeConfig;
use crate::io::process::{Invocation, ProcessRunner, find_on_path};

/// Wrapper for executing compose commands in the project root.
pub struct Compose<'a, R: ProcessRunner> {
    runner: &'a R,
    root: PathBuf,
    command: Vec<String>,
    files: Vec<PathBuf>,
    probe_timeout: Duration,
}

impl<'a, R: ProcessRunner> Compose<'a, R> {
    /// Build a compose wrapper; `with_gpu_override` appends the configured override file.
    pub fn new(
        runner: &'a R,
        root: &Path,
        config: &ComposeConfig,
        with_gpu_override: bool,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            root: root.to_path_buf(),
            command: config.command.clone(),
            files: compose_files(root, config, with_gpu_override),
            probe_timeout,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// `up -d`: start the stack detached. Returns the tool's exit code.
    #[instrument(skip_all)]
    pub fn up(&self) -> Result<i32> {
        let code = self.runner.run(&self.invocation(&["up", "-d"])?)?;
        debug!(exit_code = code, "compose up finished");
        Ok(code)
    }

    /// `down`: stop and remove the stack's containers. Returns the tool's exit code.
    #[instrument(skip_all)]
    pub fn down(&self) -> Result<i32> {
        let code = self.runner.run(&self.invocation(&["down"])?)?;
        debug!(exit_code = code, "compose down finished");
        Ok(code)
    }

    /// Whether any container of the stack is running (`ps --quiet` prints ids).
    #[instrument(skip_all)]
    pub fn is_running(&self) -> Result<bool> {
        let captured = self
            .runner
            .capture(&self.invocation(&["ps", "--quiet"])?, self.probe_timeout)?;
        if captured.timed_out {
            bail!("compose ps timed out after {:?}", self.probe_timeout);
        }
        if !captured.success() {
            bail!(
                "compose ps failed with status {}: {}",
                captured.code,
                captured.stderr_lossy().trim()
            );
        }
        let running = stack_is_running(&captured.stdout_lossy());
        debug!(running, "compose ps finished");
        Ok(running)
    }

    fn invocation(&self, extra: &[&str]) -> Result<Invocation> {
        let Some((program, prefix)) = self.command.split_first() else {
            bail!("compose.command must not be empty");
        };
        Ok(Invocation::new(program, &self.root)
            .args(prefix)
            .args(compose_args(&self.files, extra)))
    }
}

/// Compose files that exist under `root`, with the GPU override last when requested.
pub fn compose_files(root: &Path, config: &ComposeConfig, with_gpu_override: bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = config
        .files
        .iter()
        .map(|file| root.join(file))
        .filter(|path| {
            let exists = path.exists();
            if !exists {
                warn!(file = %path.display(), "compose file missing, skipping");
            }
            exists
        })
        .collect();

    if with_gpu_override
        && let Some(gpu) = &config.gpu_override_file
    {
        let path = root.join(gpu);
        if path.exists() {
            files.push(path);
        } else {
            debug!(file = %path.display(), "gpu override file missing, skipping");
        }
    }
    files
}

/// Use the GPU override only when its file exists and a GPU container runtime is present.
pub fn should_use_gpu_override<R: ProcessRunner>(
    runner: &R,
    root: &Path,
    config: &ComposeConfig,
    probe_timeout: Duration,
) -> bool {
    let Some(gpu) = &config.gpu_override_file else {
        return false;
    };
    if !root.join(gpu).exists() {
        debug!(file = %gpu.display(), "gpu override not present");
        return false;
    }
    let available = gpu_runtime_available(runner, root, config, probe_timeout);
    info!(available, "gpu runtime detection");
    available
}

/// Ask the container engine for its runtimes, falling back to `nvidia-smi` on `PATH`.
#[instrument(skip_all)]
pub fn gpu_runtime_available<R: ProcessRunner>(
    runner: &R,
    root: &Path,
    config: &ComposeConfig,
    probe_timeout: Duration,
) -> bool {
    let Some(program) = config.command.first() else {
        debug!("compose.command empty, skipping engine info");
        return find_on_path("nvidia-smi").is_some();
    };
    let invocation =
        Invocation::new(program, root).args(["info", "--format", "{{json .Runtimes}}"]);
    match runner.capture(&invocation, probe_timeout) {
        Ok(captured) if captured.success() && runtimes_include_nvidia(&captured.stdout_lossy()) => {
            return true;
        }
        Ok(captured) => debug!(exit_code = captured.code, "no nvidia runtime reported"),
        Err(err) => debug!(err = %err, "container engine info probe failed"),
    }
    find_on_path("nvidia-smi").is_some()
}
