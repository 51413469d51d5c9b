//! Python runtime adapter: virtualenv creation, pip, and the application process.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::types::Runtime;
use crate::io::process::{Invocation, ProcessRunner};

/// pip requirement for the project in `.` with optional extras: `.[dev,docs]`.
pub fn project_requirement(extras: &[String]) -> String {
    if extras.is_empty() {
        ".".to_string()
    } else {
        format!(".[{}]", extras.join(","))
    }
}

/// Create a virtualenv at `venv_dir` using `python -m venv`. Returns the exit code.
#[instrument(skip_all, fields(venv_dir = %venv_dir.display()))]
pub fn create_virtualenv<R: ProcessRunner>(
    runner: &R,
    python: &str,
    venv_dir: &Path,
    workdir: &Path,
) -> Result<i32> {
    info!(python, "creating virtualenv");
    let invocation = Invocation::new(python, workdir)
        .args(["-m", "venv"])
        .arg(venv_dir);
    runner.run(&invocation)
}

/// A resolved interpreter bound to the project root.
pub struct Python<'a, R: ProcessRunner> {
    runner: &'a R,
    runtime: &'a Runtime,
    workdir: &'a Path,
}

impl<'a, R: ProcessRunner> Python<'a, R> {
    pub fn new(runner: &'a R, runtime: &'a Runtime, workdir: &'a Path) -> Self {
        Self {
            runner,
            runtime,
            workdir,
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(self.runtime.program(), self.workdir)
    }

    /// `-m pip --version` exits zero.
    pub fn pip_available(&self, timeout: Duration) -> Result<bool> {
        let captured = self
            .runner
            .capture(&self.invocation().args(["-m", "pip", "--version"]), timeout)?;
        debug!(exit_code = captured.code, timed_out = captured.timed_out, "pip probe");
        Ok(captured.success())
    }

    /// Make sure pip is importable, bootstrapping it with `ensurepip` if needed.
    #[instrument(skip_all)]
    pub fn ensure_pip(&self, timeout: Duration) -> Result<()> {
        if self.pip_available(timeout)? {
            return Ok(());
        }
        warn!(runtime = %self.runtime, "pip missing, bootstrapping with ensurepip");
        let code = self
            .runner
            .run(&self.invocation().args(["-m", "ensurepip", "--upgrade"]))?;
        if code != 0 {
            debug!(exit_code = code, "ensurepip failed");
        }
        if !self.pip_available(timeout)? {
            bail!("pip is unavailable for {} after ensurepip", self.runtime);
        }
        Ok(())
    }

    /// `-m pip install <requirement>` in the project root. Returns pip's exit code.
    #[instrument(skip_all, fields(requirement = %requirement))]
    pub fn install_project(&self, requirement: &str) -> Result<i32> {
        let invocation = self.invocation().args(["-m", "pip", "install", requirement]);
        self.runner.run(&invocation)
    }

    /// Run `entrypoint` in the foreground until it exits. Returns its exit code.
    #[instrument(skip_all, fields(entrypoint = %entrypoint.display()))]
    pub fn run_script(&self, entrypoint: &Path) -> Result<i32> {
        self.runner.run(&self.invocation().arg(entrypoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::Captured;
    use crate::test_support::ScriptedRunner;
    use std::path::PathBuf;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn runtime() -> Runtime {
        Runtime::Fallback("python-bin".to_string())
    }

    #[test]
    fn requirement_includes_extras() {
        assert_eq!(project_requirement(&["dev".to_string()]), ".[dev]");
        assert_eq!(
            project_requirement(&["dev".to_string(), "docs".to_string()]),
            ".[dev,docs]"
        );
        assert_eq!(project_requirement(&[]), ".");
    }

    #[test]
    fn create_virtualenv_invokes_venv_module() {
        let runner = ScriptedRunner::new().with_runs([0]);
        let code = create_virtualenv(
            &runner,
            "python-test",
            Path::new("/work/.venv"),
            Path::new("/work"),
        )
        .expect("create");
        assert_eq!(code, 0);
        assert_eq!(
            runner.calls()[0].argv(),
            vec!["python-test", "-m", "venv", "/work/.venv"]
        );
    }

    #[test]
    fn install_runs_pip_in_project_root() {
        let runtime = runtime();
        let runner = ScriptedRunner::new().with_runs([0]);
        let python = Python::new(&runner, &runtime, Path::new("/work"));

        assert_eq!(python.install_project(".[dev]").expect("install"), 0);
        let calls = runner.calls();
        assert_eq!(
            calls[0].argv(),
            vec!["python-bin", "-m", "pip", "install", ".[dev]"]
        );
        assert_eq!(calls[0].workdir, PathBuf::from("/work"));
    }

    #[test]
    fn ensure_pip_short_circuits_when_present() {
        let runtime = runtime();
        let runner = ScriptedRunner::new().with_captures([Captured::ok("pip 24.0")]);
        let python = Python::new(&runner, &runtime, Path::new("/work"));

        python.ensure_pip(TIMEOUT).expect("ensure pip");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn ensure_pip_bootstraps_with_ensurepip() {
        let runtime = runtime();
        let runner = ScriptedRunner::new()
            .with_captures([Captured::failed(1, "No module named pip"), Captured::ok("pip")])
            .with_runs([0]);
        let python = Python::new(&runner, &runtime, Path::new("/work"));

        python.ensure_pip(TIMEOUT).expect("ensure pip");
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1].argv(),
            vec!["python-bin", "-m", "ensurepip", "--upgrade"]
        );
    }

    #[test]
    fn ensure_pip_errors_when_still_missing() {
        let runtime = runtime();
        let runner = ScriptedRunner::new()
            .with_captures([Captured::failed(1, ""), Captured::failed(1, "")])
            .with_runs([1]);
        let python = Python::new(&runner, &runtime, Path::new("/work"));

        let err = python.ensure_pip(TIMEOUT).unwrap_err();
        assert!(err.to_string().contains("after ensurepip"));
    }

    #[test]
    fn run_script_passes_entrypoint() {
        let runtime = Runtime::Virtualenv(PathBuf::from("/work/.venv/bin/python3"));
        let runner = ScriptedRunner::new().with_runs([7]);
        let python = Python::new(&runner, &runtime, Path::new("/work"));

        assert_eq!(python.run_script(Path::new("/work/app.py")).expect("run"), 7);
        assert_eq!(
            runner.calls()[0].argv(),
            vec!["/work/.venv/bin/python3", "/work/app.py"]
        );
    }
}
