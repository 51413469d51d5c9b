//! Test-only helpers: a scripted process runner and throwaway project roots.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::core::runtime::{virtualenv_candidates, virtualenv_dir};
use crate::io::config::{CONFIG_FILE_NAME, LauncherConfig, write_config};
use crate::io::process::{Captured, Invocation, ProcessRunner};

/// Scripted response for a blocking `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedRun {
    Exit(i32),
    /// Behave as if the program could not be spawned.
    SpawnError,
}

/// Process runner that records every invocation and replays queued responses.
///
/// `run` and `capture` draw from separate queues. An empty queue is an error,
/// so a test fails loudly when the code under test spawns more than expected.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    calls: RefCell<Vec<Invocation>>,
    runs: RefCell<VecDeque<ScriptedRun>>,
    captures: RefCell<VecDeque<Captured>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue exit codes for successive `run` calls.
    pub fn with_runs(self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.runs
            .borrow_mut()
            .extend(codes.into_iter().map(ScriptedRun::Exit));
        self
    }

    pub fn with_run(self, run: ScriptedRun) -> Self {
        self.runs.borrow_mut().push_back(run);
        self
    }

    /// Queue outputs for successive `capture` calls.
    pub fn with_captures(self, captures: impl IntoIterator<Item = Captured>) -> Self {
        self.captures.borrow_mut().extend(captures);
        self
    }

    /// Every invocation seen so far, in order, across `run` and `capture`.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Whether any invocation mentioned `needle` as its program or an argument.
    pub fn invoked_with(&self, needle: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call.argv().iter().any(|part| part == needle))
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<i32> {
        self.calls.borrow_mut().push(invocation.clone());
        match self.runs.borrow_mut().pop_front() {
            Some(ScriptedRun::Exit(code)) => Ok(code),
            Some(ScriptedRun::SpawnError) => Err(anyhow!("spawn {}", invocation.display())),
            None => Err(anyhow!("no scripted run for {}", invocation.display())),
        }
    }

    fn capture(&self, invocation: &Invocation, _timeout: Duration) -> Result<Captured> {
        self.calls.borrow_mut().push(invocation.clone());
        self.captures
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted capture for {}", invocation.display()))
    }
}

impl Captured {
    /// Successful probe printing `stdout`.
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            timed_out: false,
        }
    }

    /// Failed probe with `code` and `stderr`.
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            timed_out: false,
        }
    }
}

/// Temporary project root, removed on drop.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp project")?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Create an empty file at `rel`, with parent directories.
    pub fn touch(&self, rel: impl AsRef<Path>) -> Result<PathBuf> {
        self.write(rel, "")
    }

    pub fn write(&self, rel: impl AsRef<Path>, contents: &str) -> Result<PathBuf> {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    /// Create the preferred interpreter path of the configured virtualenv.
    pub fn create_venv_python(&self, config: &LauncherConfig) -> Result<PathBuf> {
        let venv = virtualenv_dir(self.path(), &config.runtime.virtualenv);
        let candidate = virtualenv_candidates(&venv)
            .into_iter()
            .next()
            .context("no virtualenv candidates")?;
        self.touch(candidate)
    }

    /// Create the configured application entry point.
    pub fn create_entrypoint(&self, config: &LauncherConfig) -> Result<PathBuf> {
        self.touch(&config.app.entrypoint)
    }

    pub fn write_config(&self, config: &LauncherConfig) -> Result<PathBuf> {
        let path = self.path().join(CONFIG_FILE_NAME);
        write_config(&path, config, true)?;
        Ok(path)
    }
}
