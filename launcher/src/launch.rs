//! Orchestration for `launcher launch`.
//!
//! Four steps run in order: stack startup, runtime resolution, dependency
//! installation, application launch. Stack startup and the entry-point check
//! end the launch on failure. Dependency installation failures are reported
//! and the launch continues.

use std::io::Write;
use std::path::Path;
use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::runtime::{resolve_runtime, virtualenv_candidates, virtualenv_dir};
use crate::core::types::{LaunchOutcome, Runtime};
use crate::io::compose::{Compose, should_use_gpu_override};
use crate::io::config::LauncherConfig;
use crate::io::process::{ProcessRunner, find_on_path, is_bare_command};
use crate::io::python::{Python, create_virtualenv, project_requirement};

/// Per-invocation switches layered over [`LauncherConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Stop a running stack with `compose down` before bringing it up.
    pub restart: bool,
    /// Skip dependency installation.
    pub skip_install: bool,
    /// Never add the GPU compose override.
    pub no_gpu: bool,
    /// Require `<root>/.env` before starting anything.
    pub require_env: bool,
}

/// Run the launch sequence in `root`, writing status lines to `out`.
///
/// Returns the terminal [`LaunchOutcome`]; `Err` is reserved for launcher
/// failures: an invalid config, unwritable output, a stack tool or
/// application that cannot be spawned, or a failing `ps` check on restart.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_launch<R: ProcessRunner, W: Write>(
    root: &Path,
    config: &LauncherConfig,
    options: &LaunchOptions,
    runner: &R,
    out: &mut W,
) -> Result<LaunchOutcome> {
    config.validate()?;
    if (options.require_env || config.app.require_env_file) && !root.join(".env").exists() {
        let path = root.join(".env");
        status(out, &format!("error: required env file {} is missing", path.display()))?;
        return Ok(LaunchOutcome::EnvFileMissing { path });
    }

    let probe_timeout = config.probe_timeout();
    let gpu = !options.no_gpu
        && should_use_gpu_override(runner, root, &config.compose, probe_timeout);
    let compose = Compose::new(runner, root, &config.compose, gpu, probe_timeout);
    debug!(gpu, files = ?compose.files(), "compose configured");

    if options.restart && compose.is_running().context("check running stack")? {
        status(out, "stack is running, stopping it first")?;
        let code = compose.down().context("stop running stack")?;
        if code != 0 {
            status(out, &format!("error: stack shutdown failed with exit code {code}"))?;
            return Ok(LaunchOutcome::StackFailed { code });
        }
    }

    // Step 1: stack startup. Nonzero is fatal and propagated verbatim.
    status(out, "starting container stack")?;
    let code = compose.up().context("start container stack")?;
    if code != 0 {
        warn!(exit_code = code, "stack startup failed");
        status(out, &format!("error: stack startup failed with exit code {code}"))?;
        return Ok(LaunchOutcome::StackFailed { code });
    }
    info!("stack is up");

    // Step 2: runtime resolution.
    let runtime = resolve_launch_runtime(root, config, runner, out)?;
    status(out, &format!("using {runtime}"))?;

    // Step 3: dependency installation. Failures are reported and ignored.
    if options.skip_install || !config.install.enabled {
        status(out, "skipping dependency installation")?;
    } else if let Err(err) = install_dependencies(root, config, &runtime, runner, out) {
        warn!(err = %format!("{err:#}"), "dependency installation failed, continuing");
        status(
            out,
            &format!("warning: dependency installation failed ({err:#}); continuing"),
        )?;
    }

    // Step 4: application launch.
    let entrypoint = root.join(&config.app.entrypoint);
    if !entrypoint.is_file() {
        status(
            out,
            &format!("error: application entry point {} not found", entrypoint.display()),
        )?;
        return Ok(LaunchOutcome::EntrypointMissing { path: entrypoint });
    }
    status(out, &format!("launching {}", entrypoint.display()))?;
    out.flush().context("flush status output")?;
    let code = Python::new(runner, &runtime, root)
        .run_script(&entrypoint)
        .context("launch application")?;
    info!(exit_code = code, "application exited");
    Ok(LaunchOutcome::AppExited { code })
}

/// Virtualenv interpreter if present (optionally creating the venv), else the fallback command.
fn resolve_launch_runtime<R: ProcessRunner, W: Write>(
    root: &Path,
    config: &LauncherConfig,
    runner: &R,
    out: &mut W,
) -> Result<Runtime> {
    let venv = virtualenv_dir(root, &config.runtime.virtualenv);
    let candidates = virtualenv_candidates(&venv);
    let fallback = &config.runtime.fallback;
    if !config.runtime.use_virtualenv {
        debug!("virtualenv lookup disabled");
        return Ok(Runtime::Fallback(fallback.clone()));
    }

    let mut runtime = resolve_runtime(&candidates, fallback, |path| path.exists());
    if !runtime.is_virtualenv() && config.runtime.create_virtualenv {
        status(out, &format!("creating virtualenv at {}", venv.display()))?;
        match create_virtualenv(runner, fallback, &venv, root) {
            Ok(0) => runtime = resolve_runtime(&candidates, fallback, |path| path.exists()),
            Ok(code) => status(
                out,
                &format!("warning: virtualenv creation failed with exit code {code}"),
            )?,
            Err(err) => status(out, &format!("warning: virtualenv creation failed ({err:#})"))?,
        }
    }

    if is_bare_command(runtime.program()) {
        debug!(resolved = ?find_on_path(fallback), "fallback runtime lookup");
    }
    Ok(runtime)
}

/// `pip install .[extras]`, bootstrapping pip first when configured.
fn install_dependencies<R: ProcessRunner, W: Write>(
    root: &Path,
    config: &LauncherConfig,
    runtime: &Runtime,
    runner: &R,
    out: &mut W,
) -> Result<()> {
    let python = Python::new(runner, runtime, root);
    if config.install.bootstrap_pip {
        python.ensure_pip(config.probe_timeout())?;
    }
    let requirement = project_requirement(&config.install.extras);
    status(out, &format!("installing dependencies ({requirement})"))?;
    let code = python.install_project(&requirement)?;
    if code != 0 {
        bail!("pip install exited with code {code}");
    }
    Ok(())
}

fn status<W: Write>(out: &mut W, line: &str) -> Result<()> {
    writeln!(out, "launch: {line}").context("write status line")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::Captured;
    use crate::test_support::{ScriptedRun, ScriptedRunner, TestProject};

    /// Config without pip bootstrap so each step is a single `run`.
    fn plain_config() -> LauncherConfig {
        let mut config = LauncherConfig::default();
        config.install.bootstrap_pip = false;
        config
    }

    fn launch(
        project: &TestProject,
        config: &LauncherConfig,
        options: &LaunchOptions,
        runner: &ScriptedRunner,
    ) -> (LaunchOutcome, String) {
        let mut out = Vec::new();
        let outcome =
            run_launch(project.path(), config, options, runner, &mut out).expect("launch");
        (outcome, String::from_utf8(out).expect("utf8 status"))
    }

    #[test]
    fn stack_failure_propagates_code_and_stops() {
        for code in [1, 2, 18, 255] {
            let project = TestProject::new().expect("project");
            let config = plain_config();
            project.create_entrypoint(&config).expect("entrypoint");
            let runner = ScriptedRunner::new().with_runs([code]);

            let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

            assert_eq!(outcome, LaunchOutcome::StackFailed { code });
            assert_eq!(outcome.exit_code(), code);
            assert_eq!(runner.calls().len(), 1);
            assert!(output.contains(&format!("exit code {code}")));
            assert!(!output.contains("using"));
        }
    }

    #[test]
    fn virtualenv_runtime_is_preferred_and_named() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        let venv_python = project.create_venv_python(&config).expect("venv");
        let entry = project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 0 });
        assert!(output.contains(&venv_python.display().to_string()));
        let calls = runner.calls();
        let python = venv_python.display().to_string();
        let entry = entry.display().to_string();
        assert_eq!(
            calls[1].argv(),
            vec![python.as_str(), "-m", "pip", "install", ".[dev]"]
        );
        assert_eq!(calls[2].argv(), vec![python.as_str(), entry.as_str()]);
    }

    #[test]
    fn fallback_runtime_when_virtualenv_absent() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0]);

        let (_, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert!(output.contains("'python' from PATH (no virtualenv found)"));
        assert_eq!(runner.calls()[1].argv()[0], "python");
    }

    #[test]
    fn use_virtualenv_false_ignores_existing_venv() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.runtime.use_virtualenv = false;
        config.runtime.create_virtualenv = true;
        project.create_venv_python(&config).expect("venv");
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 0 });
        assert!(output.contains("'python' from PATH"));
        assert!(!runner.invoked_with("venv"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].argv()[0], "python");
        assert_eq!(calls[2].argv()[0], "python");
    }

    #[test]
    fn installer_failure_still_launches_app() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 1, 9]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 9 });
        assert_eq!(outcome.exit_code(), 9);
        assert!(output.contains("warning: dependency installation failed"));
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn installer_spawn_error_still_launches_app() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_runs([0])
            .with_run(ScriptedRun::SpawnError)
            .with_runs([0]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 0 });
        assert!(output.contains("warning:"));
    }

    #[test]
    fn pip_bootstrap_failure_is_not_fatal() {
        let project = TestProject::new().expect("project");
        let config = LauncherConfig::default();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_runs([0, 1, 0])
            .with_captures([Captured::failed(1, ""), Captured::failed(1, "")]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 0 });
        assert!(output.contains("after ensurepip"));
        assert!(!runner.invoked_with("install"));
    }

    #[test]
    fn missing_entrypoint_exits_one_without_running_it() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        let runner = ScriptedRunner::new().with_runs([0, 0]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        let expected = project.path().join(&config.app.entrypoint);
        assert_eq!(
            outcome,
            LaunchOutcome::EntrypointMissing {
                path: expected.clone()
            }
        );
        assert_eq!(outcome.exit_code(), 1);
        assert!(output.contains("not found"));
        assert_eq!(runner.calls().len(), 2);
        assert!(!runner.invoked_with(&expected.display().to_string()));
    }

    #[test]
    fn entrypoint_directory_is_treated_as_missing() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        let dir = project.path().join(&config.app.entrypoint);
        std::fs::create_dir_all(&dir).expect("entrypoint dir");
        let runner = ScriptedRunner::new().with_runs([0, 0]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert_eq!(outcome, LaunchOutcome::EntrypointMissing { path: dir.clone() });
        assert_eq!(outcome.exit_code(), 1);
        assert!(output.contains("not found"));
        assert_eq!(runner.calls().len(), 2);
        assert!(!runner.invoked_with(&dir.display().to_string()));
    }

    #[test]
    fn skip_install_goes_straight_to_launch() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 3]);
        let options = LaunchOptions {
            skip_install: true,
            ..LaunchOptions::default()
        };

        let (outcome, output) = launch(&project, &config, &options, &runner);

        assert_eq!(outcome, LaunchOutcome::AppExited { code: 3 });
        assert!(output.contains("skipping dependency installation"));
        assert!(!runner.invoked_with("pip"));
    }

    #[test]
    fn restart_stops_running_stack_before_up() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_captures([Captured::ok("abc123\n")])
            .with_runs([0, 0, 0, 0]);
        let options = LaunchOptions {
            restart: true,
            ..LaunchOptions::default()
        };

        launch(&project, &config, &options, &runner);

        let calls = runner.calls();
        assert_eq!(calls[0].argv(), vec!["docker", "compose", "ps", "--quiet"]);
        assert_eq!(calls[1].argv(), vec!["docker", "compose", "down"]);
        assert_eq!(calls[2].argv(), vec!["docker", "compose", "up", "-d"]);
    }

    #[test]
    fn restart_down_failure_stops_before_up() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_captures([Captured::ok("abc123\n")])
            .with_runs([4]);
        let options = LaunchOptions {
            restart: true,
            ..LaunchOptions::default()
        };

        let (outcome, output) = launch(&project, &config, &options, &runner);

        assert_eq!(outcome, LaunchOutcome::StackFailed { code: 4 });
        assert_eq!(outcome.exit_code(), 4);
        assert!(output.contains("stack shutdown failed with exit code 4"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].argv(), vec!["docker", "compose", "down"]);
        assert!(!runner.invoked_with("up"));
    }

    #[test]
    fn restart_skips_down_when_stopped() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_captures([Captured::ok("")])
            .with_runs([0, 0, 0]);
        let options = LaunchOptions {
            restart: true,
            ..LaunchOptions::default()
        };

        launch(&project, &config, &options, &runner);

        let calls = runner.calls();
        assert_eq!(calls[1].argv(), vec!["docker", "compose", "up", "-d"]);
        assert!(!runner.invoked_with("down"));
    }

    #[test]
    fn restart_ps_failure_is_an_error() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        let runner = ScriptedRunner::new().with_captures([Captured::failed(1, "ps error")]);
        let options = LaunchOptions {
            restart: true,
            ..LaunchOptions::default()
        };

        let mut out = Vec::new();
        let err = run_launch(project.path(), &config, &options, &runner, &mut out).unwrap_err();
        assert!(format!("{err:#}").contains("ps error"));
    }

    #[test]
    fn missing_required_env_file_starts_nothing() {
        let project = TestProject::new().expect("project");
        let config = plain_config();
        let runner = ScriptedRunner::new();
        let options = LaunchOptions {
            require_env: true,
            ..LaunchOptions::default()
        };

        let (outcome, _) = launch(&project, &config, &options, &runner);

        assert_eq!(outcome.exit_code(), 1);
        assert!(matches!(outcome, LaunchOutcome::EnvFileMissing { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn present_env_file_passes_preflight() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.app.require_env_file = true;
        project.touch(".env").expect("env");
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0]);

        let (outcome, _) = launch(&project, &config, &LaunchOptions::default(), &runner);
        assert_eq!(outcome, LaunchOutcome::AppExited { code: 0 });
    }

    #[test]
    fn creates_virtualenv_when_configured() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.runtime.create_virtualenv = true;
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0, 0]);

        let (_, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        let venv = project.path().join(".venv").display().to_string();
        assert_eq!(
            runner.calls()[1].argv(),
            vec!["python", "-m", "venv", venv.as_str()]
        );
        // The scripted runner creates nothing, so the fallback is still used.
        assert!(output.contains("from PATH"));
    }

    #[test]
    fn failed_virtualenv_creation_falls_back() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.runtime.create_virtualenv = true;
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 2, 0, 5]);

        let (outcome, output) = launch(&project, &config, &LaunchOptions::default(), &runner);

        assert!(output.contains("warning: virtualenv creation failed with exit code 2"));
        assert_eq!(outcome, LaunchOutcome::AppExited { code: 5 });
    }

    #[test]
    fn gpu_override_is_added_when_runtime_detected() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.compose.gpu_override_file = Some("docker-compose.gpu.yml".into());
        let gpu_file = project.touch("docker-compose.gpu.yml").expect("gpu file");
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new()
            .with_captures([Captured::ok("{\"nvidia\":{}}")])
            .with_runs([0, 0, 0]);

        launch(&project, &config, &LaunchOptions::default(), &runner);

        let gpu_file = gpu_file.display().to_string();
        assert_eq!(
            runner.calls()[1].argv(),
            vec!["docker", "compose", "-f", gpu_file.as_str(), "up", "-d"]
        );
    }

    #[test]
    fn no_gpu_option_skips_detection() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.compose.gpu_override_file = Some("docker-compose.gpu.yml".into());
        project.touch("docker-compose.gpu.yml").expect("gpu file");
        project.create_entrypoint(&config).expect("entrypoint");
        let runner = ScriptedRunner::new().with_runs([0, 0, 0]);
        let options = LaunchOptions {
            no_gpu: true,
            ..LaunchOptions::default()
        };

        launch(&project, &config, &options, &runner);

        assert_eq!(runner.calls()[0].argv(), vec!["docker", "compose", "up", "-d"]);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let project = TestProject::new().expect("project");
        let mut config = plain_config();
        config.compose.command.clear();
        let runner = ScriptedRunner::new();

        let mut out = Vec::new();
        let err = run_launch(
            project.path(),
            &config,
            &LaunchOptions::default(),
            &runner,
            &mut out,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("compose.command"));
        assert!(runner.calls().is_empty());
        assert!(out.is_empty());
    }
}
