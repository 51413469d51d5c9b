//! Launcher configuration stored in `<root>/launcher.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name looked up in the project root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "launcher.toml";

/// Launcher configuration (TOML).
///
/// Every field is optional in the file. An absent file yields the defaults,
/// which describe the plain sequence: `docker compose up -d`, `.venv` or
/// `python`, `pip install .[dev]`, then the Flask host script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Timeout for read-only probes (`compose ps`, `docker info`, `pip --version`).
    pub probe_timeout_secs: u64,

    pub compose: ComposeConfig,
    pub runtime: RuntimeConfig,
    pub install: InstallConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComposeConfig {
    /// Orchestration tool prefix (e.g. `["docker","compose"]`).
    pub command: Vec<String>,

    /// Compose files passed as `-f`, relative to the project root. Empty uses the tool's default.
    pub files: Vec<PathBuf>,

    /// Extra compose file appended when a GPU container runtime is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_override_file: Option<PathBuf>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            command: vec!["docker".to_string(), "compose".to_string()],
            files: Vec::new(),
            gpu_override_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Virtualenv directory, relative to the project root unless absolute.
    pub virtualenv: PathBuf,

    /// Look for a virtualenv at all. `false` always uses `fallback`.
    pub use_virtualenv: bool,

    /// Command used when no virtualenv interpreter exists.
    pub fallback: String,

    /// Create the virtualenv with `fallback -m venv` when it is missing.
    pub create_virtualenv: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            virtualenv: PathBuf::from(".venv"),
            use_virtualenv: true,
            fallback: "python".to_string(),
            create_virtualenv: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    pub enabled: bool,

    /// Optional dependency groups requested as `.[a,b]`.
    pub extras: Vec<String>,

    /// Run `-m ensurepip --upgrade` when pip is missing from the runtime.
    pub bootstrap_pip: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extras: vec!["dev".to_string()],
            bootstrap_pip: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Entry point, relative to the project root.
    pub entrypoint: PathBuf,

    /// Refuse to start anything when `<root>/.env` is absent.
    pub require_env_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            entrypoint: PathBuf::from("glance/custom_api_extension/host_flask.py"),
            require_env_file: false,
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: 30,
            compose: ComposeConfig::default(),
            runtime: RuntimeConfig::default(),
            install: InstallConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl LauncherConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.compose.command.is_empty() || self.compose.command[0].trim().is_empty() {
            return Err(anyhow!("compose.command must be a non-empty array"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        if self.runtime.fallback.trim().is_empty() {
            return Err(anyhow!("runtime.fallback must not be empty"));
        }
        if self.install.extras.iter().any(|extra| extra.trim().is_empty()) {
            return Err(anyhow!("install.extras must not contain empty names"));
        }
        if self.app.entrypoint.as_os_str().is_empty() {
            return Err(anyhow!("app.entrypoint must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LauncherConfig::default()`.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        let cfg = LauncherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LauncherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Comment placed above the serialized settings by `launcher init`.
const CONFIG_HEADER: &str =
    "# launcher settings. Every key is optional; removed keys fall back to the defaults below.\n\n";

/// Write `cfg` to `path` unless a file is already there; `force` overwrites it.
///
/// The file is staged next to `path` and renamed into place. Returns whether
/// anything was written.
pub fn write_config(path: &Path, cfg: &LauncherConfig, force: bool) -> Result<bool> {
    if !force && path.exists() {
        debug!(path = %path.display(), "config exists, leaving it alone");
        return Ok(false);
    }
    cfg.validate()?;
    let body = toml::to_string_pretty(cfg).context("serialize launcher config")?;

    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let staging = path.with_extension("toml.partial");
    fs::write(&staging, format!("{CONFIG_HEADER}{body}"))
        .with_context(|| format!("write {}", staging.display()))?;
    fs::rename(&staging, path).with_context(|| format!("move config into {}", path.display()))?;
    Ok(true)
}
