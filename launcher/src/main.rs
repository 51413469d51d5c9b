//! `launcher`: start the container stack, prepare Python, and run the app.

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use launcher::exit_codes;
use launcher::init::run_init;
use launcher::io::config::{CONFIG_FILE_NAME, load_config};
use launcher::io::process::SystemRunner;
use launcher::launch::{LaunchOptions, run_launch};
use launcher::logging;
use launcher::stack::{run_down, run_status};

#[derive(Parser)]
#[command(
    name = "launcher",
    version,
    about = "Bring up the container stack, install dependencies, and launch the web app"
)]
struct Cli {
    /// Project root. Defaults to the current directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file. Defaults to `<root>/launcher.toml`; a missing file means defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `launcher.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Start the stack, resolve the runtime, install dependencies, run the app (default).
    Launch(LaunchArgs),
    /// Print whether the stack has running containers.
    Status,
    /// Stop the stack (with and without the GPU override).
    Down {
        /// Skip the GPU override pass.
        #[arg(long)]
        no_gpu: bool,
    },
}

#[derive(Args, Default)]
struct LaunchArgs {
    /// Stop a running stack before starting it.
    #[arg(long)]
    restart: bool,
    /// Do not run `pip install`.
    #[arg(long)]
    skip_install: bool,
    /// Never use the GPU compose override.
    #[arg(long)]
    no_gpu: bool,
    /// Fail unless `<root>/.env` exists.
    #[arg(long)]
    require_env: bool,
}

impl From<LaunchArgs> for LaunchOptions {
    fn from(args: LaunchArgs) -> Self {
        Self {
            restart: args.restart,
            skip_install: args.skip_install,
            no_gpu: args.no_gpu,
            require_env: args.require_env,
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let root = fs::canonicalize(&root)
        .with_context(|| format!("resolve project root {}", root.display()))?;
    let config_path = cli.config.unwrap_or_else(|| root.join(CONFIG_FILE_NAME));
    let mut out = io::stdout();
    let command = cli
        .command
        .unwrap_or(Command::Launch(LaunchArgs::default()));
    if let Command::Init { force } = command {
        run_init(&config_path, force, &mut out)?;
        return Ok(exit_codes::OK);
    }

    let config = load_config(&config_path)?;
    debug!(root = %root.display(), config = %config_path.display(), "configuration loaded");

    let runner = SystemRunner::default();
    match command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Launch(args) => {
            let outcome = run_launch(&root, &config, &args.into(), &runner, &mut out)?;
            debug!(?outcome, "launch finished");
            Ok(outcome.exit_code())
        }
        Command::Status => {
            let running = run_status(&root, &config, &runner, &mut out)?;
            Ok(if running {
                exit_codes::OK
            } else {
                exit_codes::STOPPED
            })
        }
        Command::Down { no_gpu } => run_down(&root, &config, no_gpu, &runner, &mut out),
    }
}
