//! UniFi Backup Manager console for the terminal

mod commands;
mod console;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{Level, debug, error, warn};
use ubm_core::{ConsoleConfig, StateDir};

#[derive(Parser)]
#[command(name = "ubm")]
#[command(about = "Sign in to a UniFi Backup Manager server and browse it from the terminal")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to console.toml in the platform config directory)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for configuration and session data
    #[arg(short = 'd', long, global = true, env = "UBM_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// File holding the token pair between invocations
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "60")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn state_dir(&self) -> StateDir {
        self.state_dir
            .as_ref()
            .map_or_else(StateDir::new, StateDir::with_override)
    }

    /// Explicit `--config`, else the default file when it exists
    fn config_file(&self, state_dir: &StateDir) -> Option<PathBuf> {
        self.config.clone().or_else(|| {
            let default = state_dir.config_file();
            default.exists().then_some(default)
        })
    }

    /// `--token-file`, then the configured file, then the platform data directory
    fn token_file(&self, config: &ConsoleConfig, state_dir: &StateDir) -> PathBuf {
        match (&self.token_file, &config.storage.token_file) {
            (Some(path), _) | (None, Some(path)) => path.clone(),
            (None, None) => {
                if let Err(e) = state_dir.ensure_data_dir() {
                    warn!("Cannot create the data directory: {e}");
                }
                config.storage.token_file_in(state_dir)
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    ubm_core::logging::init_tracing(cli.log_level.into(), cli.json_logs);

    if let Err(e) = run(cli).await {
        error!("Command failed: {e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let state_dir = cli.state_dir();
    let config_file = cli.config_file(&state_dir);
    if let Some(path) = &config_file {
        debug!("Loading configuration from {}", path.display());
    }
    let config = ConsoleConfig::load(config_file.as_deref())?;

    let token_file = cli.token_file(&config, &state_dir);

    let command = cli.command.execute(&config, token_file);
    if cli.timeout == 0 {
        return command.await;
    }

    match tokio::time::timeout(Duration::from_secs(cli.timeout), command).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Command timed out after {} seconds", cli.timeout),
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
