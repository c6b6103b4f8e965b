//! Command-line interface for relayctl.
//!
//! One module per command, each with an `execute()` taking the shared
//! [`CliConfig`]. Mutating commands require root; `status`, `export` and
//! `upgrade --check` do not.
//!
//! # Commands
//!
//! - `install` - Download, configure and start the relay service
//! - `upgrade` - Move to a newer release, check for one, or roll back
//! - `restart` / `stop` - Service passthroughs (restart is health checked)
//! - `status` - Installed version, service state and port
//! - `uninstall` - Remove the deployment (asks unless `--yes`)
//! - `export` - Print client connection descriptors
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--config <path>`: settings file (else `RELAYCTL_CONFIG`, else
//!   `/etc/relayctl/relayctl.toml`)
//! - `--no-progress`: no download progress bars

pub mod common;
mod export;
mod install;
mod lifecycle;
mod uninstall;
mod upgrade;


use crate::config::Settings;
use crate::utils::progress::disable_progress;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// `EnvFilter` directive; `None` leaves the choice to `RUST_LOG`.
    pub log_level: Option<String>,

    pub no_progress: bool,

    /// Explicit settings file.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies process-wide switches once, before any command runs.
    pub fn apply(&self) {
        if self.no_progress {
            disable_progress();
        }
    }

    pub async fn load_settings(&self) -> Result<Settings> {
        Settings::load(self.config_path.as_deref()).await
    }
}

#[derive(Parser)]
#[command(
    name = "relayctl",
    about = "Install and operate a relay server as a systemd service",
    version,
    long_about = "relayctl downloads relay-server releases, installs them atomically, manages the \
                  systemd unit and rolls back automatically when a new version fails its health check."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable download progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install (or reinstall) the relay service
    Install(install::InstallCommand),

    /// Upgrade to the latest or a given release
    Upgrade(upgrade::UpgradeCommand),

    /// Restart the service and check its health
    Restart(lifecycle::RestartCommand),

    /// Stop the service
    Stop(lifecycle::StopCommand),

    /// Show installation and service state
    Status(lifecycle::StatusCommand),

    /// Remove the service, its configuration and binary
    Uninstall(uninstall::UninstallCommand),

    /// Print client connection descriptors
    Export(export::ExportCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("relayctl=debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply();

        match self.command {
            Commands::Install(cmd) => cmd.execute(&config).await,
            Commands::Upgrade(cmd) => cmd.execute(&config).await,
            Commands::Restart(cmd) => cmd.execute(&config).await,
            Commands::Stop(cmd) => cmd.execute(&config).await,
            Commands::Status(cmd) => cmd.execute(&config).await,
            Commands::Uninstall(cmd) => cmd.execute(&config).await,
            Commands::Export(cmd) => cmd.execute(&config).await,
        }
    }
}
