//! `relayctl uninstall`

use super::CliConfig;
use super::common::{host_orchestrator, require_confirmation};
use crate::utils::platform::ensure_root;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Remove the service, its configuration, the binary and its backups.
#[derive(Args, Debug)]
pub struct UninstallCommand {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

impl UninstallCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        ensure_root()?;
        require_confirmation("uninstall", self.yes).await?;

        host_orchestrator(config, None).await?.uninstall(true).await?;
        println!("{}", "relay-server uninstalled".green());
        Ok(())
    }
}
