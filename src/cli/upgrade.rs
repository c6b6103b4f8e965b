//! `relayctl upgrade`

use super::CliConfig;
use super::common::{ARCHITECTURES, host_orchestrator, report_outcome};
use crate::orchestrator::UpgradeRequest;
use crate::utils::platform::ensure_root;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Upgrade the installed relay.
///
/// ```bash
/// relayctl upgrade --check      # report only
/// relayctl upgrade              # latest release
/// relayctl upgrade v1.3.0       # a specific release
/// relayctl upgrade --force      # reinstall the current release
/// relayctl upgrade --rollback   # restore the newest backup
/// ```
///
/// A new version that fails its health check is rolled back automatically
/// and the command exits non-zero.
#[derive(Args, Debug)]
pub struct UpgradeCommand {
    /// Release tag to move to (e.g. "v1.3.0"); the latest when omitted
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,

    /// Check for a newer release without installing it
    #[arg(long, conflicts_with_all = ["force", "rollback"])]
    pub check: bool,

    /// Proceed even when the target is already installed
    #[arg(short, long)]
    pub force: bool,

    /// Restore the most recent backup instead of downloading
    #[arg(long, conflicts_with = "version")]
    pub rollback: bool,

    /// Release architecture instead of the detected one
    #[arg(long, value_parser = ARCHITECTURES, conflicts_with_all = ["check", "rollback"])]
    pub arch: Option<String>,
}

impl UpgradeCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        if self.check {
            return check_for_updates(config).await;
        }

        ensure_root()?;
        let orchestrator = host_orchestrator(config, self.arch.as_deref()).await?;

        if self.rollback {
            println!("{}", "Rolling back to the most recent backup...".yellow());
            return report_outcome(orchestrator.rollback_to_latest_backup().await?);
        }

        let outcome = orchestrator
            .upgrade(UpgradeRequest {
                version: self.version,
                force: self.force,
            })
            .await?;
        report_outcome(outcome)
    }
}

async fn check_for_updates(config: &CliConfig) -> Result<()> {
    println!("{}", "Checking for updates...".cyan());
    let check = host_orchestrator(config, None).await?.check_update().await?;

    match (&check.installed, check.update_available) {
        (None, _) => println!("Not installed; latest release is {}", check.latest.green()),
        (Some(installed), true) => {
            println!("{}", format!("Update available: {installed} -> {}", check.latest).green());
            println!("Run {} to install it", "relayctl upgrade".cyan());
        }
        (Some(installed), false) => {
            println!("{}", format!("You are on the latest version ({installed})").green());
        }
    }
    Ok(())
}
