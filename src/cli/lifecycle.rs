//! `relayctl restart`, `relayctl stop` and `relayctl status`

use super::CliConfig;
use super::common::host_orchestrator;
use crate::orchestrator::StatusReport;
use crate::utils::platform::ensure_root;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct RestartCommand;

impl RestartCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        ensure_root()?;
        host_orchestrator(config, None).await?.restart().await?;
        println!("{}", "Service restarted and healthy".green());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct StopCommand;

impl StopCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        ensure_root()?;
        host_orchestrator(config, None).await?.stop().await?;
        println!("{}", "Service stopped".green());
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Also print the supervisor's status text
    #[arg(long)]
    pub detail: bool,
}

impl StatusCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let report = host_orchestrator(config, None).await?.status().await?;
        print_status(&report, self.detail);
        Ok(())
    }
}

fn print_status(report: &StatusReport, detail: bool) {
    let installed = match &report.installed {
        Some(tag) => tag.green().to_string(),
        None => "not installed".yellow().to_string(),
    };
    println!("{:<12} {installed}", "Version:".bold());

    let state = if report.active {
        "active".green()
    } else {
        "inactive".red()
    };
    println!("{:<12} {state}", "Service:".bold());

    let unit = if report.definition_present {
        "present"
    } else {
        "missing"
    };
    println!("{:<12} {unit}", "Unit:".bold());

    if let Some(port) = report.port {
        let listening = match report.listening {
            Some(true) => "listening".green(),
            Some(false) => "not listening".red(),
            None => "unknown".yellow(),
        };
        println!("{:<12} {port} ({listening})", "Port:".bold());
    }
    if let Some(error) = &report.config_error {
        println!("{:<12} {}", "Config:".bold(), error.red());
    }
    println!("{:<12} {}", "Backups:".bold(), report.backups);

    if detail && !report.detail.is_empty() {
        println!();
        println!("{}", report.detail);
    }
}
