//! `relayctl export`

use super::CliConfig;
use super::common::host_orchestrator;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::io::IsTerminal;

/// Print client connection descriptors for the installed service.
#[derive(Args, Debug)]
pub struct ExportCommand {
    /// Public address to advertise instead of looking it up
    #[arg(long, value_name = "IP")]
    pub public_ip: Option<String>,
}

impl ExportCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let descriptors = host_orchestrator(config, None)
            .await?
            .export(self.public_ip.as_deref())
            .await?;

        // Piped output is only the descriptors, one per line.
        let labelled = std::io::stdout().is_terminal();
        for descriptor in descriptors {
            if labelled {
                println!("{}", format!("{}:", descriptor.kind).bold());
            }
            println!("{}", descriptor.text);
        }
        Ok(())
    }
}
