//! Helpers shared by the CLI commands.

use super::CliConfig;
use crate::core::RelayError;
use crate::health::SsPortProbe;
use crate::orchestrator::{Orchestrator, WorkflowOutcome};
use crate::release::GithubReleases;
use crate::service::SystemdController;
use anyhow::Result;
use colored::Colorize;
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Release architecture names accepted by `--arch`.
pub const ARCHITECTURES: [&str; 6] = ["amd64", "arm64", "armv7", "386", "s390x", "riscv64"];

/// The orchestrator wired to the real host.
pub type HostOrchestrator = Orchestrator<GithubReleases, SystemdController, SsPortProbe>;

/// Loads settings and builds a [`HostOrchestrator`].
///
/// `arch` overrides the architecture detected when an artifact is staged.
pub async fn host_orchestrator(config: &CliConfig, arch: Option<&str>) -> Result<HostOrchestrator> {
    let settings = config.load_settings().await?;
    let layout = settings.layout();
    let arch = arch.map(str::to_string);

    let source = GithubReleases::new(&settings)?;
    let service = SystemdController::new(&layout, &settings.service);
    Ok(Orchestrator::new(settings, layout, source, service, SsPortProbe::new(), arch))
}

/// Prints a workflow outcome; unsuccessful outcomes become the error to exit with.
pub fn report_outcome(outcome: WorkflowOutcome) -> Result<()> {
    match outcome {
        WorkflowOutcome::Committed { .. } => {
            println!("{} {}", "✓".green(), outcome.to_string().green());
            Ok(())
        }
        WorkflowOutcome::UpToDate { .. } => {
            println!("{}", outcome.to_string().green());
            Ok(())
        }
        WorkflowOutcome::RolledBack { ref cause, .. } => {
            eprintln!("{}", outcome.to_string().yellow());
            Err(cause.clone().into())
        }
        WorkflowOutcome::Failed { ref cause, .. } => {
            eprintln!("{}", outcome.to_string().red());
            Err(cause.clone().into())
        }
    }
}

/// Asks a yes/no question on the terminal; defaults to no.
///
/// Returns `false` without asking when stdin is not a terminal.
pub async fn confirm(question: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} ", format!("{question} [y/N]:").yellow());
    io::stdout().flush()?;

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut response = String::new();
    reader.read_line(&mut response).await?;
    Ok(matches!(response.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Fails unless the operator confirmed `operation`.
pub async fn require_confirmation(operation: &str, assume_yes: bool) -> Result<()> {
    if assume_yes || confirm(&format!("Really {operation}?")).await? {
        return Ok(());
    }
    Err(RelayError::ConfirmationRequired {
        operation: operation.to_string(),
    }
    .into())
}
