//! `relayctl install`

use super::CliConfig;
use super::common::{ARCHITECTURES, host_orchestrator, report_outcome};
use crate::config::{ServiceConfig, pick_mask_domain, random_seed};
use crate::constants::DEFAULT_PORT;
use crate::orchestrator::InstallRequest;
use crate::utils::platform::ensure_root;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::debug;

/// Install the relay service, or reinstall it with new parameters.
///
/// ```bash
/// relayctl install --credential s3cret
/// relayctl install --port 9443 --credential s3cret --mask-domain www.apple.com
/// RELAY_CREDENTIAL=s3cret relayctl install --version v1.2.0
/// ```
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Port the relay listens on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Shared secret clients authenticate with
    #[arg(long, env = "RELAY_CREDENTIAL", hide_env_values = true)]
    pub credential: String,

    /// Domain presented in the TLS handshake; picked at random when omitted
    #[arg(long)]
    pub mask_domain: Option<String>,

    /// Release tag to install instead of the latest
    #[arg(long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Release architecture instead of the detected one
    #[arg(long, value_parser = ARCHITECTURES)]
    pub arch: Option<String>,
}

impl InstallCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        ensure_root()?;

        let mask_domain = match self.mask_domain {
            Some(domain) => domain,
            None => {
                let domain = pick_mask_domain(random_seed()).to_string();
                debug!("Picked mask domain {domain}");
                domain
            }
        };
        let service_config = ServiceConfig::new(self.port, self.credential, Some(mask_domain))?;

        let orchestrator = host_orchestrator(config, self.arch.as_deref()).await?;
        let outcome = orchestrator
            .install(InstallRequest {
                config: service_config,
                version: self.version,
            })
            .await?;
        let committed = outcome.is_success();
        report_outcome(outcome)?;

        if committed {
            println!(
                "Run {} to print client connection details",
                "relayctl export".cyan()
            );
        }
        Ok(())
    }
}
