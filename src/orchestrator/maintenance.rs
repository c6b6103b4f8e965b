//! Restart, stop, uninstall and the read-only workflows.

use super::Orchestrator;
use crate::core::RelayError;
use crate::export::{Descriptor, fetch_public_ip, render_descriptors};
use crate::health::PortProbe;
use crate::lock::InstanceLock;
use crate::release::{ReleaseSource, compare_tags};
use crate::service::ServiceController;
use crate::utils::fs::{remove_dir_if_exists, remove_if_exists};
use crate::utils::platform::host_name;
use anyhow::{Context, Result};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Snapshot of the host for `relayctl status`.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub installed: Option<String>,
    pub active: bool,
    pub port: Option<u16>,
    /// `None` when there is no port to probe or the probe is unavailable.
    pub listening: Option<bool>,
    pub definition_present: bool,
    /// Supervisor diagnostic text.
    pub detail: String,
    pub backups: usize,
    /// Why the stored configuration could not be read, if it exists.
    pub config_error: Option<String>,
}

/// Result of `relayctl upgrade --check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub installed: Option<String>,
    pub latest: String,
    pub update_available: bool,
}

impl<R: ReleaseSource, S: ServiceController, P: PortProbe> Orchestrator<R, S, P> {
    /// Restarts the service and health-checks it.
    pub async fn restart(&self) -> Result<()> {
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;
        let config = self.config.read().await?;

        self.service.restart().await?;
        self.health.check(&self.service, &config).await.map_err(RelayError::HealthCheck)?;
        info!("Service restarted and healthy on port {}", config.port);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;
        self.service.stop().await?;
        info!("Service stopped");
        Ok(())
    }

    /// Removes the deployment: unit, configuration, version record, binary
    /// and backups. Refuses unless `confirmed`.
    pub async fn uninstall(&self, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(RelayError::ConfirmationRequired {
                operation: "uninstall".to_string(),
            }
            .into());
        }
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;

        // The unit may already be gone; stopping and disabling are best effort.
        if let Err(e) = self.service.stop().await {
            warn!("Could not stop the service: {e:#}");
        }
        if let Err(e) = self.service.disable().await {
            warn!("Could not disable the service: {e:#}");
        }
        self.service.remove_definition().await?;
        self.config.remove().await?;
        self.version.clear().await?;
        if let Err(e) = self.service.reset_failed().await {
            debug!("reset-failed: {e:#}");
        }

        remove_if_exists(&self.layout.binary).await?;
        remove_dir_if_exists(&self.layout.backup_dir).await?;
        info!("Uninstalled");
        Ok(())
    }

    /// Gathers what an operator wants to see at a glance. Never locks.
    pub async fn status(&self) -> Result<StatusReport> {
        let mut report = StatusReport {
            installed: self.version.read().await?,
            active: self.service.is_active().await.unwrap_or(false),
            definition_present: self.service.has_definition().await.unwrap_or(false),
            backups: self.backups().list_backups().await.map(|b| b.len()).unwrap_or(0),
            ..StatusReport::default()
        };

        if self.config.exists() {
            match self.config.read().await {
                Ok(config) => report.port = Some(config.port),
                Err(e) => report.config_error = Some(format!("{e:#}")),
            }
        }

        if let Some(port) = report.port {
            report.listening = match self.health.probe().is_listening(port).await {
                Ok(listening) => Some(listening),
                Err(failure) => {
                    debug!("Port probe unavailable: {failure}");
                    None
                }
            };
        }

        report.detail = match self.service.status().await {
            Ok(text) => text,
            Err(e) => format!("{e:#}"),
        };
        Ok(report)
    }

    /// Compares the installed version with the latest release.
    pub async fn check_update(&self) -> Result<UpdateCheck> {
        let installed = self.version.read().await?;
        let latest = self.installer.source().resolve_latest().await?;
        let update_available = match &installed {
            Some(installed) => compare_tags(&latest, installed) == Ordering::Greater,
            None => true,
        };
        Ok(UpdateCheck {
            installed,
            latest,
            update_available,
        })
    }

    /// Connection descriptors for the stored configuration.
    ///
    /// `public_ip` overrides the lookup against `export.public_ip_url`.
    pub async fn export(&self, public_ip: Option<&str>) -> Result<Vec<Descriptor>> {
        let config = self
            .config
            .read()
            .await
            .context("No service configuration to export; run install first")?;

        let ip = match public_ip {
            Some(ip) => ip.to_string(),
            None => fetch_public_ip(&self.settings.export, &self.settings.network).await?,
        };
        render_descriptors(&config, &ip, &host_name(), &self.settings.export)
    }
}
