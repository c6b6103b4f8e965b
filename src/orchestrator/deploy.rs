//! Install, upgrade and manual rollback.

use super::{Orchestrator, Phase, WorkflowOutcome};
use crate::config::ServiceConfig;
use crate::core::RelayError;
use crate::health::PortProbe;
use crate::installer::RollbackOutcome;
use crate::lock::InstanceLock;
use crate::release::{ReleaseSource, compare_tags};
use crate::service::ServiceController;
use anyhow::{Context, Result};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Parameters of an install.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub config: ServiceConfig,
    /// Explicit release tag; `None` installs the latest release.
    pub version: Option<String>,
}

/// Parameters of an upgrade.
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    /// Explicit release tag; `None` upgrades to the latest release.
    pub version: Option<String>,
    /// Reinstall even when the target equals the installed version.
    pub force: bool,
}

impl<R: ReleaseSource, S: ServiceController, P: PortProbe> Orchestrator<R, S, P> {
    /// Installs (or reinstalls) the service with `request.config`.
    ///
    /// A host with a recorded installed version is a reinstall: the new
    /// artifact is staged first and the running service is stopped only
    /// after staging succeeded. Errors are pre-start aborts that left the
    /// host as it was; post-start failures are reported in the outcome.
    pub async fn install(&self, request: InstallRequest) -> Result<WorkflowOutcome> {
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;
        request.config.validate()?;

        let tag = self.resolve_tag(request.version.as_deref()).await?;
        let previous = self.version.read().await?;
        match &previous {
            Some(prev) => info!("Reinstalling: {prev} -> {tag}"),
            None => info!("Installing {tag}"),
        }

        self.enter(Phase::Installing);
        let staged = self
            .installer
            .stage(&tag)
            .await
            .with_context(|| format!("Failed to stage {tag}"))?;

        let mut txn = self.begin(previous).await?;

        if txn.previous_tag.is_some() && txn.was_active {
            debug!("Stopping the running service before replacing it");
            if let Err(e) = self.service.stop().await {
                self.abort(&txn).await;
                return Err(e.context("Failed to stop the running service"));
            }
        }

        match self.installer.commit(staged, txn.previous_tag.as_deref()).await {
            Ok(backup) => txn.committed = Some(backup),
            Err(e) => {
                self.abort(&txn).await;
                return Err(e);
            }
        }

        if let Err(e) = self.configure(&request.config).await {
            self.abort(&txn).await;
            return Err(e);
        }

        if let Some(outcome) = self.start_and_verify(&txn, &tag, &request.config).await {
            return Ok(outcome);
        }
        Ok(self.finish(&txn, &tag).await)
    }

    /// Upgrades an existing installation.
    ///
    /// The binary is swapped while the service keeps running and the service
    /// is restarted afterwards. Rollback behaves as for [`install`](Self::install).
    pub async fn upgrade(&self, request: UpgradeRequest) -> Result<WorkflowOutcome> {
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;

        let installed = self.version.read().await?.ok_or(RelayError::NotInstalled)?;
        let config = self
            .config
            .read()
            .await
            .context("An installation exists but its configuration cannot be read")?;

        let tag = self.resolve_tag(request.version.as_deref()).await?;
        let ordering = compare_tags(&tag, &installed);
        let current = match request.version {
            Some(_) => ordering == Ordering::Equal,
            None => ordering != Ordering::Greater,
        };
        if current && !request.force {
            info!("{installed} is current (latest is {tag})");
            return Ok(WorkflowOutcome::UpToDate {
                tag: installed,
            });
        }
        info!("Upgrading {installed} -> {tag}");

        self.enter(Phase::Installing);
        let staged = self
            .installer
            .stage(&tag)
            .await
            .with_context(|| format!("Failed to stage {tag}"))?;

        let mut txn = self.begin(Some(installed)).await?;
        match self.installer.commit(staged, txn.previous_tag.as_deref()).await {
            Ok(backup) => txn.committed = Some(backup),
            Err(e) => {
                self.abort(&txn).await;
                return Err(e);
            }
        }

        if let Err(e) = self.configure(&config).await {
            self.abort(&txn).await;
            return Err(e);
        }

        if let Some(outcome) = self.start_and_verify(&txn, &tag, &config).await {
            return Ok(outcome);
        }
        Ok(self.finish(&txn, &tag).await)
    }

    /// Restores the newest backup, as `upgrade --rollback` does.
    ///
    /// The binary being replaced is backed up first, so a restored backup
    /// that turns out unhealthy is itself rolled back.
    pub async fn rollback_to_latest_backup(&self) -> Result<WorkflowOutcome> {
        let _lock = InstanceLock::acquire(&self.layout.lock).await?;

        let installed = self.version.read().await?;
        let config = self.config.read().await.map_err(|e| {
            warn!("No readable configuration: {e:#}");
            RelayError::NotInstalled
        })?;

        let Some(target) = self.backups().latest_backup().await? else {
            return Err(RelayError::Other {
                message: "No backup is available to roll back to".to_string(),
            }
            .into());
        };
        let label = target.tag.clone().unwrap_or_else(|| "the latest backup".to_string());
        info!("Rolling back to {label} from {}", target.path.display());

        let mut txn = self.begin(installed).await?;
        let backup_of_current = self.backups().backup_current(txn.previous_tag.as_deref()).await?;

        match self.backups().rollback(Some(&target.path)).await {
            Ok(RollbackOutcome::Restored(_)) => txn.committed = Some(backup_of_current),
            Ok(RollbackOutcome::NoBackupAvailable) => {
                return Err(RelayError::Other {
                    message: format!("Backup {} disappeared", target.path.display()),
                }
                .into());
            }
            Err(e) => {
                self.abort(&txn).await;
                return Err(e);
            }
        }

        if let Some(outcome) = self.start_and_verify(&txn, &label, &config).await {
            return Ok(outcome);
        }

        match &target.tag {
            Some(tag) => Ok(self.finish(&txn, tag).await),
            None => {
                warn!("The backup does not name its version; the installed version record is unchanged");
                Ok(WorkflowOutcome::Committed {
                    tag: label,
                })
            }
        }
    }

    async fn configure(&self, config: &ServiceConfig) -> Result<()> {
        self.enter(Phase::ConfiguringService);
        self.config.write(config).await?;
        self.service.write_definition(config).await?;
        self.service.enable().await
    }
}
