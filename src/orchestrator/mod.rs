//! Workflow orchestration.
//!
//! The [`Orchestrator`] owns every component and runs exactly one workflow
//! per invocation. Mutating workflows (install, upgrade, manual rollback,
//! restart, stop, uninstall) take the host [`InstanceLock`] first and hold
//! it until they return; read-only workflows (status, update check, export)
//! never lock.
//!
//! # Deployment state machine
//!
//! ```text
//! ResolvingVersion -> Installing -> ConfiguringService -> Starting -> HealthChecking
//!                                                                        |
//!                                            Committed | RolledBack | Failed
//! ```
//!
//! Failures before `Starting` are aborts: everything the workflow touched is
//! put back (binary from its backup, configuration from its snapshot, the
//! unit removed if it did not exist, the service started again if it was
//! running) and the error is returned. Failures from `Starting` on go
//! through recovery: the previous binary and configuration are restored, the
//! service is restarted and checked again. A passing re-check ends in
//! [`WorkflowOutcome::RolledBack`]; anything else stops the service and ends
//! in [`WorkflowOutcome::Failed`]. Only [`WorkflowOutcome::Committed`] (and
//! [`WorkflowOutcome::UpToDate`]) count as success.
//!
//! [`InstanceLock`]: crate::lock::InstanceLock

mod deploy;
mod maintenance;

pub use deploy::{InstallRequest, UpgradeRequest};
pub use maintenance::{StatusReport, UpdateCheck};

use crate::config::{ConfigSnapshot, ConfigStore, HostLayout, ServiceConfig, Settings, VersionRecord};
use crate::core::RelayError;
use crate::health::{HealthChecker, PortProbe};
use crate::installer::{AtomicInstaller, BackupManager, RollbackOutcome};
use crate::release::{ReleaseSource, is_release_tag};
use crate::service::ServiceController;
use crate::utils::fs::remove_if_exists;
use anyhow::Result;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Steps of a deployment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ResolvingVersion,
    Installing,
    ConfiguringService,
    Starting,
    HealthChecking,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolvingVersion => "resolving version",
            Self::Installing => "installing",
            Self::ConfiguringService => "configuring service",
            Self::Starting => "starting",
            Self::HealthChecking => "health checking",
        };
        f.write_str(name)
    }
}

/// How a deployment workflow ended.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// The new version is running and healthy.
    Committed {
        tag: String,
    },
    /// The installed version is already current; nothing changed.
    UpToDate {
        tag: String,
    },
    /// The new version failed after it was started; the previous deployment
    /// was restored and is healthy.
    RolledBack {
        attempted: String,
        restored: Option<String>,
        cause: RelayError,
    },
    /// The new version failed and the previous deployment could not be
    /// brought back. The service is stopped.
    Failed {
        attempted: String,
        cause: RelayError,
        recovery: String,
    },
}

impl WorkflowOutcome {
    /// Whether the workflow achieved what it was asked to.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::UpToDate { .. })
    }

    /// The error to exit with, for unsuccessful outcomes.
    #[must_use]
    pub fn cause(&self) -> Option<&RelayError> {
        match self {
            Self::RolledBack { cause, .. } | Self::Failed { cause, .. } => Some(cause),
            Self::Committed { .. } | Self::UpToDate { .. } => None,
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed {
                tag,
            } => write!(f, "{tag} installed and healthy"),
            Self::UpToDate {
                tag,
            } => write!(f, "{tag} is already installed"),
            Self::RolledBack {
                attempted,
                restored,
                cause,
            } => write!(
                f,
                "{attempted} did not take effect ({cause}); rolled back to {}",
                restored.as_deref().unwrap_or("the previous binary")
            ),
            Self::Failed {
                attempted,
                cause,
                recovery,
            } => write!(f, "{attempted} failed ({cause}) and {recovery}; the service is stopped"),
        }
    }
}

/// What a deployment touched, for putting it back.
#[derive(Debug)]
struct Transaction {
    previous_tag: Option<String>,
    config_snapshot: ConfigSnapshot,
    had_definition: bool,
    was_active: bool,
    /// `Some` once the binary was replaced; the inner value is the backup.
    committed: Option<Option<PathBuf>>,
}

/// Runs workflows against one host.
pub struct Orchestrator<R, S, P> {
    settings: Settings,
    layout: HostLayout,
    installer: AtomicInstaller<R>,
    service: S,
    health: HealthChecker<P>,
    config: ConfigStore,
    version: VersionRecord,
}

impl<R: ReleaseSource, S: ServiceController, P: PortProbe> Orchestrator<R, S, P> {
    pub fn new(
        settings: Settings,
        layout: HostLayout,
        source: R,
        service: S,
        probe: P,
        arch: Option<String>,
    ) -> Self {
        let backups = BackupManager::new(layout.binary.clone(), layout.backup_dir.clone());
        let installer = AtomicInstaller::new(
            source,
            layout.binary.clone(),
            settings.release.binary_name.clone(),
            arch,
            backups,
        );
        let health = HealthChecker::new(probe, &settings.health);

        Self {
            config: ConfigStore::new(layout.config.clone()),
            version: VersionRecord::new(layout.installed_version.clone()),
            settings,
            layout,
            installer,
            service,
            health,
        }
    }

    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    pub fn version_record(&self) -> &VersionRecord {
        &self.version
    }

    pub fn backups(&self) -> &BackupManager {
        self.installer.backups()
    }

    fn enter(&self, phase: Phase) {
        info!("==> {phase}");
    }

    /// Validates an explicit tag or asks the release source for the latest.
    async fn resolve_tag(&self, requested: Option<&str>) -> Result<String> {
        self.enter(Phase::ResolvingVersion);
        match requested.map(str::trim) {
            Some(tag) if is_release_tag(tag) => Ok(tag.to_string()),
            Some(tag) => {
                Err(RelayError::invalid_config("version", format!("'{tag}' is not a release tag"))
                    .into())
            }
            None => self.installer.source().resolve_latest().await,
        }
    }

    async fn begin(&self, previous_tag: Option<String>) -> Result<Transaction> {
        Ok(Transaction {
            previous_tag,
            config_snapshot: self.config.snapshot().await?,
            had_definition: self.service.has_definition().await?,
            was_active: self.service.is_active().await.unwrap_or(false),
            committed: None,
        })
    }

    /// Puts back everything `txn` touched after a failure before `Starting`.
    async fn abort(&self, txn: &Transaction) {
        warn!("Aborting; restoring the previous state");

        if let Some(backup) = &txn.committed {
            match backup {
                Some(_) => {
                    if let Err(e) = self.backups().rollback(backup.as_deref()).await {
                        warn!("Could not restore the previous binary: {e:#}");
                    }
                }
                None => {
                    if let Err(e) = remove_if_exists(&self.layout.binary).await {
                        warn!("Could not remove the new binary: {e:#}");
                    }
                }
            }
        }

        if let Err(e) = self.config.restore(&txn.config_snapshot).await {
            warn!("Could not restore the service configuration: {e:#}");
        }

        if !txn.had_definition
            && let Err(e) = self.service.remove_definition().await
        {
            warn!("Could not remove the service definition: {e:#}");
        }

        if txn.was_active
            && !self.service.is_active().await.unwrap_or(false)
            && let Err(e) = self.service.start().await
        {
            warn!("Could not start the previous deployment: {e:#}");
        }
    }

    /// Recovery after a failure at or after `Starting`.
    async fn recover(
        &self,
        txn: &Transaction,
        attempted: &str,
        cause: RelayError,
    ) -> WorkflowOutcome {
        warn!("{attempted} failed: {cause}; rolling back");

        let backup = txn.committed.clone().flatten();
        let restored = match self.backups().rollback(backup.as_deref()).await {
            Ok(RollbackOutcome::Restored(_)) => true,
            Ok(RollbackOutcome::NoBackupAvailable) => false,
            Err(e) => {
                warn!("Binary rollback failed: {e:#}");
                let recovery = format!("the binary rollback failed: {e:#}");
                return self.give_up(txn, attempted, cause, recovery).await;
            }
        };

        if let Err(e) = self.config.restore(&txn.config_snapshot).await {
            warn!("Could not restore the service configuration: {e:#}");
        }

        if !restored {
            let recovery = "there is no previous deployment to roll back to".to_string();
            return self.give_up(txn, attempted, cause, recovery).await;
        }

        let config = match self.config.read().await {
            Ok(config) => config,
            Err(e) => {
                let recovery = format!("the restored configuration is unreadable: {e:#}");
                return self.give_up(txn, attempted, cause, recovery).await;
            }
        };

        if let Err(e) = self.service.restart().await {
            let recovery = format!("the previous version did not start: {e:#}");
            return self.give_up(txn, attempted, cause, recovery).await;
        }

        match self.health.check(&self.service, &config).await {
            Ok(()) => {
                warn!(
                    "Rolled back to {}",
                    txn.previous_tag.as_deref().unwrap_or("the previous binary")
                );
                WorkflowOutcome::RolledBack {
                    attempted: attempted.to_string(),
                    restored: txn.previous_tag.clone(),
                    cause,
                }
            }
            Err(failure) => {
                let recovery = format!("the previous version is unhealthy too: {failure}");
                self.give_up(txn, attempted, cause, recovery).await
            }
        }
    }

    /// Stops the service and reports [`WorkflowOutcome::Failed`]. On a host
    /// that had no deployment before, the new one is removed again.
    async fn give_up(
        &self,
        txn: &Transaction,
        attempted: &str,
        cause: RelayError,
        recovery: String,
    ) -> WorkflowOutcome {
        if let Err(e) = self.service.stop().await {
            warn!("Could not stop the service: {e:#}");
        }

        if txn.previous_tag.is_none() && !txn.had_definition {
            if let Err(e) = self.service.disable().await {
                warn!("Could not disable the service: {e:#}");
            }
            if let Err(e) = self.service.remove_definition().await {
                warn!("Could not remove the service definition: {e:#}");
            }
            if matches!(txn.committed, Some(None))
                && let Err(e) = remove_if_exists(&self.layout.binary).await
            {
                warn!("Could not remove the new binary: {e:#}");
            }
        }

        WorkflowOutcome::Failed {
            attempted: attempted.to_string(),
            cause,
            recovery,
        }
    }

    /// Starts the service and checks it; failures go through recovery.
    async fn start_and_verify(
        &self,
        txn: &Transaction,
        tag: &str,
        config: &ServiceConfig,
    ) -> Option<WorkflowOutcome> {
        self.enter(Phase::Starting);
        if let Err(e) = self.service.restart().await {
            let cause = crate::core::find_relay_error(&e).cloned().unwrap_or_else(|| {
                RelayError::ServiceStart {
                    reason: format!("{e:#}"),
                }
            });
            return Some(self.recover(txn, tag, cause).await);
        }

        self.enter(Phase::HealthChecking);
        if let Err(failure) = self.health.check(&self.service, config).await {
            return Some(self.recover(txn, tag, RelayError::HealthCheck(failure)).await);
        }
        None
    }

    /// Records `tag` and trims old backups. A version record that cannot
    /// be written goes through recovery like a failed start.
    async fn finish(&self, txn: &Transaction, tag: &str) -> WorkflowOutcome {
        if let Err(e) = self.version.write(tag).await {
            let cause = RelayError::install(&self.layout.installed_version, format!("{e:#}"));
            return self.recover(txn, tag, cause).await;
        }
        if let Err(e) = self.backups().prune(self.settings.backup.retention).await {
            warn!("Could not prune old backups: {e:#}");
        }
        info!("{tag} committed");
        WorkflowOutcome::Committed {
            tag: tag.to_string(),
        }
    }
}
