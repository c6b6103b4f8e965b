//! Atomic installation of the managed binary.
//!
//! Installation is split into two halves so a caller can put work between
//! them (a reinstall stops the service only after the new artifact is known
//! to be good):
//!
//! 1. **[`AtomicInstaller::stage`]** downloads the archive into a private
//!    scratch directory, extracts it, checks that it contains exactly one
//!    executable with the expected name and marks it `0755`. The host is not
//!    touched; every failure here is a plain abort and the scratch directory
//!    is removed when the [`StagedArtifact`] (or the error path) drops it.
//! 2. **[`AtomicInstaller::commit`]** backs up the current binary, then
//!    copies the staged executable next to the target, syncs it and renames
//!    it over the target.
//!
//! The installer never reads or writes the service configuration or the
//! unit file.
//!
//! # Modules
//!
//! - [`backup`] - timestamped backups, rollback and retention
//! - [`extract`] - zip extraction and the single-executable layout check

pub mod backup;
pub mod extract;

pub use backup::{BackupEntry, BackupManager, RollbackOutcome};

use crate::core::RelayError;
use crate::release::ReleaseSource;
use crate::utils::fs::place_executable;
use crate::utils::platform::host_arch;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// An extracted, executable artifact waiting to be committed.
#[derive(Debug)]
pub struct StagedArtifact {
    _scratch: TempDir,
    executable: PathBuf,
    tag: String,
}

impl StagedArtifact {
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

/// Fetches, verifies the layout of, and places the managed binary.
#[derive(Debug)]
pub struct AtomicInstaller<R> {
    source: R,
    binary: PathBuf,
    binary_name: String,
    /// `None` detects the host architecture when staging.
    arch: Option<String>,
    backups: BackupManager,
}

impl<R: ReleaseSource> AtomicInstaller<R> {
    pub fn new(
        source: R,
        binary: PathBuf,
        binary_name: impl Into<String>,
        arch: Option<String>,
        backups: BackupManager,
    ) -> Self {
        Self {
            source,
            binary,
            binary_name: binary_name.into(),
            arch,
            backups,
        }
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Downloads and unpacks `tag` without touching the host.
    pub async fn stage(&self, tag: &str) -> Result<StagedArtifact> {
        let scratch = tempfile::Builder::new()
            .prefix("relayctl-stage-")
            .tempdir()
            .context("Failed to create scratch directory")?;

        let arch = match &self.arch {
            Some(arch) => arch.clone(),
            None => host_arch()?.to_string(),
        };
        let archive = self.source.fetch(tag, &arch, scratch.path()).await?;
        debug!("Fetched {} for {}", archive.display(), tag);

        let extract_dir = scratch.path().join("extract");
        let binary_name = self.binary_name.clone();
        let executable = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            extract::extract_archive(&archive, &extract_dir)?;
            let executable = extract::locate_executable(&extract_dir, &binary_name)?;
            mark_executable(&executable)?;
            Ok(executable)
        })
        .await
        .context("Extraction task panicked")??;

        info!("Staged {} {}", self.binary_name, tag);
        Ok(StagedArtifact {
            _scratch: scratch,
            executable,
            tag: tag.to_string(),
        })
    }

    /// Backs up the current binary and atomically replaces it.
    ///
    /// `current_tag` is the release of the binary being replaced, used to
    /// label the backup. Returns the backup path, or `None` when nothing was
    /// installed before (no rollback is possible in that case).
    pub async fn commit(
        &self,
        staged: StagedArtifact,
        current_tag: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let backup = self.backups.backup_current(current_tag).await?;

        let source = staged.executable.clone();
        let target = self.binary.clone();
        tokio::task::spawn_blocking(move || place_executable(&source, &target))
            .await
            .context("Install task panicked")?
            .map_err(|e| RelayError::install(&self.binary, format!("{e:#}")))?;

        info!("Installed {} {} at {}", self.binary_name, staged.tag, self.binary.display());
        Ok(backup)
    }

    /// [`stage`](Self::stage) followed by [`commit`](Self::commit).
    pub async fn install_atomically(
        &self,
        tag: &str,
        current_tag: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let staged = self.stage(tag).await?;
        self.commit(staged, current_tag).await
    }
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
