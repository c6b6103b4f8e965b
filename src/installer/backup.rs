use crate::core::RelayError;
use crate::release::is_release_tag;
use crate::utils::fs::place_executable;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";
const UNKNOWN_TAG: &str = "unknown";

/// Result of a rollback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The backup at this path was placed over the managed binary.
    Restored(PathBuf),
    /// There was nothing to restore; the managed binary is untouched.
    NoBackupAvailable,
}

/// One backup file in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    /// Release tag of the binary that was backed up, when it was known.
    pub tag: Option<String>,
    pub created: NaiveDateTime,
}

/// Keeps timestamped copies of the managed binary and restores them.
///
/// Backups are named `<binary>.<tag-or-unknown>.<UTC timestamp>.bak` and
/// live in their own directory, so a restore never depends on the state of
/// the install directory. A backup is taken immediately before the binary
/// is overwritten and is never modified afterwards.
///
/// # Examples
///
/// ```rust,no_run
/// use relayctl::installer::{BackupManager, RollbackOutcome};
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let backups = BackupManager::new(
///     PathBuf::from("/usr/local/bin/relay-server"),
///     PathBuf::from("/var/lib/relayctl/backups"),
/// );
///
/// let backup = backups.backup_current(Some("v1.2.0")).await?;
/// // ... replace the binary, discover it is broken ...
/// match backups.rollback(backup.as_deref()).await? {
///     RollbackOutcome::Restored(path) => println!("restored {}", path.display()),
///     RollbackOutcome::NoBackupAvailable => println!("nothing to restore"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    binary: PathBuf,
    backup_dir: PathBuf,
    binary_name: String,
}

impl BackupManager {
    pub fn new(binary: PathBuf, backup_dir: PathBuf) -> Self {
        let binary_name = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "binary".to_string());
        Self {
            binary,
            backup_dir,
            binary_name,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copies the current binary into a new backup.
    ///
    /// Returns `None` when there is no binary to back up. `tag` is the
    /// release the current binary belongs to, if known.
    pub async fn backup_current(&self, tag: Option<&str>) -> Result<Option<PathBuf>> {
        if !fs::try_exists(&self.binary).await.unwrap_or(false) {
            debug!("No existing binary at {}, nothing to back up", self.binary.display());
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| RelayError::install(&self.backup_dir, e))?;

        let tag = tag.filter(|t| is_release_tag(t)).unwrap_or(UNKNOWN_TAG);
        let mut stamp = Utc::now().naive_utc();
        let mut backup = self.backup_path(tag, &stamp);
        while fs::try_exists(&backup).await.unwrap_or(false) {
            stamp += chrono::Duration::milliseconds(1);
            backup = self.backup_path(tag, &stamp);
        }

        fs::copy(&self.binary, &backup)
            .await
            .map_err(|e| RelayError::install(&backup, e))?;

        info!("Backed up {} to {}", self.binary.display(), backup.display());
        Ok(Some(backup))
    }

    fn backup_path(&self, tag: &str, stamp: &NaiveDateTime) -> PathBuf {
        self.backup_dir
            .join(format!("{}.{}.{}.bak", self.binary_name, tag, stamp.format(TIMESTAMP_FORMAT)))
    }

    /// Places `backup` over the managed binary.
    ///
    /// `None` or a path that no longer exists yields
    /// [`RollbackOutcome::NoBackupAvailable`] and touches nothing.
    pub async fn rollback(&self, backup: Option<&Path>) -> Result<RollbackOutcome> {
        let Some(backup) = backup else {
            warn!("Rollback requested but no backup was taken");
            return Ok(RollbackOutcome::NoBackupAvailable);
        };
        if !fs::try_exists(backup).await.unwrap_or(false) {
            warn!("Backup {} is missing, nothing to restore", backup.display());
            return Ok(RollbackOutcome::NoBackupAvailable);
        }

        let source = backup.to_path_buf();
        let target = self.binary.clone();
        tokio::task::spawn_blocking(move || place_executable(&source, &target))
            .await
            .context("Restore task panicked")?
            .map_err(|e| RelayError::install(&self.binary, format!("{e:#}")))?;

        warn!("Restored {} from {}", self.binary.display(), backup.display());
        Ok(RollbackOutcome::Restored(backup.to_path_buf()))
    }

    /// All backups of this binary, oldest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(&self.backup_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read backup directory {}", self.backup_dir.display())
                });
            }
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some((tag, created)) = parse_backup_name(&name.to_string_lossy(), &self.binary_name)
            else {
                continue;
            };
            entries.push(BackupEntry {
                path: entry.path(),
                tag,
                created,
            });
        }

        entries.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    /// The most recent backup, if any.
    pub async fn latest_backup(&self) -> Result<Option<BackupEntry>> {
        Ok(self.list_backups().await?.pop())
    }

    /// Deletes all but the newest `retention` backups. Returns how many
    /// were removed.
    pub async fn prune(&self, retention: usize) -> Result<usize> {
        let entries = self.list_backups().await?;
        let excess = entries.len().saturating_sub(retention);

        for entry in &entries[..excess] {
            fs::remove_file(&entry.path)
                .await
                .with_context(|| format!("Failed to remove old backup {}", entry.path.display()))?;
            debug!("Pruned backup {}", entry.path.display());
        }

        if excess > 0 {
            info!("Pruned {excess} old backup(s), keeping {retention}");
        }
        Ok(excess)
    }
}

/// Splits `<binary>.<tag>.<timestamp>.bak` into its tag and timestamp.
fn parse_backup_name(name: &str, binary_name: &str) -> Option<(Option<String>, NaiveDateTime)> {
    let rest = name.strip_prefix(binary_name)?.strip_prefix('.')?.strip_suffix(".bak")?;
    let (tag, stamp) = rest.rsplit_once('.')?;
    let created = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    let tag = (tag != UNKNOWN_TAG).then(|| tag.to_string());
    Some((tag, created))
}
