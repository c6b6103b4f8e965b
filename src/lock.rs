//! Host-wide mutual exclusion for mutating workflows.
//!
//! Install, upgrade, restart, stop and uninstall each hold an
//! [`InstanceLock`] for their whole run so two invocations never race on the
//! binary, the unit or the config file. The lock is an advisory exclusive
//! `flock` taken through [`fs4`] and released when the guard is dropped
//! (the kernel also releases it if the process dies).
//!
//! Acquisition never waits: if another process holds the lock the call
//! fails with [`RelayError::LockContention`]. If the filesystem does not
//! support locking at all, the guard degrades to a no-op with a warning.
//!
//! The lock file itself is left in place; deleting it on release would let a
//! third process lock a fresh inode while a second one still holds the old.

use crate::core::RelayError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Guard holding the host lock.
#[derive(Debug)]
pub struct InstanceLock {
    /// `None` when running degraded without a lock.
    file: Option<File>,
    path: PathBuf,
}

impl InstanceLock {
    /// Tries once to take the lock at `path`.
    pub async fn acquire(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(path))
            .await
            .context("Lock acquisition task panicked")?
    }

    fn acquire_blocking(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!(lock = %path.display(), "Instance lock acquired");
                Ok(Self {
                    file: Some(file),
                    path,
                })
            }
            Ok(false) => Err(RelayError::LockContention {
                path: path.display().to_string(),
            }
            .into()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(RelayError::LockContention {
                path: path.display().to_string(),
            }
            .into()),
            Err(e) if locking_unsupported(&e) => {
                warn!(
                    lock = %path.display(),
                    error = %e,
                    "File locking is not supported here; continuing without mutual exclusion"
                );
                Ok(Self::degraded(path))
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to lock {}", path.display())),
        }
    }

    /// Guard that serializes nothing.
    #[must_use]
    pub fn degraded(path: PathBuf) -> Self {
        Self {
            file: None,
            path,
        }
    }

    /// Whether this guard actually holds an OS lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!(lock = %self.path.display(), "Instance lock released");
        }
    }
}

fn locking_unsupported(e: &io::Error) -> bool {
    #[cfg(unix)]
    let unsupported_errno = matches!(e.raw_os_error(), Some(libc::ENOLCK | libc::EOPNOTSUPP));
    #[cfg(not(unix))]
    let unsupported_errno = false;
    e.kind() == io::ErrorKind::Unsupported || unsupported_errno
}
