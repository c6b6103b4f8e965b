//! File system helpers.
//!
//! - [`atomic`]: temp-and-rename writes and executable placement
//! - [`remove_if_exists`]/[`remove_dir_if_exists`]: idempotent deletes used by
//!   uninstall and snapshot restore

pub mod atomic;

pub use atomic::{atomic_write, place_executable};

use anyhow::{Context, Result};
use std::path::Path;

/// Removes a file; a missing file is not an error.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Removes a directory tree; a missing directory is not an error.
pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
