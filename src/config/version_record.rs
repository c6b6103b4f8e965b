//! InstalledVersion: the commit record of every deploy workflow.
//!
//! The file holds a single version-tag line. It is written only after a
//! health check passed, so its absence means "not installed, or the install
//! never completed".

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct VersionRecord {
    path: PathBuf,
}

impl VersionRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the recorded tag, `None` when the file is missing or blank.
    pub async fn read(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let tag = content.lines().next().unwrap_or_default().trim().to_string();
                Ok((!tag.is_empty()).then_some(tag))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read installed version from {}", self.path.display())
            }),
        }
    }

    /// Records `tag` as the committed version.
    pub async fn write(&self, tag: &str) -> Result<()> {
        let path = self.path.clone();
        let content = format!("{}\n", crate::config::store::sanitize(tag));
        tokio::task::spawn_blocking(move || crate::utils::fs::atomic_write(&path, content.as_bytes()))
            .await
            .context("Version record write task panicked")?
    }

    pub async fn clear(&self) -> Result<()> {
        crate::utils::fs::remove_if_exists(&self.path).await
    }
}
