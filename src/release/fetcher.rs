//! Release artifact download.
//!
//! The artifact URL is rendered from `release.asset_url_template`; each
//! attempt is bounded by a connect timeout and a total timeout, and failed
//! attempts are retried on a fixed interval. The body is streamed into an
//! unpredictable temp file inside the caller's directory so a partial
//! download never lands at a guessable path.

use crate::config::settings::{NetworkSettings, ReleaseSettings};
use crate::core::RelayError;
use crate::utils::progress::download_bar;
use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

/// Renders an asset URL template.
///
/// Placeholders: `{web_base}`, `{repo}`, `{tag}`, `{version}` (tag without a
/// leading `v`), `{arch}`, `{binary}`.
pub fn asset_url(release: &ReleaseSettings, tag: &str, arch: &str) -> String {
    let version = tag.strip_prefix('v').unwrap_or(tag);
    release
        .asset_url_template
        .replace("{web_base}", release.web_base.trim_end_matches('/'))
        .replace("{repo}", &release.repo)
        .replace("{tag}", tag)
        .replace("{version}", version)
        .replace("{arch}", arch)
        .replace("{binary}", &release.binary_name)
}

/// Downloads release archives.
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    release: ReleaseSettings,
    retries: usize,
    backoff_ms: u64,
    attempt_timeout: Duration,
}

impl ArtifactFetcher {
    pub fn new(release: &ReleaseSettings, network: &NetworkSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relayctl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(network.connect_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            release: release.clone(),
            retries: network.download_retries,
            backoff_ms: network.retry_backoff_ms,
            attempt_timeout: network.download_timeout(),
        })
    }

    /// Downloads the archive for `tag`/`arch` into a temp file in `dest_dir`.
    pub async fn fetch(&self, tag: &str, arch: &str, dest_dir: &Path) -> Result<PathBuf> {
        let url = asset_url(&self.release, tag, arch);
        info!("Downloading {url}");

        // `take(n)` is the number of retries after the first attempt.
        let strategy = FixedInterval::from_millis(self.backoff_ms).take(self.retries);
        let mut attempt = 0u32;
        let result = Retry::start(strategy, || {
            attempt += 1;
            let url = url.clone();
            async move {
                let outcome = self.attempt(&url, dest_dir).await;
                if let Err(e) = &outcome {
                    warn!(attempt, "Download attempt failed: {e:#}");
                }
                outcome
            }
        })
        .await;

        result.map_err(|e| {
            RelayError::Download {
                url: url.clone(),
                reason: format!("{e:#}"),
            }
            .into()
        })
    }

    async fn attempt(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        tokio::time::timeout(self.attempt_timeout, self.download(url, dest_dir))
            .await
            .map_err(|_| anyhow!("timed out after {}s", self.attempt_timeout.as_secs()))?
    }

    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;

        let file = tempfile::Builder::new()
            .prefix(".relayctl-download-")
            .suffix(".zip")
            .tempfile_in(dest_dir)
            .with_context(|| format!("Failed to create temp file in {}", dest_dir.display()))?;
        let (mut handle, path) = file.into_parts();

        let bar = download_bar(&self.release.binary_name, response.content_length());
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            handle.write_all(&chunk).context("Failed to write download")?;
            written += chunk.len() as u64;
            bar.set_position(written);
        }
        handle.sync_all().context("Failed to flush download")?;
        bar.finish_and_clear();

        // Ownership of the file moves to the caller's directory; the scratch
        // dir that holds it is removed when the caller is done.
        let kept = path.keep().context("Failed to keep downloaded archive")?;
        debug!(bytes = written, path = %kept.display(), "Download complete");
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::find_relay_error;
    use crate::test_utils::{CannedHttp, zip_with_files};
    use tempfile::TempDir;

    #[test]
    fn test_asset_url_default_template() {
        let mut release = Settings::default().release;
        release.repo = "acme/relay".to_string();

        assert_eq!(
            asset_url(&release, "v1.2.0", "amd64"),
            "https://github.com/acme/relay/releases/download/v1.2.0/relay-server_1.2.0_linux_amd64.zip"
        );
    }

    #[test]
    fn test_asset_url_custom_template_without_v() {
        let mut release = Settings::default().release;
        release.asset_url_template = "https://mirror.example/{binary}/{tag}/{arch}.zip".to_string();

        assert_eq!(
            asset_url(&release, "2.0.1", "arm64"),
            "https://mirror.example/relay-server/2.0.1/arm64.zip"
        );
    }

    fn fetcher_for(base: &str, retries: usize) -> ArtifactFetcher {
        let mut settings = Settings::default();
        settings.release.web_base = base.to_string();
        settings.release.repo = "acme/relay".to_string();
        settings.network.download_retries = retries;
        settings.network.retry_backoff_ms = 10;
        settings.network.download_timeout_secs = 5;
        ArtifactFetcher::new(&settings.release, &settings.network).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_writes_into_dest_dir() {
        let archive = zip_with_files(&[("relay-server", b"#!/bin/sh\n".as_slice())]);
        let server = CannedHttp::start().await.bytes(
            "/acme/relay/releases/download/v1.2.0/relay-server_1.2.0_linux_amd64.zip",
            archive.clone(),
        );
        let temp = TempDir::new().unwrap();

        let path = fetcher_for(&server.base_url(), 0)
            .fetch("v1.2.0", "amd64", temp.path())
            .await
            .unwrap();

        assert_eq!(path.parent(), Some(temp.path()));
        assert_eq!(std::fs::read(&path).unwrap(), archive);
    }

    #[tokio::test]
    async fn test_fetch_retries_then_reports_download_error() {
        let server = CannedHttp::start().await;
        let temp = TempDir::new().unwrap();

        let err = fetcher_for(&server.base_url(), 2)
            .fetch("v9.9.9", "amd64", temp.path())
            .await
            .unwrap_err();

        assert!(matches!(find_relay_error(&err), Some(RelayError::Download { .. })));
        assert_eq!(server.hits(), 3);
        // Failed attempts leave nothing behind.
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
