//! Tool settings for relayctl.
//!
//! Settings describe *how* relayctl manages the relay service: where files
//! live, which release repository to follow, timeouts, the restart policy
//! written into the unit. They are distinct from [`ServiceConfig`], which
//! holds the operator's connection parameters for the service itself.
//!
//! # File Location
//!
//! 1. `--config <path>` on the command line
//! 2. the `RELAYCTL_CONFIG` environment variable
//! 3. `/etc/relayctl/relayctl.toml`
//!
//! A missing file is not an error; every field has a default.
//!
//! # File Format
//!
//! ```toml
//! [release]
//! repo = "relay-project/relay-server"
//!
//! [network]
//! download_retries = 5
//!
//! [backup]
//! retention = 5
//! ```
//!
//! [`ServiceConfig`]: crate::config::ServiceConfig

use crate::constants;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Where releases come from.
    pub release: ReleaseSettings,
    /// Timeouts and retries for network calls.
    pub network: NetworkSettings,
    /// Host paths managed by relayctl.
    pub paths: PathSettings,
    /// Unit generation parameters.
    pub service: ServiceSettings,
    /// Post-start health polling.
    pub health: HealthSettings,
    /// Binary backup retention.
    pub backup: BackupSettings,
    /// Connection descriptor rendering.
    pub export: ExportSettings,
}

/// Release source parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseSettings {
    /// `owner/name` of the release repository.
    pub repo: String,
    /// Executable name inside the archive.
    pub binary_name: String,
    /// Base URL of the release metadata API.
    pub api_base: String,
    /// Base URL of the release web pages (redirect fallback and downloads).
    pub web_base: String,
    /// Download URL template. Placeholders: `{web_base}`, `{repo}`, `{tag}`,
    /// `{version}`, `{arch}`, `{binary}`.
    pub asset_url_template: String,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            repo: "relay-project/relay-server".to_string(),
            binary_name: constants::DEFAULT_BINARY_NAME.to_string(),
            api_base: "https://api.github.com".to_string(),
            web_base: "https://github.com".to_string(),
            asset_url_template:
                "{web_base}/{repo}/releases/download/{tag}/{binary}_{version}_linux_{arch}.zip"
                    .to_string(),
        }
    }
}

/// Network timeouts and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkSettings {
    /// Timeout for each version-resolution step, in seconds.
    pub resolve_timeout_secs: u64,
    /// Connect timeout for downloads, in seconds.
    pub connect_timeout_secs: u64,
    /// Total timeout for one download attempt, in seconds.
    pub download_timeout_secs: u64,
    /// Retries after the first failed download attempt.
    pub download_retries: usize,
    /// Fixed delay between download attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            resolve_timeout_secs: constants::RESOLVE_TIMEOUT.as_secs(),
            connect_timeout_secs: constants::CONNECT_TIMEOUT.as_secs(),
            download_timeout_secs: constants::DOWNLOAD_TIMEOUT.as_secs(),
            download_retries: constants::DOWNLOAD_RETRIES,
            retry_backoff_ms: constants::RETRY_BACKOFF_MS,
        }
    }
}

impl NetworkSettings {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Host paths. See [`HostLayout`] for the resolved form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathSettings {
    pub binary: PathBuf,
    pub config: PathBuf,
    pub installed_version: PathBuf,
    pub unit_dir: PathBuf,
    pub unit_name: String,
    pub backup_dir: PathBuf,
    pub lock: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(constants::DEFAULT_BINARY_PATH),
            config: PathBuf::from(constants::DEFAULT_CONFIG_PATH),
            installed_version: PathBuf::from(constants::DEFAULT_VERSION_PATH),
            unit_dir: PathBuf::from(constants::DEFAULT_UNIT_DIR),
            unit_name: constants::DEFAULT_UNIT_NAME.to_string(),
            backup_dir: PathBuf::from(constants::DEFAULT_BACKUP_DIR),
            lock: PathBuf::from(constants::DEFAULT_LOCK_PATH),
        }
    }
}

/// Parameters of the generated systemd unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Human-readable unit description.
    pub description: String,
    /// Arguments after the binary in `ExecStart=`. May reference `${PORT}`,
    /// `${CREDENTIAL}` and `${MASK_DOMAIN}` from the config file.
    pub exec_args: Vec<String>,
    /// `RestartSec=`
    pub restart_sec: u64,
    /// `StartLimitBurst=`
    pub start_limit_burst: u32,
    /// `StartLimitIntervalSec=`
    pub start_limit_interval_secs: u64,
    /// `LimitNOFILE=`
    pub limit_nofile: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            description: "Relay server managed by relayctl".to_string(),
            exec_args: vec![
                "-l".to_string(),
                "0.0.0.0:${PORT}".to_string(),
                "-p".to_string(),
                "${CREDENTIAL}".to_string(),
            ],
            restart_sec: constants::RESTART_SEC,
            start_limit_burst: constants::START_LIMIT_BURST,
            start_limit_interval_secs: constants::START_LIMIT_INTERVAL_SECS,
            limit_nofile: constants::LIMIT_NOFILE,
        }
    }
}

/// Health polling after a start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthSettings {
    /// Number of polls before giving up (at least one poll always happens).
    pub attempts: u32,
    /// Delay between polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: constants::HEALTH_ATTEMPTS,
            interval_ms: constants::HEALTH_INTERVAL_MS,
        }
    }
}

/// Backup retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupSettings {
    /// Backups kept after a successful commit.
    pub retention: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            retention: constants::BACKUP_RETENTION,
        }
    }
}

/// Connection descriptor rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportSettings {
    /// URI scheme and proxy `type`.
    pub protocol: String,
    /// Endpoint returning the host's public IP as plain text.
    pub public_ip_url: String,
    /// Whether clients should skip certificate verification.
    pub insecure: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            protocol: "anytls".to_string(),
            public_ip_url: "https://api.ipify.org".to_string(),
            insecure: true,
        }
    }
}

impl Settings {
    /// Resolves the settings path from an explicit override, the
    /// environment, or the default location.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(constants::SETTINGS_PATH_ENV)
            && !path.is_empty()
        {
            return PathBuf::from(path);
        }
        PathBuf::from(constants::DEFAULT_SETTINGS_PATH)
    }

    /// Loads settings, falling back to defaults when the file is missing.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Loads settings from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings from {}", path.display()))
    }

    /// Resolved host layout.
    #[must_use]
    pub fn layout(&self) -> HostLayout {
        HostLayout::from_settings(&self.paths)
    }
}

/// Resolved set of host paths relayctl reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Managed executable.
    pub binary: PathBuf,
    /// Configuration Store file.
    pub config: PathBuf,
    /// InstalledVersion record.
    pub installed_version: PathBuf,
    /// Full path of the unit file.
    pub unit_file: PathBuf,
    /// Unit name including `.service`.
    pub unit_name: String,
    /// Backup directory.
    pub backup_dir: PathBuf,
    /// Lock file.
    pub lock: PathBuf,
}

impl HostLayout {
    fn from_settings(paths: &PathSettings) -> Self {
        let unit_name = if paths.unit_name.ends_with(".service") {
            paths.unit_name.clone()
        } else {
            format!("{}.service", paths.unit_name)
        };
        Self {
            binary: paths.binary.clone(),
            config: paths.config.clone(),
            installed_version: paths.installed_version.clone(),
            unit_file: paths.unit_dir.join(&unit_name),
            unit_name,
            backup_dir: paths.backup_dir.clone(),
            lock: paths.lock.clone(),
        }
    }

    /// Layout rooted under `root`, mirroring the default directory structure.
    /// Used by tests and by `--root`-style sandboxes.
    #[must_use]
    pub fn under(root: &Path) -> Self {
        let paths = PathSettings {
            binary: root.join("usr/local/bin").join(constants::DEFAULT_BINARY_NAME),
            config: root.join("etc/relayctl/relay.env"),
            installed_version: root.join("etc/relayctl/installed_version"),
            unit_dir: root.join("etc/systemd/system"),
            unit_name: constants::DEFAULT_UNIT_NAME.to_string(),
            backup_dir: root.join("var/lib/relayctl/backups"),
            lock: root.join("run/lock/relayctl.lock"),
        };
        Self::from_settings(&paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_constants() {
        let settings = Settings::default();
        assert_eq!(settings.release.binary_name, "relay-server");
        assert_eq!(settings.network.download_retries, 3);
        assert_eq!(settings.backup.retention, 3);
        assert_eq!(settings.service.start_limit_burst, 5);
        assert_eq!(settings.service.start_limit_interval_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [release]
            repo = "example/relay"

            [backup]
            retention = 7
            "#,
        )
        .unwrap();

        assert_eq!(settings.release.repo, "example/relay");
        assert_eq!(settings.release.binary_name, "relay-server");
        assert_eq!(settings.backup.retention, 7);
        assert_eq!(settings.health, HealthSettings::default());
    }

    #[test]
    fn test_layout_appends_service_suffix() {
        let layout = Settings::default().layout();
        assert_eq!(layout.unit_name, "relay-server.service");
        assert_eq!(layout.unit_file, PathBuf::from("/etc/systemd/system/relay-server.service"));

        let mut settings = Settings::default();
        settings.paths.unit_name = "custom.service".to_string();
        assert_eq!(settings.layout().unit_name, "custom.service");
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(Some(&temp.path().join("absent.toml"))).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("relayctl.toml");
        tokio::fs::write(&path, "[release\nrepo = ").await.unwrap();

        let err = Settings::load(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
    }

    #[test]
    #[serial]
    fn test_resolve_path_prefers_explicit_then_env() {
        unsafe {
            std::env::set_var(constants::SETTINGS_PATH_ENV, "/tmp/from-env.toml");
        }
        assert_eq!(Settings::resolve_path(None), PathBuf::from("/tmp/from-env.toml"));
        assert_eq!(
            Settings::resolve_path(Some(Path::new("/tmp/explicit.toml"))),
            PathBuf::from("/tmp/explicit.toml")
        );
        unsafe {
            std::env::remove_var(constants::SETTINGS_PATH_ENV);
        }
        assert_eq!(Settings::resolve_path(None), PathBuf::from(constants::DEFAULT_SETTINGS_PATH));
    }
}
