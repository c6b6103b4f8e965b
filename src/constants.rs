//! Global constants used throughout relayctl.
//!
//! Default paths, timeouts and retry parameters live here so the values a
//! fresh host gets without a settings file are discoverable in one place.
//! Every one of them can be overridden through [`crate::config::Settings`].

use std::time::Duration;

/// Default location of the tool's own settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/relayctl/relayctl.toml";

/// Environment variable that overrides [`DEFAULT_SETTINGS_PATH`].
pub const SETTINGS_PATH_ENV: &str = "RELAYCTL_CONFIG";

/// Name of the managed executable inside release archives and on disk.
pub const DEFAULT_BINARY_NAME: &str = "relay-server";

/// Install location of the managed executable.
pub const DEFAULT_BINARY_PATH: &str = "/usr/local/bin/relay-server";

/// Key/value file holding the operator's connection parameters.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/relayctl/relay.env";

/// Single-line record of the last version that passed its health check.
pub const DEFAULT_VERSION_PATH: &str = "/etc/relayctl/installed_version";

/// Directory systemd reads unit files from.
pub const DEFAULT_UNIT_DIR: &str = "/etc/systemd/system";

/// Unit name, without the `.service` suffix.
pub const DEFAULT_UNIT_NAME: &str = "relay-server";

/// Directory that receives timestamped binary backups.
pub const DEFAULT_BACKUP_DIR: &str = "/var/lib/relayctl/backups";

/// Lock file serializing mutating invocations.
pub const DEFAULT_LOCK_PATH: &str = "/run/lock/relayctl.lock";

/// Port written when the config file does not name one.
pub const DEFAULT_PORT: u16 = 8443;

/// Timeout for each version resolution step (metadata call, redirect probe).
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for artifact downloads.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout ceiling for a single download attempt.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Number of retries after the first failed download attempt.
pub const DOWNLOAD_RETRIES: usize = 3;

/// Fixed delay between download attempts.
pub const RETRY_BACKOFF_MS: u64 = 2000;

/// Number of health polls after a start or restart.
pub const HEALTH_ATTEMPTS: u32 = 5;

/// Delay between health polls.
pub const HEALTH_INTERVAL_MS: u64 = 1000;

/// Number of binary backups kept after a successful commit.
pub const BACKUP_RETENTION: usize = 3;

/// Restart-storm breaker: at most this many starts ...
pub const START_LIMIT_BURST: u32 = 5;

/// ... within this rolling window.
pub const START_LIMIT_INTERVAL_SECS: u64 = 60;

/// Delay systemd waits before restarting a failed service.
pub const RESTART_SEC: u64 = 5;

/// Maximum number of open file descriptors for the managed service.
pub const LIMIT_NOFILE: u64 = 1_048_576;
