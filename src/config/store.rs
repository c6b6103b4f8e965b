//! Configuration Store: the operator's connection parameters.
//!
//! The store owns a flat `KEY=value` file that systemd also reads through
//! `EnvironmentFile=`:
//!
//! ```text
//! PORT=8443
//! CREDENTIAL=s3cret
//! MASK_DOMAIN=www.example.com
//! ```
//!
//! Values follow systemd's environment-file syntax so both readers agree:
//! a value with whitespace, quotes or backslashes is written double-quoted
//! with `\` escapes, and parsing strips and unescapes the same way.
//!
//! The file holds a secret, so it is always written with mode `0600`. It is
//! replaced wholesale (temp file in the same directory, then rename); no
//! partial-write protection beyond that is needed for a file this small.
//!
//! Configuration is only ever read back from this file, never recovered by
//! parsing the unit.

use crate::constants::DEFAULT_PORT;
use crate::core::RelayError;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const KEY_PORT: &str = "PORT";
const KEY_CREDENTIAL: &str = "CREDENTIAL";
const KEY_MASK_DOMAIN: &str = "MASK_DOMAIN";

/// Connection parameters of the managed service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Listening port, 1–65535.
    pub port: u16,
    /// Shared secret clients authenticate with.
    pub credential: String,
    /// Optional TLS server name clients present.
    pub mask_domain: Option<String>,
}

impl ServiceConfig {
    /// Builds a validated config.
    pub fn new(port: u16, credential: impl Into<String>, mask_domain: Option<String>) -> Result<Self> {
        let config = Self {
            port,
            credential: credential.into(),
            mask_domain,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every invariant: non-zero port, non-empty credential, and no
    /// control characters in any field.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RelayError::invalid_config("port", "must be between 1 and 65535").into());
        }
        if self.credential.trim().is_empty() {
            return Err(RelayError::invalid_config("credential", "must not be empty").into());
        }
        check_single_line("credential", &self.credential)?;
        if let Some(domain) = &self.mask_domain {
            if domain.trim().is_empty() {
                return Err(RelayError::invalid_config(
                    "mask_domain",
                    "must not be blank when set",
                )
                .into());
            }
            check_single_line("mask_domain", domain)?;
        }
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{KEY_PORT}={}\n", self.port));
        out.push_str(&format!("{KEY_CREDENTIAL}={}\n", env_value(&self.credential)));
        if let Some(domain) = &self.mask_domain {
            out.push_str(&format!("{KEY_MASK_DOMAIN}={}\n", env_value(domain)));
        }
        out
    }

    fn parse(content: &str) -> Result<Self> {
        let mut port = None;
        let mut credential = None;
        let mut mask_domain = None;

        for raw in content.lines() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((key, value)) = raw.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if ![KEY_PORT, KEY_CREDENTIAL, KEY_MASK_DOMAIN].contains(&key) {
                continue;
            }
            let value = unquote_env_value(value).map_err(|reason| {
                RelayError::invalid_config(&key.to_lowercase(), reason)
            })?;
            match key {
                KEY_PORT => {
                    let value = value.trim();
                    let parsed: u16 = value.parse().map_err(|_| {
                        RelayError::invalid_config("port", format!("'{value}' is not a port number"))
                    })?;
                    port = Some(parsed);
                }
                KEY_CREDENTIAL => credential = Some(value),
                KEY_MASK_DOMAIN if !value.trim().is_empty() => {
                    mask_domain = Some(value);
                }
                _ => {}
            }
        }

        let credential = credential
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RelayError::invalid_config("credential", "missing from config file"))?;

        let config = Self {
            port: port.unwrap_or(DEFAULT_PORT),
            credential,
            mask_domain,
        };
        config.validate()?;
        Ok(config)
    }
}

fn check_single_line(field: &str, value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(RelayError::invalid_config(
            field,
            "must not contain newlines or control characters",
        )
        .into());
    }
    Ok(())
}

/// Strips every control character, newlines included.
#[must_use]
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Renders `value` for an environment file, double-quoting it when systemd
/// would otherwise strip or interpret part of it.
fn env_value(value: &str) -> String {
    let value = sanitize(value);
    let plain = !value.is_empty()
        && !value.contains(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '`'));
    if plain {
        return value;
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Parses a value the way systemd's `EnvironmentFile=` does: leading
/// whitespace dropped, unquoted trailing whitespace dropped, `'..'` literal,
/// `".."` and bare text with backslash escapes.
fn unquote_env_value(raw: &str) -> std::result::Result<String, String> {
    #[derive(Clone, Copy)]
    enum State {
        Bare,
        Single,
        Double,
    }

    let mut out = String::new();
    // Length of `out` up to the last character that was quoted or escaped.
    let mut keep = 0;
    let mut state = State::Bare;
    let mut chars = raw.trim_start().chars();

    while let Some(c) = chars.next() {
        match state {
            State::Bare => match c {
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                        keep = out.len();
                    }
                }
                c => {
                    out.push(c);
                    if !c.is_whitespace() {
                        keep = out.len();
                    }
                }
            },
            State::Single => match c {
                '\'' => state = State::Bare,
                c => out.push(c),
            },
            State::Double => match c {
                '"' => state = State::Bare,
                '\\' => {
                    let next = chars.next().ok_or("unterminated double quote")?;
                    out.push(next);
                }
                c => out.push(c),
            },
        }
        if !matches!(state, State::Bare) {
            keep = out.len();
        }
    }

    match state {
        State::Bare => {
            out.truncate(keep);
            Ok(out)
        }
        State::Single => Err("unterminated single quote".to_string()),
        State::Double => Err("unterminated double quote".to_string()),
    }
}

/// Raw bytes of the config file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot(Option<Vec<u8>>);

/// Reads and writes [`ServiceConfig`] at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Writes the config, replacing the whole file with mode 0600.
    pub async fn write(&self, config: &ServiceConfig) -> Result<()> {
        config.validate()?;
        let content = config.render();
        write_private(&self.path, content.into_bytes()).await?;
        debug!("Wrote service config to {}", self.path.display());
        Ok(())
    }

    /// Reads the config back, applying defaults for missing optional fields.
    pub async fn read(&self) -> Result<ServiceConfig> {
        let content = tokio::fs::read_to_string(&self.path).await.with_context(|| {
            format!("Failed to read service config from {}", self.path.display())
        })?;
        ServiceConfig::parse(&content)
            .with_context(|| format!("Invalid service config in {}", self.path.display()))
    }

    /// Captures the current file contents (or its absence).
    pub async fn snapshot(&self) -> Result<ConfigSnapshot> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(ConfigSnapshot(Some(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigSnapshot(None)),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to snapshot {}", self.path.display())),
        }
    }

    /// Puts a snapshot back, removing the file when it did not exist.
    pub async fn restore(&self, snapshot: &ConfigSnapshot) -> Result<()> {
        match &snapshot.0 {
            Some(bytes) => write_private(&self.path, bytes.clone()).await,
            None => self.remove().await,
        }
    }

    /// Deletes the file; absence is not an error.
    pub async fn remove(&self) -> Result<()> {
        crate::utils::fs::remove_if_exists(&self.path).await
    }
}

async fn write_private(path: &Path, content: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Config path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // NamedTempFile is created 0600 on unix.
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        temp.write_all(&content).context("Failed to write config")?;
        temp.as_file().sync_all().context("Failed to sync config")?;
        temp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    })
    .await
    .context("Config write task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::find_relay_error;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> ConfigStore {
        ConfigStore::new(temp.path().join("etc/relay.env"))
    }

    #[tokio::test]
    async fn test_write_read_preserves_fields() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let config =
            ServiceConfig::new(8443, "abc123", Some("www.example.com".to_string())).unwrap();

        store.write(&config).await.unwrap();
        assert_eq!(store.read().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_round_trip_port_bounds() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for port in [1u16, 443, 65535] {
            let config = ServiceConfig::new(port, "pw with spaces=and=equals", None).unwrap();
            store.write(&config).await.unwrap();
            assert_eq!(store.read().await.unwrap(), config);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.write(&ServiceConfig::new(8443, "abc123", None).unwrap()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_newline_in_credential_rejected() {
        let err = ServiceConfig::new(8443, "abc\nPORT=1", None).unwrap_err();
        assert!(matches!(find_relay_error(&err), Some(RelayError::InvalidConfig { .. })));

        let err = ServiceConfig::new(8443, "abc", Some("evil.com\rX=1".into())).unwrap_err();
        assert!(err.to_string().contains("mask_domain"));
    }

    #[test]
    fn test_zero_port_and_empty_credential_rejected() {
        assert!(ServiceConfig::new(0, "abc", None).is_err());
        assert!(ServiceConfig::new(8443, "   ", None).is_err());
    }

    #[test]
    fn test_render_sanitizes_even_unvalidated_values() {
        let config = ServiceConfig {
            port: 8443,
            credential: "abc\nMASK_DOMAIN=injected".to_string(),
            mask_domain: None,
        };
        let rendered = config.render();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.contains("CREDENTIAL=abcMASK_DOMAIN=injected"));
    }

    #[tokio::test]
    async fn test_quoting_characters_survive_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for credential in [r#" ab"c\d "#, "it's", "$HOME`x`", "tab there", "a\\"] {
            let config = ServiceConfig::new(8443, credential, Some(" sni.example ".into())).unwrap();
            store.write(&config).await.unwrap();
            assert_eq!(store.read().await.unwrap(), config, "credential {credential:?}");
        }
    }

    #[test]
    fn test_rendered_values_use_environment_file_quoting() {
        let config = ServiceConfig::new(8443, r#" ab"c\d "#, None).unwrap();
        assert!(config.render().contains(r#"CREDENTIAL=" ab\"c\\d ""#));

        let plain = ServiceConfig::new(8443, "abc123", None).unwrap();
        assert!(plain.render().contains("CREDENTIAL=abc123\n"));
    }

    #[test]
    fn test_unquote_matches_systemd_rules() {
        assert_eq!(unquote_env_value("  plain  ").unwrap(), "plain");
        assert_eq!(unquote_env_value(r#""  spaced  ""#).unwrap(), "  spaced  ");
        assert_eq!(unquote_env_value(r"'a\b'").unwrap(), r"a\b");
        assert_eq!(unquote_env_value(r#"a\ b"#).unwrap(), "a b");
        assert_eq!(unquote_env_value(r#"x"y z"w"#).unwrap(), "xy zw");
        assert!(unquote_env_value(r#"ab"c"#).is_err());
        assert!(unquote_env_value("'open").is_err());
    }

    #[tokio::test]
    async fn test_read_applies_defaults() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "# managed by relayctl\nCREDENTIAL=abc123\nEXTRA=1\n").unwrap();

        let config = store.read().await.unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.mask_domain, None);
        assert_eq!(config.credential, "abc123");
    }

    #[tokio::test]
    async fn test_read_without_credential_fails() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "PORT=9000\n").unwrap();

        let err = store.read().await.unwrap_err();
        assert!(matches!(find_relay_error(&err), Some(RelayError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let empty = store.snapshot().await.unwrap();
        store.write(&ServiceConfig::new(1000, "one", None).unwrap()).await.unwrap();
        let first = store.snapshot().await.unwrap();
        store.write(&ServiceConfig::new(2000, "two", None).unwrap()).await.unwrap();

        store.restore(&first).await.unwrap();
        assert_eq!(store.read().await.unwrap().port, 1000);

        store.restore(&empty).await.unwrap();
        assert!(!store.exists());
    }
}
