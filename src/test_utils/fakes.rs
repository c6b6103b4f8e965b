//! In-memory stand-ins for the release host and the service supervisor.
//!
//! Both fakes are cheap to clone and share their state, so a test can keep
//! one handle for assertions while the orchestrator owns another.

use super::fixtures::{UNHEALTHY_MARKER, release_archive};
use crate::config::settings::{HostLayout, ServiceSettings};
use crate::config::ServiceConfig;
use crate::constants;
use crate::core::{HealthCheckFailure, RelayError};
use crate::health::PortProbe;
use crate::release::ReleaseSource;
use crate::service::{ServiceController, render_unit};
use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// What [`FakeReleases`] serves for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A binary that binds its port once started.
    Healthy,
    /// A binary that starts but never listens.
    Unhealthy,
    /// Bytes that are not a zip archive.
    Corrupt,
    /// A valid archive without the expected executable.
    MissingBinary,
    /// The download itself fails.
    DownloadFails,
}

#[derive(Debug, Default)]
struct ReleaseState {
    latest: Option<String>,
    resolve_fails: bool,
    artifacts: HashMap<String, ArtifactKind>,
    fetches: Vec<String>,
    arches: Vec<String>,
}

/// Release source that builds archives on demand.
#[derive(Debug, Clone)]
pub struct FakeReleases {
    binary_name: String,
    state: Arc<Mutex<ReleaseState>>,
}

impl FakeReleases {
    /// Source whose latest release is `latest`; every tag is healthy.
    pub fn new(latest: &str) -> Self {
        let state = ReleaseState {
            latest: Some(latest.to_string()),
            ..ReleaseState::default()
        };
        Self {
            binary_name: constants::DEFAULT_BINARY_NAME.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReleaseState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_latest(&self, tag: &str) {
        self.state().latest = Some(tag.to_string());
    }

    /// Makes `resolve_latest` fail as if both lookup paths were down.
    pub fn fail_resolution(&self) {
        self.state().resolve_fails = true;
    }

    pub fn set_artifact(&self, tag: &str, kind: ArtifactKind) {
        self.state().artifacts.insert(tag.to_string(), kind);
    }

    /// Tags fetched so far, in order.
    pub fn fetches(&self) -> Vec<String> {
        self.state().fetches.clone()
    }

    /// Architecture requested by each fetch, in order.
    pub fn fetched_arches(&self) -> Vec<String> {
        self.state().arches.clone()
    }
}

impl ReleaseSource for FakeReleases {
    async fn resolve_latest(&self) -> Result<String> {
        let state = self.state();
        if state.resolve_fails {
            return Err(RelayError::VersionResolution {
                reason: "metadata API: unreachable; redirect: unreachable".to_string(),
            }
            .into());
        }
        state.latest.clone().ok_or_else(|| {
            RelayError::VersionResolution {
                reason: "no releases published".to_string(),
            }
            .into()
        })
    }

    async fn fetch(&self, tag: &str, arch: &str, dest_dir: &Path) -> Result<PathBuf> {
        let kind = {
            let mut state = self.state();
            state.fetches.push(tag.to_string());
            state.arches.push(arch.to_string());
            state.artifacts.get(tag).copied().unwrap_or(ArtifactKind::Healthy)
        };

        let bytes = match kind {
            ArtifactKind::Healthy => release_archive(&self.binary_name, tag, true),
            ArtifactKind::Unhealthy => release_archive(&self.binary_name, tag, false),
            ArtifactKind::Corrupt => b"PK\x03\x04 truncated".to_vec(),
            ArtifactKind::MissingBinary => {
                super::fixtures::zip_with_files(&[("README.md", b"no binary here\n".as_slice())])
            }
            ArtifactKind::DownloadFails => {
                return Err(RelayError::Download {
                    url: format!("fake://{tag}/{arch}"),
                    reason: "connection reset".to_string(),
                }
                .into());
            }
        };

        let path = dest_dir.join(format!("{}_{tag}_{arch}.zip", self.binary_name));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[derive(Debug, Default)]
struct HostState {
    definition: Option<String>,
    definition_writes: usize,
    enabled: bool,
    active: bool,
    port_listening: Option<bool>,
    fail_start: bool,
    block_on_next_start: Option<PathBuf>,
    probe_calls: usize,
    commands: Vec<String>,
}

/// Service supervisor and port probe in one.
///
/// When built with [`FakeHost::for_layout`], the port counts as listening
/// while the service is active and the installed binary does not carry
/// [`UNHEALTHY_MARKER`], so swapping binaries changes health the way a real
/// deployment would.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    binary: Option<PathBuf>,
    config: PathBuf,
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    /// Host where an active service always listens.
    pub fn new() -> Self {
        Self {
            binary: None,
            config: PathBuf::from(constants::DEFAULT_CONFIG_PATH),
            state: Arc::default(),
        }
    }

    /// Host whose health follows the binary installed at `layout.binary`.
    pub fn for_layout(layout: &HostLayout) -> Self {
        Self {
            binary: Some(layout.binary.clone()),
            config: layout.config.clone(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, command: &str) -> MutexGuard<'_, HostState> {
        let mut state = self.state();
        state.commands.push(command.to_string());
        state
    }

    pub fn set_active(&self, active: bool) {
        self.state().active = active;
    }

    /// Forces the probe answer while active, ignoring the binary.
    pub fn set_port_listening(&self, listening: bool) {
        self.state().port_listening = Some(listening);
    }

    /// Makes `start`/`restart` fail.
    pub fn fail_start(&self, fail: bool) {
        self.state().fail_start = fail;
    }

    /// Replaces `path` with a directory the next time the service starts,
    /// so a later write of that file fails.
    pub fn block_path_on_next_start(&self, path: impl Into<PathBuf>) {
        self.state().block_on_next_start = Some(path.into());
    }

    pub fn running(&self) -> bool {
        self.state().active
    }

    pub fn enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn definition(&self) -> Option<String> {
        self.state().definition.clone()
    }

    pub fn definition_writes(&self) -> usize {
        self.state().definition_writes
    }

    pub fn probe_calls(&self) -> usize {
        self.state().probe_calls
    }

    /// Supervisor commands issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    fn binary_is_healthy(&self) -> bool {
        match &self.binary {
            Some(path) => std::fs::read_to_string(path)
                .map(|content| !content.contains(UNHEALTHY_MARKER))
                .unwrap_or(false),
            None => true,
        }
    }

    fn start_like(&self, command: &str) -> Result<()> {
        let mut state = self.record(command);
        if state.fail_start {
            state.active = false;
            return Err(RelayError::ServiceStart {
                reason: "unit entered failed state".to_string(),
            }
            .into());
        }
        state.active = true;
        if let Some(path) = state.block_on_next_start.take() {
            let _ = std::fs::remove_file(&path);
            std::fs::create_dir_all(&path)?;
        }
        Ok(())
    }
}

impl ServiceController for FakeHost {
    async fn write_definition(&self, config: &ServiceConfig) -> Result<()> {
        config.validate()?;
        let binary = self
            .binary
            .clone()
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_BINARY_PATH));
        let unit = render_unit(&binary, &self.config, &ServiceSettings::default());

        let mut state = self.record("write-definition");
        state.definition = Some(unit);
        state.definition_writes += 1;
        Ok(())
    }

    async fn remove_definition(&self) -> Result<()> {
        self.record("remove-definition").definition = None;
        Ok(())
    }

    async fn has_definition(&self) -> Result<bool> {
        Ok(self.state().definition.is_some())
    }

    async fn enable(&self) -> Result<()> {
        self.record("enable").enabled = true;
        Ok(())
    }

    async fn disable(&self) -> Result<()> {
        self.record("disable").enabled = false;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.start_like("start")
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop").active = false;
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        self.start_like("restart")
    }

    async fn reset_failed(&self) -> Result<()> {
        drop(self.record("reset-failed"));
        Ok(())
    }

    async fn is_active(&self) -> Result<bool> {
        Ok(self.state().active)
    }

    async fn status(&self) -> Result<String> {
        let state = self.state();
        Ok(format!(
            "relay-server.service - fake\n   Active: {}",
            if state.active { "active (running)" } else { "inactive (dead)" }
        ))
    }
}

impl PortProbe for FakeHost {
    async fn is_listening(&self, _port: u16) -> Result<bool, HealthCheckFailure> {
        let healthy_binary = self.binary_is_healthy();
        let mut state = self.state();
        state.probe_calls += 1;
        if !state.active {
            return Ok(false);
        }
        Ok(state.port_listening.unwrap_or(healthy_binary))
    }
}
