//! systemd implementation of [`ServiceController`].

use super::ServiceController;
use super::unit::render_unit;
use crate::config::settings::{HostLayout, ServiceSettings};
use crate::config::ServiceConfig;
use crate::core::RelayError;
use crate::utils::fs::{atomic_write, remove_if_exists};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const SYSTEMCTL_TIMEOUT: Duration = Duration::from_secs(90);

/// Drives one systemd unit through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdController {
    systemctl: PathBuf,
    unit_file: PathBuf,
    unit_name: String,
    binary: PathBuf,
    config: PathBuf,
    service: ServiceSettings,
}

impl SystemdController {
    pub fn new(layout: &HostLayout, service: &ServiceSettings) -> Self {
        let systemctl = which::which("systemctl").unwrap_or_else(|_| PathBuf::from("systemctl"));
        Self {
            systemctl,
            unit_file: layout.unit_file.clone(),
            unit_name: layout.unit_name.clone(),
            binary: layout.binary.clone(),
            config: layout.config.clone(),
            service: service.clone(),
        }
    }

    pub fn unit_file(&self) -> &Path {
        &self.unit_file
    }

    /// The unit text this controller writes.
    pub fn render(&self) -> String {
        render_unit(&self.binary, &self.config, &self.service)
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        let line = format!("systemctl {}", args.join(" "));
        debug!(target: "systemd", "Executing command: {line}");

        let output = timeout(
            SYSTEMCTL_TIMEOUT,
            Command::new(&self.systemctl)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| RelayError::ServiceCommand {
            command: line.clone(),
            stderr: format!("timed out after {}s", SYSTEMCTL_TIMEOUT.as_secs()),
        })?
        .with_context(|| format!("Failed to execute {line}"))?;

        if !output.stderr.is_empty() {
            debug!(target: "systemd", "{}", String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(output)
    }

    /// Runs `systemctl <args>` and fails with `ServiceCommand` on a non-zero
    /// exit.
    async fn run_success(&self, args: &[&str]) -> Result<()> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(RelayError::ServiceCommand {
            command: format!("systemctl {}", args.join(" ")),
            stderr: failure_text(&output),
        }
        .into())
    }

    async fn daemon_reload(&self) -> Result<()> {
        self.run_success(&["daemon-reload"]).await
    }

    async fn start_like(&self, verb: &str) -> Result<()> {
        let output = self.run(&[verb, self.unit_name.as_str()]).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(RelayError::ServiceStart {
            reason: failure_text(&output),
        }
        .into())
    }
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        match output.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr
    }
}

impl ServiceController for SystemdController {
    async fn write_definition(&self, config: &ServiceConfig) -> Result<()> {
        config.validate()?;
        let unit = self.render();

        if let Ok(existing) = tokio::fs::read_to_string(&self.unit_file).await
            && existing == unit
        {
            debug!("Unit {} is up to date", self.unit_file.display());
            return Ok(());
        }

        let path = self.unit_file.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, unit.as_bytes()))
            .await
            .context("Unit write task panicked")??;
        debug!("Wrote unit {}", self.unit_file.display());

        self.daemon_reload().await
    }

    async fn remove_definition(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.unit_file).await.unwrap_or(false) {
            return Ok(());
        }
        remove_if_exists(&self.unit_file).await?;
        self.daemon_reload().await
    }

    async fn has_definition(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.unit_file).await?)
    }

    async fn enable(&self) -> Result<()> {
        self.run_success(&["enable", self.unit_name.as_str()]).await
    }

    async fn disable(&self) -> Result<()> {
        self.run_success(&["disable", self.unit_name.as_str()]).await
    }

    async fn start(&self) -> Result<()> {
        self.start_like("start").await
    }

    async fn stop(&self) -> Result<()> {
        self.run_success(&["stop", self.unit_name.as_str()]).await
    }

    async fn restart(&self) -> Result<()> {
        self.start_like("restart").await
    }

    async fn reset_failed(&self) -> Result<()> {
        self.run_success(&["reset-failed", self.unit_name.as_str()]).await
    }

    async fn is_active(&self) -> Result<bool> {
        let output = self.run(&["is-active", "--quiet", self.unit_name.as_str()]).await?;
        Ok(output.status.success())
    }

    async fn status(&self) -> Result<String> {
        // `status` exits non-zero for inactive units; the text is still useful.
        let output = self.run(&["status", "--no-pager", "--lines=20", self.unit_name.as_str()]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if stdout.is_empty() {
            Ok(failure_text(&output))
        } else {
            Ok(stdout)
        }
    }
}
