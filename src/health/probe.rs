//! Listening-socket probes.
//!
//! [`SsPortProbe`] asks `ss -H -ltn` first. When `ss` is not installed or
//! fails, it reads the kernel tables in `/proc/net/tcp` and
//! `/proc/net/tcp6` directly, where state `0A` means LISTEN.

use super::PortProbe;
use crate::core::HealthCheckFailure;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

const TCP_LISTEN: &str = "0A";

/// Port probe backed by `ss` with a `/proc/net` fallback.
#[derive(Debug, Clone)]
pub struct SsPortProbe {
    ss: Option<PathBuf>,
    proc_net: PathBuf,
}

impl Default for SsPortProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SsPortProbe {
    pub fn new() -> Self {
        Self {
            ss: which::which("ss").ok(),
            proc_net: PathBuf::from("/proc/net"),
        }
    }

    /// Probe that only reads `tcp`/`tcp6` tables under `proc_net`.
    pub fn from_proc_dir(proc_net: impl Into<PathBuf>) -> Self {
        Self {
            ss: None,
            proc_net: proc_net.into(),
        }
    }

    async fn via_ss(&self, port: u16) -> Option<bool> {
        let ss = self.ss.as_ref()?;
        let output = Command::new(ss).args(["-H", "-ltn"]).output().await.ok()?;
        if !output.status.success() {
            debug!("ss exited with {:?}, falling back to /proc/net", output.status.code());
            return None;
        }
        Some(ss_lists_port(&String::from_utf8_lossy(&output.stdout), port))
    }

    async fn via_proc(&self, port: u16) -> Result<bool, HealthCheckFailure> {
        let mut read_any = false;
        let mut errors = Vec::new();
        for table in ["tcp", "tcp6"] {
            let path = self.proc_net.join(table);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    read_any = true;
                    if proc_table_lists_port(&content, port) {
                        return Ok(true);
                    }
                }
                Err(e) => errors.push(format!("{}: {e}", path.display())),
            }
        }

        if read_any {
            Ok(false)
        } else {
            Err(HealthCheckFailure::ProbeUnavailable {
                reason: errors.join("; "),
            })
        }
    }
}

impl PortProbe for SsPortProbe {
    async fn is_listening(&self, port: u16) -> Result<bool, HealthCheckFailure> {
        if let Some(listening) = self.via_ss(port).await {
            return Ok(listening);
        }
        self.via_proc(port).await
    }
}

/// Whether `ss -H -ltn` output has a listener on `port`.
pub fn ss_lists_port(output: &str, port: u16) -> bool {
    let wanted = port.to_string();
    output.lines().any(|line| {
        // State Recv-Q Send-Q Local:Port Peer:Port
        line.split_whitespace()
            .nth(3)
            .and_then(|local| local.rsplit_once(':'))
            .is_some_and(|(_, p)| p == wanted)
    })
}

/// Whether a `/proc/net/tcp{,6}` table has a LISTEN socket on `port`.
pub fn proc_table_lists_port(content: &str, port: u16) -> bool {
    content.lines().skip(1).any(|line| {
        let mut fields = line.split_whitespace();
        let local = fields.nth(1);
        let state = fields.nth(1);
        match (local, state) {
            (Some(local), Some(state)) => {
                state == TCP_LISTEN
                    && local
                        .rsplit_once(':')
                        .and_then(|(_, hex)| u16::from_str_radix(hex, 16).ok())
                        == Some(port)
            }
            _ => false,
        }
    })
}
