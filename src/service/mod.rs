//! Service supervision.
//!
//! [`ServiceController`] is everything the orchestrator needs from the
//! host's service manager. [`SystemdController`] drives systemd through
//! `systemctl`; tests use `test_utils::FakeHost`.

pub mod systemd;
pub mod unit;

pub use systemd::SystemdController;
pub use unit::render_unit;

use crate::config::ServiceConfig;
use anyhow::Result;
use std::future::Future;

/// Operations on the managed service's supervisor entry.
///
/// Commands fail with `RelayError::ServiceCommand` when the supervisor
/// rejects them, except [`start`](Self::start) and
/// [`restart`](Self::restart), which fail with `RelayError::ServiceStart`.
pub trait ServiceController: Send + Sync {
    /// Validates `config` and writes the service definition.
    fn write_definition(&self, config: &ServiceConfig) -> impl Future<Output = Result<()>> + Send;

    /// Deletes the service definition; missing is not an error.
    fn remove_definition(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether a service definition is present.
    fn has_definition(&self) -> impl Future<Output = Result<bool>> + Send;

    fn enable(&self) -> impl Future<Output = Result<()>> + Send;

    fn disable(&self) -> impl Future<Output = Result<()>> + Send;

    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    fn restart(&self) -> impl Future<Output = Result<()>> + Send;

    /// Clears the supervisor's restart-failure counters.
    fn reset_failed(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the supervisor reports the service as running.
    fn is_active(&self) -> impl Future<Output = Result<bool>> + Send;

    /// Human-readable supervisor status for diagnostics.
    fn status(&self) -> impl Future<Output = Result<String>> + Send;
}
