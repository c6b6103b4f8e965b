//! Post-start health checking.
//!
//! A deployment is healthy when the supervisor reports the service active
//! **and** something listens on the configured port. The checks run in that
//! order and the first failure decides the reported reason. Because a
//! freshly started process may bind its port a moment later, the pair is
//! polled up to `health.attempts` times, `health.interval_ms` apart.

pub mod probe;

pub use probe::SsPortProbe;

use crate::config::ServiceConfig;
use crate::config::settings::HealthSettings;
use crate::core::HealthCheckFailure;
use crate::service::ServiceController;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Answers whether a TCP port has a listener on this host.
pub trait PortProbe: Send + Sync {
    fn is_listening(
        &self,
        port: u16,
    ) -> impl Future<Output = Result<bool, HealthCheckFailure>> + Send;
}

/// Polls service liveness and port binding.
#[derive(Debug, Clone)]
pub struct HealthChecker<P> {
    probe: P,
    attempts: u32,
    interval: Duration,
}

impl<P: PortProbe> HealthChecker<P> {
    pub fn new(probe: P, settings: &HealthSettings) -> Self {
        Self {
            probe,
            attempts: settings.attempts.max(1),
            interval: Duration::from_millis(settings.interval_ms),
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Checks until healthy or out of attempts; returns the last failure.
    pub async fn check<S: ServiceController>(
        &self,
        service: &S,
        config: &ServiceConfig,
    ) -> Result<(), HealthCheckFailure> {
        let mut last = HealthCheckFailure::ServiceInactive;
        for attempt in 1..=self.attempts {
            match self.check_once(service, config.port).await {
                Ok(()) => {
                    info!("Health check passed (port {})", config.port);
                    return Ok(());
                }
                Err(failure) => {
                    debug!(attempt, attempts = self.attempts, "Health check failed: {failure}");
                    last = failure;
                }
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!("Service unhealthy after {} attempt(s): {last}", self.attempts);
        Err(last)
    }

    /// One poll: active first, then listening.
    pub async fn check_once<S: ServiceController>(
        &self,
        service: &S,
        port: u16,
    ) -> Result<(), HealthCheckFailure> {
        match service.is_active().await {
            Ok(true) => {}
            Ok(false) => return Err(HealthCheckFailure::ServiceInactive),
            Err(e) => {
                debug!("Could not query service state: {e:#}");
                return Err(HealthCheckFailure::ServiceInactive);
            }
        }

        if self.probe.is_listening(port).await? {
            Ok(())
        } else {
            Err(HealthCheckFailure::PortNotListening {
                port,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeHost;

    fn checker(host: &FakeHost, attempts: u32) -> HealthChecker<FakeHost> {
        HealthChecker::new(
            host.clone(),
            &HealthSettings {
                attempts,
                interval_ms: 1,
            },
        )
    }

    fn config() -> ServiceConfig {
        ServiceConfig::new(8443, "abc123", None).unwrap()
    }

    #[tokio::test]
    async fn test_inactive_service_fails_first() {
        let host = FakeHost::new();
        host.set_port_listening(true);

        let result = checker(&host, 2).check(&host, &config()).await;
        assert_eq!(result, Err(HealthCheckFailure::ServiceInactive));
    }

    #[tokio::test]
    async fn test_port_not_listening() {
        let host = FakeHost::new();
        host.set_active(true);
        host.set_port_listening(false);

        let result = checker(&host, 3).check(&host, &config()).await;
        assert_eq!(
            result,
            Err(HealthCheckFailure::PortNotListening {
                port: 8443
            })
        );
        assert_eq!(host.probe_calls(), 3);
    }

    #[tokio::test]
    async fn test_healthy_service_passes_on_first_poll() {
        let host = FakeHost::new();
        host.set_active(true);
        host.set_port_listening(true);

        assert_eq!(checker(&host, 5).check(&host, &config()).await, Ok(()));
        assert_eq!(host.probe_calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_polls_once() {
        let host = FakeHost::new();
        host.set_active(true);
        host.set_port_listening(true);

        assert_eq!(checker(&host, 0).check(&host, &config()).await, Ok(()));
    }
}
