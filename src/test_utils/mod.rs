//! Test utilities for relayctl
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite under `tests/`.
//!
//! - [`FakeReleases`]: a [`ReleaseSource`](crate::release::ReleaseSource)
//!   that builds zip artifacts on demand and can be told to serve broken ones
//! - [`FakeHost`]: a [`ServiceController`](crate::service::ServiceController)
//!   and [`PortProbe`](crate::health::PortProbe) whose health follows the
//!   installed binary
//! - [`CannedHttp`]: a loopback HTTP server with fixed responses
//! - [`TestHost`]: a temp directory laid out like a real host plus an
//!   orchestrator wired to the fakes
//!
//! # Logging
//!
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_with_logging() {
//!     relayctl::test_utils::init_test_logging(Some(tracing::Level::DEBUG));
//!     // ...
//! }
//! ```

pub mod fakes;
pub mod fixtures;
pub mod http;

pub use fakes::{ArtifactKind, FakeHost, FakeReleases};
pub use fixtures::{UNHEALTHY_MARKER, relay_binary, release_archive, zip_with_files};
pub use http::CannedHttp;

use crate::config::{HostLayout, ServiceConfig, Settings};
use crate::orchestrator::Orchestrator;
use std::sync::Once;
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly subscriber once per process.
///
/// With `None`, logging is only enabled when `RUST_LOG` is set.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Orchestrator type used throughout the tests.
pub type TestOrchestrator = Orchestrator<FakeReleases, FakeHost, FakeHost>;

/// A sandboxed host: temp root, default layout under it, and fakes.
pub struct TestHost {
    pub root: TempDir,
    pub layout: HostLayout,
    pub settings: Settings,
    pub releases: FakeReleases,
    pub host: FakeHost,
}

impl TestHost {
    /// Fresh host whose release source reports `latest`.
    pub fn new(latest: &str) -> Self {
        init_test_logging(None);
        let root = TempDir::new().expect("create temp root");
        let layout = HostLayout::under(root.path());

        let mut settings = Settings::default();
        settings.health.attempts = 2;
        settings.health.interval_ms = 1;

        Self {
            layout: layout.clone(),
            root,
            settings,
            releases: FakeReleases::new(latest),
            host: FakeHost::for_layout(&layout),
        }
    }

    /// Orchestrator sharing this host's fakes.
    pub fn orchestrator(&self) -> TestOrchestrator {
        Orchestrator::new(
            self.settings.clone(),
            self.layout.clone(),
            self.releases.clone(),
            self.host.clone(),
            self.host.clone(),
            Some("amd64".to_string()),
        )
    }

    /// The config every scenario installs with.
    pub fn config() -> ServiceConfig {
        ServiceConfig::new(8443, "abc123", Some("www.microsoft.com".to_string()))
            .expect("valid test config")
    }

    /// Contents of the managed binary, or `None` if absent.
    pub fn binary_content(&self) -> Option<String> {
        std::fs::read_to_string(&self.layout.binary).ok()
    }

    /// The recorded installed version, or `None` if absent.
    pub fn installed_version(&self) -> Option<String> {
        std::fs::read_to_string(&self.layout.installed_version)
            .ok()
            .map(|s| s.trim().to_string())
    }
}
