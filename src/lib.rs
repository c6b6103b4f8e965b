//! relayctl - relay server deployment manager
//!
//! Installs a relay server binary from its GitHub releases, runs it as a
//! systemd service and keeps it there: upgrades swap the binary atomically,
//! a health check gates every change, and a failed check rolls the host back
//! to the last good deployment.
//!
//! # Architecture Overview
//!
//! Each invocation runs one workflow through the [`orchestrator`], which owns
//! the components below and holds the host [`lock`] while it mutates state.
//! Three seams are traits so workflows can run against fakes:
//! [`release::ReleaseSource`], [`service::ServiceController`] and
//! [`health::PortProbe`].
//!
//! ## Key Features
//!
//! - **Atomic installs**: artifacts are staged in scratch space and renamed
//!   into place; an interrupted install never leaves a partial binary
//! - **Automatic rollback**: the previous binary and configuration return
//!   when the new version does not come up healthy
//! - **Single writer**: concurrent invocations fail fast instead of racing
//! - **Idempotent service definition**: the unit is rewritten only when it
//!   changes
//!
//! # Core Modules
//!
//! ## Workflows
//! - [`cli`] - Command-line interface
//! - [`orchestrator`] - Install, upgrade, rollback, restart, stop, uninstall,
//!   status and export workflows
//!
//! ## Components
//! - [`release`] - Version resolution and artifact download
//! - [`installer`] - Staging, atomic replacement and binary backups
//! - [`service`] - systemd unit generation and service control
//! - [`health`] - Post-start health checks
//! - [`export`] - Client connection descriptors
//!
//! ## Supporting Modules
//! - [`config`] - Tool settings, the service configuration store and the
//!   installed-version record
//! - [`core`] - Error types and user-facing error formatting
//! - [`lock`] - Host-wide instance lock
//! - [`utils`] - Filesystem, platform and progress helpers
//! - [`constants`] - Default paths and timeouts
//!
//! # Host Layout
//!
//! | Path | Purpose |
//! |------|---------|
//! | `/usr/local/bin/relay-server` | Managed binary |
//! | `/etc/relayctl/relay.env` | Service configuration (port, credential, mask domain) |
//! | `/etc/relayctl/installed_version` | Last version that passed its health check |
//! | `/etc/systemd/system/relay-server.service` | Unit file |
//! | `/var/lib/relayctl/backups` | Timestamped binary backups |
//! | `/run/lock/relayctl.lock` | Instance lock |
//!
//! Every path can be changed in `/etc/relayctl/relayctl.toml`; see
//! [`config::settings`].

// Workflows
pub mod cli;
pub mod orchestrator;

// Components
pub mod export;
pub mod health;
pub mod installer;
pub mod release;
pub mod service;

// Supporting modules
pub mod config;
pub mod constants;
pub mod core;
pub mod lock;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
