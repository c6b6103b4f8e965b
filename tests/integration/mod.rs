//! Integration test suite for relayctl
//!
//! End-to-end workflows against a sandboxed host: every path lives in a temp
//! directory, releases come from [`FakeReleases`] and the service supervisor
//! and port probe from [`FakeHost`]. Binary-level tests run the real
//! executable with a settings file pointing into a temp directory.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **deploy**: fresh install, reinstall and upgrade
//! - **recovery**: rollback after unhealthy starts, aborts before the swap
//! - **locking**: mutual exclusion between invocations
//! - **cli**: the `relayctl` binary
//!
//! [`FakeReleases`]: relayctl::test_utils::FakeReleases
//! [`FakeHost`]: relayctl::test_utils::FakeHost

mod cli;
mod deploy;
mod locking;
mod recovery;
