//! Host utilities
//!
//! # Modules
//!
//! - [`fs`] - Atomic writes, executable placement, idempotent deletes
//! - [`platform`] - Architecture naming, privilege check, host name
//! - [`progress`] - Download progress bars

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, place_executable};
pub use platform::{ensure_root, host_arch, is_root};
