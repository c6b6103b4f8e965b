//! Persisted state and tool settings.
//!
//! - [`settings`]: relayctl's own TOML settings (paths, release source,
//!   timeouts, restart policy)
//! - [`store`]: the Configuration Store holding the service's connection
//!   parameters
//! - [`version_record`]: the InstalledVersion commit record
//! - [`mask`]: seedable mask domain selection

pub mod mask;
pub mod settings;
pub mod store;
pub mod version_record;

pub use mask::{pick_mask_domain, random_seed};
pub use settings::{HostLayout, Settings};
pub use store::{ConfigSnapshot, ConfigStore, ServiceConfig};
pub use version_record::VersionRecord;
