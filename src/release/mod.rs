//! Release discovery and artifact download.
//!
//! [`ReleaseSource`] is the seam the orchestrator depends on: it names the
//! latest published tag and downloads the archive for a tag and
//! architecture. [`GithubReleases`] implements it on top of
//! [`VersionResolver`] and [`ArtifactFetcher`]; tests substitute
//! `test_utils::FakeReleases`.

pub mod fetcher;
pub mod resolver;

pub use fetcher::{ArtifactFetcher, asset_url};
pub use resolver::{VersionResolver, extract_tag_from_url, is_release_tag};

use crate::config::Settings;
use anyhow::Result;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Where release tags and artifacts come from.
pub trait ReleaseSource: Send + Sync {
    /// Newest published release tag.
    fn resolve_latest(&self) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Downloads the archive for `tag` and `arch` into `dest_dir` and
    /// returns its path.
    fn fetch(
        &self,
        tag: &str,
        arch: &str,
        dest_dir: &Path,
    ) -> impl std::future::Future<Output = Result<PathBuf>> + Send;
}

/// Releases published on GitHub (or any host with the same URL layout).
#[derive(Debug, Clone)]
pub struct GithubReleases {
    resolver: VersionResolver,
    fetcher: ArtifactFetcher,
}

impl GithubReleases {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            resolver: VersionResolver::new(&settings.release, &settings.network)?,
            fetcher: ArtifactFetcher::new(&settings.release, &settings.network)?,
        })
    }
}

impl ReleaseSource for GithubReleases {
    async fn resolve_latest(&self) -> Result<String> {
        self.resolver.resolve_latest().await
    }

    async fn fetch(&self, tag: &str, arch: &str, dest_dir: &Path) -> Result<PathBuf> {
        self.fetcher.fetch(tag, arch, dest_dir).await
    }
}

/// Parses a release tag as semver, tolerating a leading `v`.
pub fn parse_tag(tag: &str) -> Option<semver::Version> {
    semver::Version::parse(tag.trim().trim_start_matches('v')).ok()
}

/// Orders two tags by semver; tags that do not parse compare by text.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    match (parse_tag(a), parse_tag(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.trim_start_matches('v').cmp(b.trim_start_matches('v')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_with_and_without_prefix() {
        assert_eq!(parse_tag("v1.2.0"), Some(semver::Version::new(1, 2, 0)));
        assert_eq!(parse_tag("1.2.0"), Some(semver::Version::new(1, 2, 0)));
        assert!(parse_tag("v1.2").is_none());
    }

    #[test]
    fn test_compare_tags() {
        assert_eq!(compare_tags("v1.2.0", "1.3.0"), Ordering::Less);
        assert_eq!(compare_tags("v1.10.0", "v1.9.0"), Ordering::Greater);
        assert_eq!(compare_tags("v2.0.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_tags("v2.0.0-rc.1", "v2.0.0"), Ordering::Less);
    }
}
