//! Latest-release tag discovery.
//!
//! The metadata API is asked first; when it fails, times out or returns no
//! usable tag, the `releases/latest` web page is requested and the tag is
//! read from the URL the redirect chain ends on. Both paths are bounded by
//! `network.resolve_timeout_secs`. Nothing is cached between invocations.

use crate::config::settings::{NetworkSettings, ReleaseSettings};
use crate::core::RelayError;
use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?$").expect("release tag pattern is valid")
});

/// Whether `tag` has the shape of a release tag (`v1.2.3`, `1.2.3-rc.1`).
pub fn is_release_tag(tag: &str) -> bool {
    TAG_PATTERN.is_match(tag)
}

/// Extracts the tag from a URL ending in `/releases/tag/<tag>`.
pub fn extract_tag_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [.., "releases", "tag", tag] if is_release_tag(tag) => Some((*tag).to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Resolves the newest published release tag.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    client: reqwest::Client,
    api_base: String,
    web_base: String,
    repo: String,
    timeout: Duration,
}

impl VersionResolver {
    pub fn new(release: &ReleaseSettings, network: &NetworkSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("relayctl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(network.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: release.api_base.trim_end_matches('/').to_string(),
            web_base: release.web_base.trim_end_matches('/').to_string(),
            repo: release.repo.clone(),
            timeout: network.resolve_timeout(),
        })
    }

    /// Latest release tag, from the API or the redirect fallback.
    pub async fn resolve_latest(&self) -> Result<String> {
        let api_error = match self.from_api().await {
            Ok(tag) => {
                debug!(%tag, "Resolved latest release from metadata API");
                return Ok(tag);
            }
            Err(e) => e,
        };
        warn!("Release metadata API failed ({api_error:#}), trying redirect fallback");

        match self.from_redirect().await {
            Ok(tag) => {
                debug!(%tag, "Resolved latest release from redirect");
                Ok(tag)
            }
            Err(redirect_error) => Err(RelayError::VersionResolution {
                reason: format!("metadata API: {api_error:#}; redirect: {redirect_error:#}"),
            }
            .into()),
        }
    }

    async fn from_api(&self) -> Result<String> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.repo);
        debug!("Querying {url}");

        let request = async {
            self.client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json::<LatestRelease>()
                .await
        };
        let release = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| anyhow!("timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("GET {url}"))?;

        match release.tag_name {
            Some(tag) if is_release_tag(&tag) => Ok(tag),
            Some(tag) => Err(anyhow!("'{tag}' is not a release tag")),
            None => Err(anyhow!("response has no tag_name")),
        }
    }

    async fn from_redirect(&self) -> Result<String> {
        let url = format!("{}/{}/releases/latest", self.web_base, self.repo);
        debug!("Following {url}");

        let response = tokio::time::timeout(self.timeout, self.client.get(&url).send())
            .await
            .map_err(|_| anyhow!("timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("GET {url}"))?;

        let final_url = response.url().to_string();
        extract_tag_from_url(&final_url)
            .ok_or_else(|| anyhow!("redirect ended at {final_url}, which names no release tag"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::find_relay_error;
    use crate::test_utils::CannedHttp;

    fn resolver_for(base: &str) -> VersionResolver {
        let mut settings = Settings::default();
        settings.release.api_base = base.to_string();
        settings.release.web_base = base.to_string();
        settings.release.repo = "acme/relay".to_string();
        settings.network.resolve_timeout_secs = 2;
        VersionResolver::new(&settings.release, &settings.network).unwrap()
    }

    #[test]
    fn test_release_tag_shapes() {
        assert!(is_release_tag("v1.2.0"));
        assert!(is_release_tag("1.2.0"));
        assert!(is_release_tag("v0.5.10-rc.1"));
        assert!(!is_release_tag("latest"));
        assert!(!is_release_tag("v1.2"));
        assert!(!is_release_tag("v1.2.0/../x"));
        assert!(!is_release_tag(""));
    }

    #[test]
    fn test_extract_tag_from_url() {
        assert_eq!(
            extract_tag_from_url("https://github.com/acme/relay/releases/tag/v1.3.0").as_deref(),
            Some("v1.3.0")
        );
        assert_eq!(
            extract_tag_from_url("https://github.com/acme/relay/releases/tag/v1.3.0/").as_deref(),
            Some("v1.3.0")
        );
        assert_eq!(extract_tag_from_url("https://github.com/acme/relay/releases"), None);
        assert_eq!(extract_tag_from_url("https://github.com/acme/relay/releases/tag/nightly"), None);
        assert_eq!(extract_tag_from_url("not a url"), None);
    }

    #[tokio::test]
    async fn test_resolve_from_api() {
        let server = CannedHttp::start()
            .await
            .json("/repos/acme/relay/releases/latest", r#"{"tag_name":"v1.2.0"}"#);
        let resolver = resolver_for(&server.base_url());

        assert_eq!(resolver.resolve_latest().await.unwrap(), "v1.2.0");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_redirect() {
        let server = CannedHttp::start().await;
        let base = server.base_url();
        let server = server
            .status("/repos/acme/relay/releases/latest", 403)
            .redirect("/acme/relay/releases/latest", &format!("{base}/acme/relay/releases/tag/v1.3.0"))
            .text("/acme/relay/releases/tag/v1.3.0", "release page");
        let resolver = resolver_for(&server.base_url());

        assert_eq!(resolver.resolve_latest().await.unwrap(), "v1.3.0");
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_tag_from_api() {
        let server = CannedHttp::start().await;
        let base = server.base_url();
        let server = server
            .json("/repos/acme/relay/releases/latest", r#"{"tag_name":"latest-build"}"#)
            .redirect("/acme/relay/releases/latest", &format!("{base}/acme/relay/releases/tag/v2.0.0"))
            .text("/acme/relay/releases/tag/v2.0.0", "release page");
        let resolver = resolver_for(&server.base_url());

        assert_eq!(resolver.resolve_latest().await.unwrap(), "v2.0.0");
    }

    #[tokio::test]
    async fn test_resolve_fails_when_both_paths_fail() {
        let server = CannedHttp::start().await;
        let resolver = resolver_for(&server.base_url());

        let err = resolver.resolve_latest().await.unwrap_err();
        assert!(matches!(find_relay_error(&err), Some(RelayError::VersionResolution { .. })));
    }
}
