//! Connection descriptors for clients.
//!
//! Pure formatting over a [`ServiceConfig`], the host's public address and a
//! display name. Two descriptors are produced: a share URI and a one-line
//! proxy-list entry (a JSON object, which YAML also reads as a flow
//! mapping).

use crate::config::ServiceConfig;
use crate::config::settings::{ExportSettings, NetworkSettings};
use crate::core::RelayError;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use tracing::debug;
use url::Url;

/// What a descriptor is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// `scheme://credential@host:port?...#name`
    Uri,
    /// `- {name: ..., type: ..., ...}`
    ProxyEntry,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri => write!(f, "URI"),
            Self::ProxyEntry => write!(f, "Proxy entry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: DescriptorKind,
    pub text: String,
}

#[derive(Serialize)]
struct ProxyEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    server: &'a str,
    port: u16,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sni: Option<&'a str>,
    #[serde(rename = "skip-cert-verify")]
    skip_cert_verify: bool,
}

/// Renders the share URI and proxy entry for `config`.
pub fn render_descriptors(
    config: &ServiceConfig,
    public_ip: &str,
    host_name: &str,
    settings: &ExportSettings,
) -> Result<Vec<Descriptor>> {
    let ip: IpAddr = public_ip.trim().parse().map_err(|_| {
        RelayError::invalid_config("public_ip", format!("'{public_ip}' is not an IP address"))
    })?;
    let server = ip.to_string();
    let host = match ip {
        IpAddr::V4(_) => server.clone(),
        IpAddr::V6(_) => format!("[{server}]"),
    };
    let mask = config.mask_domain.as_deref().filter(|m| !m.is_empty());

    let mut uri = Url::parse(&format!("{}://{host}:{}", settings.protocol, config.port))
        .with_context(|| format!("Invalid protocol '{}'", settings.protocol))?;
    uri.set_username(&config.credential)
        .map_err(|()| RelayError::invalid_config("credential", "cannot be used in a URI"))?;
    if mask.is_some() || settings.insecure {
        let mut query = uri.query_pairs_mut();
        if let Some(mask) = mask {
            query.append_pair("sni", mask);
        }
        if settings.insecure {
            query.append_pair("insecure", "1");
        }
    }
    uri.set_fragment(Some(host_name));

    let entry = ProxyEntry {
        name: host_name,
        kind: &settings.protocol,
        server: &server,
        port: config.port,
        password: &config.credential,
        sni: mask,
        skip_cert_verify: settings.insecure,
    };
    let entry = serde_json::to_string(&entry).context("Failed to render proxy entry")?;

    Ok(vec![
        Descriptor {
            kind: DescriptorKind::Uri,
            text: uri.to_string(),
        },
        Descriptor {
            kind: DescriptorKind::ProxyEntry,
            text: format!("- {entry}"),
        },
    ])
}

/// Asks `export.public_ip_url` for this host's public address.
pub async fn fetch_public_ip(settings: &ExportSettings, network: &NetworkSettings) -> Result<String> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("relayctl/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(network.connect_timeout())
        .timeout(network.resolve_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let body = client
        .get(&settings.public_ip_url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("Failed to query {}", settings.public_ip_url))?
        .text()
        .await
        .context("Failed to read public IP response")?;

    let ip: IpAddr = body.trim().parse().with_context(|| {
        format!("{} returned '{}', not an IP address", settings.public_ip_url, body.trim())
    })?;
    debug!("Public IP is {ip}");
    Ok(ip.to_string())
}
