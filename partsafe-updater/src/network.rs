//! HTTP plumbing: reachability probes and release descriptor fetches

use anyhow::{Context, Result, bail};
use partsafe_common::NetworkEnvironment;
use reqwest::blocking::Client;
use std::time::Duration;

/// Endpoint only reachable from outside the mainland firewall
pub const OUTSIDE_ENDPOINT: &str = "https://api.github.com";
/// Endpoint reachable from inside the mainland firewall
pub const INSIDE_ENDPOINT: &str = "https://www.baidu.com";

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const FETCH_READ_TIMEOUT: Duration = Duration::from_secs(30);

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

fn user_agent() -> String {
    format!("partsafe-updater/{}", env!("CARGO_PKG_VERSION"))
}

/// Answers whether a URL responds successfully
pub trait ReachabilityProbe {
    fn is_reachable(&self, url: &str) -> bool;
}

/// Classify the network from the two reference endpoints
pub fn detect_environment(probe: &dyn ReachabilityProbe) -> NetworkEnvironment {
    let outside = probe.is_reachable(OUTSIDE_ENDPOINT);
    let inside = probe.is_reachable(INSIDE_ENDPOINT);
    let environment = NetworkEnvironment::classify(outside, inside);

    log::info!(
        "Network probe: outside={} inside={} -> {:?}",
        outside,
        inside,
        environment
    );
    environment
}

/// Reachability via HTTP HEAD requests
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .timeout(PROBE_READ_TIMEOUT)
            .user_agent(user_agent())
            .build()
            .context("Failed to build probe HTTP client")?;
        Ok(Self { client })
    }
}

impl ReachabilityProbe for HttpProbe {
    fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Downloads release descriptors
pub trait ReleaseFetcher {
    /// Body of a successful GET; non-success status or empty body is an error
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP client shared by release checks and downloads
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .timeout(FETCH_READ_TIMEOUT)
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Client without an overall timeout, for large downloads
    pub fn download_client() -> Result<Client> {
        Client::builder()
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .timeout(None)
            .user_agent(user_agent())
            .build()
            .context("Failed to build download HTTP client")
    }
}

impl ReleaseFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status.as_u16());
        }

        let body = response.text().context("Failed to read response body")?;
        if body.trim().is_empty() {
            bail!("Empty response body");
        }
        Ok(body)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedProbe;
    use super::*;

    #[test]
    fn test_detect_environment() {
        let both = FixedProbe::new(&[OUTSIDE_ENDPOINT, INSIDE_ENDPOINT]);
        assert_eq!(detect_environment(&both), NetworkEnvironment::Global);

        let inside = FixedProbe::new(&[INSIDE_ENDPOINT]);
        assert_eq!(detect_environment(&inside), NetworkEnvironment::ChinaMainland);

        let outside = FixedProbe::new(&[OUTSIDE_ENDPOINT]);
        assert_eq!(detect_environment(&outside), NetworkEnvironment::Overseas);

        let none = FixedProbe::new(&[]);
        assert_eq!(detect_environment(&none), NetworkEnvironment::Limited);
        assert_eq!(none.call_count(), 2);
    }
}
