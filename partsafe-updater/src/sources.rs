//! Update source and download mirror selection
//!
//! Picks release descriptor URLs and download mirror prefixes for the
//! detected network environment, preferring whatever worked last time.

use crate::network::{self, ReachabilityProbe};
use crate::prefs::{SourcePreferences, SourceState};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use partsafe_common::{NetworkEnvironment, PartsafeConfig};

const GITHUB_HOST: &str = "github.com";
const GITHUB_ORIGIN: &str = "https://github.com";

/// How long a detected environment stays valid
pub fn environment_ttl() -> Duration {
    Duration::hours(24)
}

/// Release descriptor URLs for an environment, in priority order
///
/// Environments without their own list use the global one.
pub fn update_sources(environment: NetworkEnvironment, api_url: &str, cdn_url: &str) -> Vec<String> {
    match environment {
        NetworkEnvironment::ChinaMainland => vec![
            format!("https://ghproxy.com/{api_url}"),
            format!("https://mirror.ghproxy.com/{api_url}"),
            format!("https://gh-proxy.com/{api_url}"),
            cdn_url.to_string(),
        ],
        _ => vec![api_url.to_string(), format!("https://ghproxy.com/{api_url}")],
    }
}

/// Download mirror prefixes for an environment; "" means the direct URL
pub fn download_mirrors(environment: NetworkEnvironment) -> &'static [&'static str] {
    match environment {
        NetworkEnvironment::ChinaMainland => &[
            "https://ghproxy.com/",
            "https://mirror.ghproxy.com/",
            "https://gh-proxy.com/",
            "https://download.fastgit.org/",
            "",
        ],
        _ => &["", "https://ghproxy.com/"],
    }
}

/// Mirror prefix of a URL that worked, i.e. everything before `https://github.com`
pub fn mirror_prefix(url: &str) -> String {
    match url.find(GITHUB_ORIGIN) {
        Some(index) if index > 0 => url[..index].to_string(),
        _ => String::new(),
    }
}

fn apply_mirror(prefix: &str, url: &str) -> String {
    format!("{prefix}{url}")
}

/// Chooses update sources and mirrors using persisted preferences
pub struct SourceSelector<'a> {
    prefs: &'a SourcePreferences,
    probe: &'a dyn ReachabilityProbe,
    api_url: String,
    cdn_url: String,
}

impl<'a> SourceSelector<'a> {
    pub fn new(
        prefs: &'a SourcePreferences,
        probe: &'a dyn ReachabilityProbe,
        config: &PartsafeConfig,
    ) -> Self {
        Self {
            prefs,
            probe,
            api_url: config.release_api_url(),
            cdn_url: config.release_cdn_url(),
        }
    }

    fn state(&self) -> SourceState {
        self.prefs.load().unwrap_or_else(|e| {
            log::warn!("Ignoring unreadable source preferences: {e:#}");
            SourceState::default()
        })
    }

    /// Cached environment, re-probed once the cache is older than a day
    pub fn detect_environment(&self) -> NetworkEnvironment {
        self.detect_environment_at(Utc::now())
    }

    pub fn detect_environment_at(&self, now: DateTime<Utc>) -> NetworkEnvironment {
        let state = self.state();

        if let (Some(environment), Some(tested)) = (state.network_environment, state.last_test_time)
        {
            let age = now.signed_duration_since(tested);
            if age >= Duration::zero() && age < environment_ttl() {
                log::debug!("Using cached network environment {:?}", environment);
                return environment;
            }
        }

        let environment = network::detect_environment(self.probe);

        if let Err(e) = self.prefs.update(|s| {
            s.network_environment = Some(environment);
            s.last_test_time = Some(now);
        }) {
            log::warn!("Failed to cache network environment: {e:#}");
        }

        environment
    }

    /// Release descriptor URLs to try, last successful one first
    pub fn best_sources(&self) -> Vec<String> {
        let mut sources = update_sources(self.detect_environment(), &self.api_url, &self.cdn_url);

        if let Some(last) = self.state().last_successful_source {
            if let Some(index) = sources.iter().position(|s| *s == last) {
                let preferred = sources.remove(index);
                sources.insert(0, preferred);
            }
        }

        sources
    }

    /// Preferred download URL for `url`
    ///
    /// URLs that don't point at GitHub are returned unchanged.
    pub fn best_mirror(&self, url: &str) -> String {
        if !url.contains(GITHUB_HOST) {
            return url.to_string();
        }

        let mirrors = download_mirrors(self.detect_environment());
        let remembered = self
            .state()
            .last_successful_mirror
            .filter(|m| mirrors.contains(&m.as_str()));

        match remembered {
            Some(prefix) => apply_mirror(&prefix, url),
            None => apply_mirror(mirrors.first().copied().unwrap_or_default(), url),
        }
    }

    /// Every download URL to try, starting with [`Self::best_mirror`]
    pub fn mirror_candidates(&self, url: &str) -> Vec<String> {
        let best = self.best_mirror(url);
        if !url.contains(GITHUB_HOST) {
            return vec![best];
        }

        let mut candidates = vec![best];
        for prefix in download_mirrors(self.detect_environment()) {
            let candidate = apply_mirror(prefix, url);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    pub fn record_successful_source(&self, source: &str) -> Result<()> {
        self.prefs
            .update(|s| s.last_successful_source = Some(source.to_string()))?;
        Ok(())
    }

    /// Remember the mirror prefix of a download URL that worked
    pub fn record_successful_mirror(&self, download_url: &str) -> Result<()> {
        let prefix = mirror_prefix(download_url);
        self.prefs
            .update(|s| s.last_successful_mirror = Some(prefix))?;
        Ok(())
    }

    /// Forget the cached environment so the next call probes again
    pub fn clear_cache(&self) -> Result<()> {
        self.prefs.update(|s| {
            s.network_environment = None;
            s.last_test_time = None;
        })?;
        Ok(())
    }

    pub fn environment_description(&self) -> String {
        self.detect_environment().describe().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FixedProbe;
    use crate::network::{INSIDE_ENDPOINT, OUTSIDE_ENDPOINT};
    use tempfile::TempDir;

    const API: &str = "https://api.github.com/repos/owner/app/releases/latest";
    const CDN: &str = "https://cdn.jsdelivr.net/gh/owner/app@main/release-info.json";
    const ASSET: &str = "https://github.com/owner/app/releases/download/v1.1/app.apk";

    fn test_config() -> PartsafeConfig {
        PartsafeConfig {
            release_repo: "owner/app".to_string(),
            ..Default::default()
        }
    }

    fn prefs_with(dir: &TempDir, environment: NetworkEnvironment) -> SourcePreferences {
        let prefs = SourcePreferences::new(dir.path().join("prefs.json"));
        prefs
            .save(&SourceState {
                network_environment: Some(environment),
                last_test_time: Some(Utc::now()),
                ..Default::default()
            })
            .unwrap();
        prefs
    }

    #[test]
    fn test_mirror_prefix() {
        assert_eq!(mirror_prefix(&format!("https://ghproxy.com/{ASSET}")), "https://ghproxy.com/");
        assert_eq!(mirror_prefix(ASSET), "");
        assert_eq!(mirror_prefix("https://example.com/app.apk"), "");
    }

    #[test]
    fn test_source_tables() {
        let china = update_sources(NetworkEnvironment::ChinaMainland, API, CDN);
        assert_eq!(china.len(), 4);
        assert_eq!(china[0], format!("https://ghproxy.com/{API}"));
        assert_eq!(china[3], CDN);

        let limited = update_sources(NetworkEnvironment::Limited, API, CDN);
        assert_eq!(limited, update_sources(NetworkEnvironment::Global, API, CDN));
        assert_eq!(limited[0], API);

        assert_eq!(download_mirrors(NetworkEnvironment::Unknown), &["", "https://ghproxy.com/"]);
    }

    #[test]
    fn test_best_sources_prefers_last_success() {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_with(&dir, NetworkEnvironment::ChinaMainland);
        let probe = FixedProbe::new(&[]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        let defaults = selector.best_sources();
        selector.record_successful_source(&defaults[2]).unwrap();

        let reordered = selector.best_sources();
        assert_eq!(reordered[0], defaults[2]);
        assert_eq!(reordered[1..], [defaults[0].clone(), defaults[1].clone(), defaults[3].clone()]);

        // A remembered source from another environment is ignored
        selector.record_successful_source("https://elsewhere/x").unwrap();
        assert_eq!(selector.best_sources(), defaults);
        assert_eq!(probe.call_count(), 0);
    }

    #[test]
    fn test_best_mirror() {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_with(&dir, NetworkEnvironment::ChinaMainland);
        let probe = FixedProbe::new(&[]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        // Non-GitHub URLs pass through
        assert_eq!(selector.best_mirror("https://example.com/a.apk"), "https://example.com/a.apk");

        // First mirror by default
        assert_eq!(selector.best_mirror(ASSET), format!("https://ghproxy.com/{ASSET}"));

        // Remembered direct download wins when it is a member
        selector.record_successful_mirror(ASSET).unwrap();
        assert_eq!(selector.best_mirror(ASSET), ASSET);

        // Remembered prefix that isn't in the list is ignored
        selector
            .record_successful_mirror(&format!("https://other.proxy/{ASSET}"))
            .unwrap();
        assert_eq!(selector.best_mirror(ASSET), format!("https://ghproxy.com/{ASSET}"));
    }

    #[test]
    fn test_best_mirror_global_is_direct() {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_with(&dir, NetworkEnvironment::Global);
        let probe = FixedProbe::new(&[]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        assert_eq!(selector.best_mirror(ASSET), ASSET);
    }

    #[test]
    fn test_mirror_candidates_order() {
        let dir = TempDir::new().unwrap();
        let prefs = prefs_with(&dir, NetworkEnvironment::ChinaMainland);
        let probe = FixedProbe::new(&[]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        selector
            .record_successful_mirror(&format!("https://gh-proxy.com/{ASSET}"))
            .unwrap();
        let candidates = selector.mirror_candidates(ASSET);

        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0], format!("https://gh-proxy.com/{ASSET}"));
        assert_eq!(candidates[1], format!("https://ghproxy.com/{ASSET}"));
        assert_eq!(candidates[4], ASSET);

        assert_eq!(
            selector.mirror_candidates("https://example.com/a.apk"),
            vec!["https://example.com/a.apk".to_string()]
        );
    }

    #[test]
    fn test_environment_cache_and_expiry() {
        let dir = TempDir::new().unwrap();
        let prefs = SourcePreferences::new(dir.path().join("prefs.json"));
        let probe = FixedProbe::new(&[INSIDE_ENDPOINT]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        let now = Utc::now();
        assert_eq!(selector.detect_environment_at(now), NetworkEnvironment::ChinaMainland);
        assert_eq!(probe.call_count(), 2);

        // Within the day: cached
        selector.detect_environment_at(now + Duration::hours(23));
        assert_eq!(probe.call_count(), 2);

        // Expired: probed again
        selector.detect_environment_at(now + Duration::hours(25));
        assert_eq!(probe.call_count(), 4);

        // Cleared: probed again
        selector.clear_cache().unwrap();
        assert!(prefs.load().unwrap().network_environment.is_none());
        selector.detect_environment();
        assert_eq!(probe.call_count(), 6);
    }

    #[test]
    fn test_environment_description() {
        let dir = TempDir::new().unwrap();
        let prefs = SourcePreferences::new(dir.path().join("prefs.json"));
        let probe = FixedProbe::new(&[OUTSIDE_ENDPOINT, INSIDE_ENDPOINT]);
        let selector = SourceSelector::new(&prefs, &probe, &test_config());

        assert_eq!(
            selector.environment_description(),
            "global network (direct GitHub access)"
        );
    }
}
