//! Release metadata and update types

use serde::{Deserialize, Serialize};

/// Network environment classification used to pick update sources
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkEnvironment {
    /// Both reference endpoints reachable
    Global,
    /// Only the endpoint inside the firewall is reachable
    ChinaMainland,
    /// Only the endpoint outside the firewall is reachable
    Overseas,
    /// Neither endpoint is reachable
    Limited,
    Unknown,
}

impl NetworkEnvironment {
    /// Classify from the reachability of the outside and inside endpoints
    pub fn classify(outside_reachable: bool, inside_reachable: bool) -> Self {
        match (outside_reachable, inside_reachable) {
            (true, true) => Self::Global,
            (false, true) => Self::ChinaMainland,
            (true, false) => Self::Overseas,
            (false, false) => Self::Limited,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Global => "global network (direct GitHub access)",
            Self::ChinaMainland => "mainland China network (using mirrors)",
            Self::Overseas => "overseas network",
            Self::Limited => "limited network",
            Self::Unknown => "unknown network",
        }
    }
}

/// Release asset as published in the release descriptor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
}

/// Release descriptor (GitHub "latest release" JSON)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// First asset whose name ends with the installer extension (case-insensitive)
    pub fn installer_asset(&self, extension: &str) -> Option<&ReleaseAsset> {
        let extension = extension.to_ascii_lowercase();
        self.assets
            .iter()
            .find(|asset| asset.name.to_ascii_lowercase().ends_with(&extension))
    }

    /// Build the update info for this release, if it ships an installer
    pub fn to_update_info(&self, extension: &str) -> Option<UpdateInfo> {
        let asset = self.installer_asset(extension)?;
        let version_name = self.tag_name.trim_start_matches('v').to_string();

        Some(UpdateInfo {
            version_code: version_ordinal(&version_name),
            version_name,
            download_url: asset.browser_download_url.clone(),
            file_size: asset.size,
            release_notes: self.body.clone().unwrap_or_default(),
            is_forced: false,
        })
    }
}

/// An available update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version_name: String,
    pub version_code: u32,
    pub download_url: String,
    pub file_size: u64,
    pub release_notes: String,
    pub is_forced: bool,
}

/// Outcome of an update check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateCheck {
    Available(UpdateInfo),
    /// A source answered and the running build is current
    UpToDate,
    /// No source produced a usable release descriptor
    Undetermined { reason: String },
}

/// Numeric ordering key of a dotted version
///
/// Sums `part[i] * 100^(2-i)` over the first three components, so "1.10"
/// is 11000 and "1.9" is 10900. A leading `v` is ignored; a component
/// that is not a number makes the whole ordinal 0.
pub fn version_ordinal(version: &str) -> u32 {
    let version = version.trim().trim_start_matches('v');
    let mut code: u32 = 0;

    for (i, part) in version.split('.').take(3).enumerate() {
        let Ok(value) = part.parse::<u32>() else {
            return 0;
        };
        code = code.saturating_add(value.saturating_mul(100u32.pow(2 - i as u32)));
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v1.7",
        "name": "partsafe 1.7",
        "body": "Faster backups",
        "published_at": "2025-01-01T00:00:00Z",
        "html_url": "https://github.com/ghhhch60-star/xy/releases/tag/v1.7",
        "assets": [
            {"name": "checksums.txt", "browser_download_url": "https://github.com/x/checksums.txt", "size": 10, "content_type": "text/plain"},
            {"name": "partsafe-1.7.APK", "browser_download_url": "https://github.com/x/partsafe-1.7.apk", "size": 4096, "content_type": "application/vnd.android.package-archive"}
        ]
    }"#;

    #[test]
    fn test_version_ordinal() {
        assert_eq!(version_ordinal("1.10"), 11000);
        assert_eq!(version_ordinal("1.9"), 10900);
        assert!(version_ordinal("1.10") > version_ordinal("1.9"));
        assert!(version_ordinal("2.0") > version_ordinal("1.99"));
        assert_eq!(version_ordinal("v1.2.3"), 10203);
        assert_eq!(version_ordinal("1.2.3.4"), 10203);
        assert_eq!(version_ordinal("1.x"), 0);
        assert_eq!(version_ordinal(""), 0);
    }

    #[test]
    fn test_classify_environment() {
        assert_eq!(NetworkEnvironment::classify(true, true), NetworkEnvironment::Global);
        assert_eq!(
            NetworkEnvironment::classify(false, true),
            NetworkEnvironment::ChinaMainland
        );
        assert_eq!(NetworkEnvironment::classify(true, false), NetworkEnvironment::Overseas);
        assert_eq!(NetworkEnvironment::classify(false, false), NetworkEnvironment::Limited);
    }

    #[test]
    fn test_release_to_update_info() {
        let release = ReleaseDescriptor::from_json(RELEASE_JSON).unwrap();
        let info = release.to_update_info(".apk").unwrap();

        assert_eq!(info.version_name, "1.7");
        assert_eq!(info.version_code, 10700);
        assert_eq!(info.download_url, "https://github.com/x/partsafe-1.7.apk");
        assert_eq!(info.file_size, 4096);
        assert_eq!(info.release_notes, "Faster backups");
        assert!(!info.is_forced);
    }

    #[test]
    fn test_release_without_installer() {
        let release = ReleaseDescriptor::from_json(
            r#"{"tag_name": "v2.0", "assets": [{"name": "notes.txt", "browser_download_url": "u"}]}"#,
        )
        .unwrap();
        assert!(release.to_update_info(".apk").is_none());
    }

    #[test]
    fn test_malformed_release() {
        assert!(ReleaseDescriptor::from_json("{\"name\": \"no tag\"}").is_err());
        assert!(ReleaseDescriptor::from_json("<html>").is_err());
    }

    #[test]
    fn test_update_check_json() {
        let json = serde_json::to_string(&UpdateCheck::UpToDate).unwrap();
        assert_eq!(json, r#"{"status":"up_to_date"}"#);
    }
}
