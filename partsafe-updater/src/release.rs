//! Update checks against the release sources

use crate::network::ReleaseFetcher;
use crate::sources::SourceSelector;
use anyhow::{Context, Result};
use partsafe_common::update::version_ordinal;
use partsafe_common::{ReleaseDescriptor, UpdateCheck, UpdateInfo};

/// Fetch a descriptor and extract the installer; any problem fails the source
fn fetch_update_info(fetcher: &dyn ReleaseFetcher, url: &str, extension: &str) -> Result<UpdateInfo> {
    let body = fetcher.fetch(url)?;
    let release = ReleaseDescriptor::from_json(&body).context("Malformed release descriptor")?;

    release
        .to_update_info(extension)
        .with_context(|| format!("Release {} has no {} asset", release.tag_name, extension))
}

/// Ask each source in turn for the latest release
///
/// The first source that yields a usable release decides the outcome and is
/// remembered. Never fails: when every source fails the result is
/// [`UpdateCheck::Undetermined`].
pub fn check_for_update(
    selector: &SourceSelector,
    fetcher: &dyn ReleaseFetcher,
    current_version: &str,
    extension: &str,
) -> UpdateCheck {
    let current = version_ordinal(current_version);
    let mut last_error = String::from("no update sources configured");

    for (index, source) in selector.best_sources().iter().enumerate() {
        let info = match fetch_update_info(fetcher, source, extension) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Update source {} ({}) failed: {:#}", index + 1, source, e);
                last_error = format!("source {} failed: {:#}", index + 1, e);
                continue;
            }
        };

        if let Err(e) = selector.record_successful_source(source) {
            log::warn!("Failed to remember update source: {e:#}");
        }

        log::info!(
            "Latest release {} ({}), running {} ({})",
            info.version_name,
            info.version_code,
            current_version,
            current
        );

        return if info.version_code > current {
            UpdateCheck::Available(info)
        } else {
            UpdateCheck::UpToDate
        };
    }

    UpdateCheck::Undetermined {
        reason: format!(
            "All update sources are unavailable ({}). Last error: {}",
            selector.environment_description(),
            last_error
        ),
    }
}
