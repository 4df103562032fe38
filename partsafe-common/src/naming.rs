//! Backup artifact naming
//!
//! `<label>_<yyyyMMdd_HHmmss>.img.gz` for compressed images, a matching
//! `.info` sidecar, and `<prefix>_<timestamp>.zip` for batch archives.

use chrono::{DateTime, Local};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const COMPRESSED_SUFFIX: &str = ".img.gz";
pub const RAW_SUFFIX: &str = ".img";
pub const INFO_SUFFIX: &str = ".info";
pub const ARCHIVE_SUFFIX: &str = ".zip";
pub const MANIFEST_ENTRY: &str = "backup_info.txt";
pub const STAGING_PREFIX: &str = "temp_backup_";

/// Timestamp embedded in artifact names
pub fn backup_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Names of the files produced by one single-partition backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupNames {
    /// Uncompressed temporary image
    pub raw: String,
    pub compressed: String,
    pub info: String,
}

impl BackupNames {
    pub fn new(label: &str, timestamp: &str) -> Self {
        let stem = format!("{label}_{timestamp}");
        Self {
            raw: format!("{stem}{RAW_SUFFIX}"),
            compressed: format!("{stem}{COMPRESSED_SUFFIX}"),
            info: format!("{stem}{INFO_SUFFIX}"),
        }
    }
}

/// Batch archive file name
pub fn archive_name(prefix: &str, timestamp: &str) -> String {
    format!("{prefix}_{timestamp}{ARCHIVE_SUFFIX}")
}

/// Staging directory name used while building a batch archive
pub fn staging_dir_name(timestamp: &str) -> String {
    format!("{STAGING_PREFIX}{timestamp}")
}

/// Archive entry name for a partition
pub fn archive_entry_name(label: &str) -> String {
    format!("{label}{RAW_SUFFIX}")
}

/// Extract the partition label from a compressed backup file name
///
/// `abl_a_20250929_143022.img.gz` yields `abl_a`. The last two
/// `_`-separated components (date and time) are dropped.
pub fn label_from_backup_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(COMPRESSED_SUFFIX)?;
    let (rest, _time) = stem.rsplit_once('_')?;
    let (label, _date) = rest.rsplit_once('_')?;
    if label.is_empty() { None } else { Some(label) }
}

/// Whether a file name is any partsafe artifact worth listing
pub fn is_backup_artifact(file_name: &str, batch_prefix: &str) -> bool {
    file_name.ends_with(COMPRESSED_SUFFIX)
        || file_name.ends_with(INFO_SUFFIX)
        || (file_name.starts_with(batch_prefix) && file_name.ends_with(ARCHIVE_SUFFIX))
}
