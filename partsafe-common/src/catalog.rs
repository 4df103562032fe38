//! Reference partition names
//!
//! Discovery only reports labels found in a reference set: the synchronized
//! reference list when one is present, otherwise the built-in catalog below.

use std::collections::BTreeSet;

/// Labels of the partitions found on Qualcomm A/B devices
pub const BUILTIN_CATALOG: &[&str] = &[
    "abl_a", "abl_b", "ALIGN_TO_128K_1", "ALIGN_TO_128K_2", "aop_a", "aop_b",
    "bluetooth_a", "bluetooth_b", "boot_a", "boot_b", "cache", "cdt",
    "cmnlib_a", "cmnlib_b", "cmnlib64_a", "cmnlib64_b", "ddr", "devcfg_a", "devcfg_b",
    "devinfo", "dip", "dsp_a", "dsp_b", "dtbo_a", "dtbo_b", "fdemeta", "fsc", "fsg",
    "hyp_a", "hyp_b", "imagefv_a", "imagefv_b", "keymaster_a", "keymaster_b",
    "keystore", "limits", "logdump", "logfs", "mdtp_a", "mdtp_b", "mdtpsecapp_a", "mdtpsecapp_b",
    "misc", "modem_a", "modem_b", "modemst1", "modemst2", "msadp", "multiimgoem_a", "multiimgoem_b",
    "multiimgqti_a", "multiimgqti_b", "persist", "qupfw_a", "qupfw_b", "rawdump",
    "recovery_a", "recovery_b", "sec", "spunvm", "splash", "spss_a", "spss_b",
    "ssd", "storsec_a", "storsec_b", "system_a", "system_b", "systemrw_a", "systemrw_b",
    "toolsfv", "tz_a", "tz_b", "uefisecapp_a", "uefisecapp_b", "userdata",
    "vbmeta_a", "vbmeta_b", "vbmeta_system_a", "vbmeta_system_b", "vendor_a", "vendor_b",
    "xbl_a", "xbl_b", "xbl_config_a", "xbl_config_b",
];

/// Where the reference set of a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSource {
    /// Synchronized reference list file
    Synced,
    /// Built-in catalog
    Builtin,
}

/// Set of partition labels a scan is allowed to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSet {
    pub labels: BTreeSet<String>,
    pub source: ReferenceSource,
}

impl ReferenceSet {
    pub fn builtin() -> Self {
        Self {
            labels: BUILTIN_CATALOG.iter().map(|s| s.to_string()).collect(),
            source: ReferenceSource::Builtin,
        }
    }

    pub fn from_labels<I, S>(labels: I, source: ReferenceSource) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            source,
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Parse reference list lines (`<label>.img`), ignoring everything else
pub fn parse_reference_lines<'a, I>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .map(str::trim)
        .filter_map(|line| line.strip_suffix(".img"))
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}
