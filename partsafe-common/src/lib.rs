// Shared types and utilities for partsafe

pub mod catalog;
pub mod command;
pub mod config;
pub mod format;
pub mod naming;
pub mod update;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use config::PartsafeConfig;
pub use format::{format_bytes, format_partition_size};
pub use update::{NetworkEnvironment, ReleaseAsset, ReleaseDescriptor, UpdateCheck, UpdateInfo};
pub use validation::{ValidationError, validate_partition_label};

/// A partition on the device, or a backup image standing in for one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    /// Partition label (e.g., "boot_a")
    pub name: String,
    /// Block device node for live partitions, image path for backups
    pub path: String,
    /// Size in bytes, 0 when no size query succeeded
    pub size: u64,
    /// A compressed backup of this label exists in the backup directory
    #[serde(default)]
    pub is_backed_up: bool,
    /// This entry represents a produced backup rather than a device node
    #[serde(default)]
    pub is_image_file: bool,
    #[serde(default)]
    pub is_selected: bool,
}

impl Partition {
    /// Create a live device partition
    pub fn device(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_backed_up: false,
            is_image_file: false,
            is_selected: false,
        }
    }

    /// Create an entry backed by an existing compressed image
    pub fn image(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
            is_backed_up: true,
            is_image_file: true,
            is_selected: false,
        }
    }

    /// Two partitions are the same entry when name and path match
    pub fn same_entry(&self, other: &Partition) -> bool {
        self.name == other.name && self.path == other.path
    }

    pub fn with_selected(&self, selected: bool) -> Self {
        Self {
            is_selected: selected,
            ..self.clone()
        }
    }

    pub fn with_backed_up(&self, backed_up: bool) -> Self {
        Self {
            is_backed_up: backed_up,
            ..self.clone()
        }
    }

    /// Size formatted the way partition lists display it ("x.xx MB" / "x.xx GB")
    pub fn formatted_size(&self) -> String {
        format_partition_size(self.size)
    }
}

/// Result of a discovery scan
///
/// Each scan produces a new list; entries are only changed through the
/// copy-on-write helpers below, which return a new list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionList {
    pub partitions: Vec<Partition>,
}

impl PartitionList {
    pub fn new(partitions: Vec<Partition>) -> Self {
        Self { partitions }
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Set the selection flag of a single entry
    pub fn select(&self, partition: &Partition, selected: bool) -> Self {
        Self::new(
            self.partitions
                .iter()
                .map(|p| {
                    if p.same_entry(partition) {
                        p.with_selected(selected)
                    } else {
                        p.clone()
                    }
                })
                .collect(),
        )
    }

    /// Set the selection flag of every entry
    pub fn select_all(&self, selected: bool) -> Self {
        Self::new(
            self.partitions
                .iter()
                .map(|p| p.with_selected(selected))
                .collect(),
        )
    }

    pub fn selected(&self) -> Vec<Partition> {
        self.partitions
            .iter()
            .filter(|p| p.is_selected)
            .cloned()
            .collect()
    }

    /// Mark every entry with the given label as backed up
    pub fn mark_backed_up(&self, name: &str) -> Self {
        Self::new(
            self.partitions
                .iter()
                .map(|p| {
                    if p.name == name {
                        p.with_backed_up(true)
                    } else {
                        p.clone()
                    }
                })
                .collect(),
        )
    }

    pub fn find(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Number of live device entries (not backup images)
    pub fn device_count(&self) -> usize {
        self.partitions.iter().filter(|p| !p.is_image_file).count()
    }

    pub fn backed_up_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.is_backed_up).count()
    }
}

/// Provenance of root access on the device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RootType {
    None,
    /// Root manager integrated into the kernel (KernelSU)
    KernelIntegrated,
    /// Root-management app (Magisk)
    RootManager,
    Other,
}

impl RootType {
    pub fn describe(&self) -> &'static str {
        match self {
            RootType::None => "no root access",
            RootType::KernelIntegrated => "KernelSU",
            RootType::RootManager => "Magisk",
            RootType::Other => "generic su",
        }
    }
}

/// Outcome of a root check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootStatus {
    pub has_access: bool,
    pub root_type: RootType,
}

impl RootStatus {
    pub fn denied() -> Self {
        Self {
            has_access: false,
            root_type: RootType::None,
        }
    }

    pub fn granted(root_type: RootType) -> Self {
        Self {
            has_access: true,
            root_type,
        }
    }
}

/// Progress event emitted by the backup pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupProgress {
    /// 0-100
    pub percent: u8,
    pub status: String,
    #[serde(default)]
    pub current_file: Option<String>,
}

/// Outcome of a single partition backup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupResult {
    pub success: bool,
    pub message: String,
    /// Produced artifacts (compressed image and sidecar)
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub compressed_size: u64,
    #[serde(default)]
    pub compression_ratio: u8,
    /// Progress values reported during the run
    #[serde(default)]
    pub checkpoints: Vec<u8>,
}

impl BackupResult {
    pub fn failed(message: impl Into<String>, checkpoints: Vec<u8>) -> Self {
        Self {
            success: false,
            message: message.into(),
            checkpoints,
            ..Default::default()
        }
    }
}

/// Outcome of a batch backup into a single archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub archive: Option<PathBuf>,
    /// Labels written into the archive
    #[serde(default)]
    pub archived: Vec<String>,
    /// Labels whose raw copy failed
    #[serde(default)]
    pub failed: Vec<String>,
}

/// A backup artifact found in the backup directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size: u64,
    /// Modification time as Unix timestamp
    pub modified: i64,
}

/// Result of an operation reported back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
