//! Partition discovery
//!
//! Builds the partition list from three inputs: the reference set of
//! allowed labels, the device's by-name symlink directory, and compressed
//! backups already sitting in the backup directory.

use crate::artifacts;
use crate::shell::{PrivilegedShell, shell_quote};
use partsafe_common::catalog::{ReferenceSet, ReferenceSource, parse_reference_lines};
use partsafe_common::naming::{COMPRESSED_SUFFIX, label_from_backup_name};
use partsafe_common::{Partition, PartitionList, PartsafeConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Sizes of resolved block devices, keyed by device path
///
/// Only successful size queries are stored.
#[derive(Debug, Default)]
pub struct SizeCache {
    sizes: Mutex<HashMap<String, u64>>,
}

impl SizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.sizes.lock().ok()?.get(path).copied()
    }

    pub fn insert(&self, path: &str, size: u64) {
        if let Ok(mut sizes) = self.sizes.lock() {
            sizes.insert(path.to_string(), size);
        }
    }

    pub fn len(&self) -> usize {
        self.sizes.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Split an `ls -la` symlink line into `(label, target)`
pub fn parse_symlink_line(line: &str) -> Option<(&str, &str)> {
    let (left, right) = line.split_once("->")?;
    let label = left.split_whitespace().last()?;
    let target = right.trim();

    if label.is_empty() || target.is_empty() {
        return None;
    }

    Some((label, target))
}

/// Merge live and backup-derived entries; live entries win, sorted by label
pub fn merge_partitions(live: Vec<Partition>, backups: Vec<Partition>) -> Vec<Partition> {
    let mut merged = live;
    let live_labels: HashSet<String> = merged.iter().map(|p| p.name.clone()).collect();
    let mut seen_backups = HashSet::new();

    for backup in backups {
        if live_labels.contains(&backup.name) || !seen_backups.insert(backup.name.clone()) {
            continue;
        }
        merged.push(backup);
    }

    merged.sort_by(|a, b| a.name.cmp(&b.name));
    merged
}

/// Scans the device for partitions matching the reference set
pub struct PartitionScanner<'a> {
    shell: &'a dyn PrivilegedShell,
    config: &'a PartsafeConfig,
    sizes: &'a SizeCache,
}

impl<'a> PartitionScanner<'a> {
    pub fn new(shell: &'a dyn PrivilegedShell, config: &'a PartsafeConfig, sizes: &'a SizeCache) -> Self {
        Self {
            shell,
            config,
            sizes,
        }
    }

    /// Labels this scan may report: the synced list, else the built-in catalog
    pub fn load_reference_set(&self) -> ReferenceSet {
        let path = self.config.reference_list.to_string_lossy();
        let out = self
            .shell
            .execute(&format!("cat {} 2>/dev/null", shell_quote(&path)));

        if out.has_output() {
            let labels = parse_reference_lines(out.lines.iter().map(|l| l.as_str()));
            if !labels.is_empty() {
                log::info!("Loaded {} reference labels from {}", labels.len(), path);
                return ReferenceSet::from_labels(labels, ReferenceSource::Synced);
            }
        }

        log::info!("No synced reference list at {}, using built-in catalog", path);
        ReferenceSet::builtin()
    }

    /// Full scan using the current reference set
    pub fn discover(&self) -> PartitionList {
        let reference = self.load_reference_set();
        self.discover_with(&reference)
    }

    /// Full scan against an explicit reference set
    pub fn discover_with(&self, reference: &ReferenceSet) -> PartitionList {
        if reference.is_empty() {
            log::warn!("Reference set is empty, nothing to scan for");
            return PartitionList::default();
        }

        let backups = self.scan_backup_partitions(reference);
        let backed_up: HashSet<&str> = backups.iter().map(|p| p.name.as_str()).collect();

        let live = self
            .scan_device_partitions(reference)
            .into_iter()
            .map(|p| {
                let is_backed_up = backed_up.contains(p.name.as_str());
                p.with_backed_up(is_backed_up)
            })
            .collect();

        let merged = merge_partitions(live, backups);
        let list = PartitionList::new(merged);

        log::info!(
            "Scan complete: {} partitions ({} on device, {} backed up)",
            list.len(),
            list.device_count(),
            list.backed_up_count()
        );

        list
    }

    /// Live partitions from the first by-name directory that lists anything
    fn scan_device_partitions(&self, reference: &ReferenceSet) -> Vec<Partition> {
        for dir in &self.config.by_name_dirs {
            let dir_str = dir.to_string_lossy();
            let out = self
                .shell
                .execute(&format!("ls -la {} 2>/dev/null", shell_quote(&dir_str)));

            if !out.has_output() {
                log::debug!("No by-name entries at {}", dir_str);
                continue;
            }

            log::info!("Scanning partitions in {}", dir_str);

            let mut seen = HashSet::new();
            let mut found = Vec::new();

            for line in &out.lines {
                let Some((label, target)) = parse_symlink_line(line) else {
                    continue;
                };

                if !reference.contains(label) || !seen.insert(label.to_string()) {
                    continue;
                }

                let size = self.partition_size(target);
                log::debug!("Found partition {} -> {} ({} bytes)", label, target, size);
                found.push(Partition::device(label, target, size));
            }

            return found;
        }

        log::warn!("No accessible by-name directory found");
        Vec::new()
    }

    /// Compressed backups whose label is in the reference set
    fn scan_backup_partitions(&self, reference: &ReferenceSet) -> Vec<Partition> {
        let files = match artifacts::scan_files(&self.config.backup_dir, |name| {
            name.ends_with(COMPRESSED_SUFFIX)
        }) {
            Ok(files) => files,
            Err(e) => {
                log::warn!("Failed to scan backup directory: {:#}", e);
                return Vec::new();
            }
        };

        files
            .into_iter()
            .filter_map(|file| {
                let name = file.path.file_name()?.to_str()?;
                let label = label_from_backup_name(name)?;
                if !reference.contains(label) {
                    return None;
                }
                Some(Partition::image(
                    label,
                    file.path.to_string_lossy(),
                    file.size,
                ))
            })
            .collect()
    }

    /// Device size in bytes, 0 when no query succeeds
    fn partition_size(&self, device_path: &str) -> u64 {
        if let Some(size) = self.sizes.get(device_path) {
            return size;
        }

        let size = self
            .query_blockdev(device_path)
            .or_else(|| self.query_sysfs(device_path));

        match size {
            Some(size) => {
                self.sizes.insert(device_path, size);
                size
            }
            None => 0,
        }
    }

    fn query_blockdev(&self, device_path: &str) -> Option<u64> {
        let out = self.shell.execute(&format!(
            "blockdev --getsize64 {} 2>/dev/null",
            shell_quote(device_path)
        ));
        if !out.success {
            return None;
        }
        out.first_line()?.parse().ok()
    }

    /// Sector count from sysfs, used when blockdev is unavailable
    fn query_sysfs(&self, device_path: &str) -> Option<u64> {
        let node = device_path.rsplit('/').next().filter(|n| !n.is_empty())?;
        let out = self.shell.execute(&format!(
            "cat {} 2>/dev/null",
            shell_quote(&format!("/sys/class/block/{node}/size"))
        ));
        if !out.success {
            return None;
        }
        let sectors: u64 = out.first_line()?.parse().ok()?;
        Some(sectors * 512)
    }
}
