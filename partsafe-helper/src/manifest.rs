//! Backup metadata: `.info` sidecars and the batch `backup_info.txt`

use crate::shell::PrivilegedShell;
use anyhow::{Context, Result};
use partsafe_common::{Partition, format_bytes};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const UNKNOWN: &str = "unknown";

/// Device identifiers read from system properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub brand: String,
    pub android_version: String,
    pub sdk: String,
    pub board: String,
    pub hardware: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            model: UNKNOWN.to_string(),
            brand: UNKNOWN.to_string(),
            android_version: UNKNOWN.to_string(),
            sdk: UNKNOWN.to_string(),
            board: UNKNOWN.to_string(),
            hardware: UNKNOWN.to_string(),
        }
    }
}

impl DeviceInfo {
    /// Read identifiers with `getprop`; missing ones become "unknown"
    pub fn collect(shell: &dyn PrivilegedShell) -> Self {
        let prop = |key: &str| {
            shell
                .execute(&format!("getprop {key}"))
                .first_line()
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        Self {
            model: prop("ro.product.model"),
            brand: prop("ro.product.brand"),
            android_version: prop("ro.build.version.release"),
            sdk: prop("ro.build.version.sdk"),
            board: prop("ro.product.board"),
            hardware: prop("ro.hardware"),
        }
    }
}

/// Space saved by compression, as a whole percentage
///
/// 0 when the original size is unknown or compression made the file larger.
pub fn compression_ratio(original: u64, compressed: u64) -> u8 {
    if original == 0 || compressed >= original {
        return 0;
    }
    ((original - compressed) * 100 / original) as u8
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Contents of a single-backup `.info` sidecar
#[derive(Debug, Clone)]
pub struct SidecarInfo<'a> {
    pub partition: &'a Partition,
    pub timestamp: &'a str,
    pub device: &'a DeviceInfo,
    pub original_size: u64,
    pub compressed_name: &'a str,
    pub compressed_size: u64,
    pub sha256: &'a str,
}

impl SidecarInfo<'_> {
    pub fn ratio(&self) -> u8 {
        compression_ratio(self.original_size, self.compressed_size)
    }

    /// Render as `key: value` lines
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "partition_name: {}", self.partition.name);
        let _ = writeln!(out, "partition_path: {}", self.partition.path);
        let _ = writeln!(out, "partition_size: {}", self.original_size);
        let _ = writeln!(out, "backup_time: {}", self.timestamp);
        let _ = writeln!(out, "device_model: {}", self.device.model);
        let _ = writeln!(out, "device_brand: {}", self.device.brand);
        let _ = writeln!(out, "android_version: {}", self.device.android_version);
        let _ = writeln!(out, "sdk_version: {}", self.device.sdk);
        let _ = writeln!(out, "board: {}", self.device.board);
        let _ = writeln!(out, "hardware: {}", self.device.hardware);
        let _ = writeln!(out, "compression: gzip");
        let _ = writeln!(out, "compressed_file: {}", self.compressed_name);
        let _ = writeln!(out, "compressed_size: {}", self.compressed_size);
        let _ = writeln!(out, "sha256: {}", self.sha256);
        let _ = writeln!(out, "compression_ratio: {}%", self.ratio());
        out
    }
}

/// Render the `backup_info.txt` manifest stored inside a batch archive
pub fn render_batch_manifest(
    device: &DeviceInfo,
    timestamp: &str,
    archived: &[(Partition, u64)],
    failed: &[String],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "partsafe batch backup");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "backup_time: {timestamp}");
    let _ = writeln!(out, "device: {} {}", device.brand, device.model);
    let _ = writeln!(
        out,
        "android: {} (sdk {})",
        device.android_version, device.sdk
    );
    let _ = writeln!(out, "board: {} / {}", device.board, device.hardware);
    let _ = writeln!(out, "partition_count: {}", archived.len());
    let _ = writeln!(out);

    let _ = writeln!(out, "[partitions]");
    for (partition, size) in archived {
        let _ = writeln!(
            out,
            "{}.img  {}  {} ({})",
            partition.name,
            partition.path,
            size,
            format_bytes(*size)
        );
    }

    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "[failed]");
        for label in failed {
            let _ = writeln!(out, "{label}");
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "[notes]");
    let _ = writeln!(
        out,
        "Images are raw partition dumps. Only flash them back to the same device model."
    );
    let _ = writeln!(
        out,
        "Flashing the wrong image can leave the device unbootable."
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::testing::ScriptedShell;
    use tempfile::TempDir;

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(1000, 250), 75);
        assert_eq!(compression_ratio(1000, 999), 0);
        assert_eq!(compression_ratio(3, 2), 33);
        assert_eq!(compression_ratio(0, 10), 0);
        assert_eq!(compression_ratio(10, 20), 0);
        assert_eq!(compression_ratio(10, 0), 100);
    }

    #[test]
    fn test_sha256_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"abc").unwrap();

        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sha256_file(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_device_info_collect() {
        let shell = ScriptedShell::new()
            .on_lines("getprop ro.product.model", &["Pixel 7"])
            .on_lines("getprop ro.product.brand", &["google"])
            .on_lines("getprop ro.build.version.release", &["14"])
            .on_lines("getprop ro.product.board", &[""]);

        let info = DeviceInfo::collect(&shell);
        assert_eq!(info.model, "Pixel 7");
        assert_eq!(info.brand, "google");
        assert_eq!(info.android_version, "14");
        assert_eq!(info.sdk, "unknown");
        assert_eq!(info.board, "unknown");
    }

    #[test]
    fn test_sidecar_render() {
        let partition = Partition::device("boot_a", "/dev/block/sde11", 1000);
        let device = DeviceInfo::default();
        let sidecar = SidecarInfo {
            partition: &partition,
            timestamp: "20240101_000000",
            device: &device,
            original_size: 1000,
            compressed_name: "boot_a_20240101_000000.img.gz",
            compressed_size: 400,
            sha256: "deadbeef",
        };

        let text = sidecar.render();
        assert!(text.contains("partition_name: boot_a\n"));
        assert!(text.contains("compressed_file: boot_a_20240101_000000.img.gz\n"));
        assert!(text.contains("sha256: deadbeef\n"));
        assert!(text.contains("compression_ratio: 60%\n"));
        assert!(text.lines().all(|l| l.contains(": ")));
    }

    #[test]
    fn test_batch_manifest_lists_failures() {
        let archived = vec![(Partition::device("boot_a", "/dev/block/x1", 10), 10)];
        let text = render_batch_manifest(
            &DeviceInfo::default(),
            "20240101_000000",
            &archived,
            &["vendor_a".to_string()],
        );

        assert!(text.contains("partition_count: 1"));
        assert!(text.contains("boot_a.img  /dev/block/x1  10"));
        assert!(text.contains("[failed]\nvendor_a\n"));

        let clean = render_batch_manifest(&DeviceInfo::default(), "ts", &archived, &[]);
        assert!(!clean.contains("[failed]"));
    }
}
