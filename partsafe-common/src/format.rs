//! Formatting utilities for displaying sizes and times

/// Format bytes as human-readable size using binary units (KiB, MiB, GiB)
///
/// # Examples
/// ```
/// use partsafe_common::format_bytes;
/// assert_eq!(format_bytes(1024), "1.00 KiB");
/// assert_eq!(format_bytes(1536), "1.50 KiB");
/// assert_eq!(format_bytes(1048576), "1.00 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format a partition size in decimal-style MB/GB with two decimals
///
/// Sizes below 1 GiB are shown in MB, larger ones in GB. A size of 0
/// (unknown) renders as "0.00 MB".
///
/// # Examples
/// ```
/// use partsafe_common::format_partition_size;
/// assert_eq!(format_partition_size(1048576), "1.00 MB");
/// assert_eq!(format_partition_size(3221225472), "3.00 GB");
/// ```
pub fn format_partition_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: u64 = 1024 * 1024 * 1024;

    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / (MIB * 1024.0))
    } else {
        format!("{:.2} MB", bytes as f64 / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(1048576), "1.00 MiB");
        assert_eq!(format_bytes(1073741824), "1.00 GiB");
    }

    #[test]
    fn test_format_partition_size() {
        assert_eq!(format_partition_size(0), "0.00 MB");
        assert_eq!(format_partition_size(524288), "0.50 MB");
        assert_eq!(format_partition_size(104857600), "100.00 MB");
        assert_eq!(format_partition_size(1073741823), "1024.00 MB");
        assert_eq!(format_partition_size(1073741824), "1.00 GB");
        assert_eq!(format_partition_size(5905580032), "5.50 GB");
    }
}
