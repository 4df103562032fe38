//! Backup directory listing

use anyhow::{Context, Result};
use partsafe_common::BackupArtifact;
use std::path::Path;
use walkdir::WalkDir;

/// Regular files directly inside `dir` whose name passes `keep`
///
/// A missing directory yields an empty list.
pub fn scan_files<F>(dir: &Path, keep: F) -> Result<Vec<BackupArtifact>>
where
    F: Fn(&str) -> bool,
{
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !keep(name) {
            continue;
        }

        let metadata = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?;

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        files.push(BackupArtifact {
            path: entry.path().to_path_buf(),
            size: metadata.len(),
            modified,
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_files_filters_and_skips_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("boot_a_20240101_000000.img.gz"), b"gz").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.img.gz")).unwrap();
        std::fs::write(dir.path().join("sub.img.gz").join("inner.img.gz"), b"x").unwrap();

        let files = scan_files(dir.path(), |n| n.ends_with(".img.gz")).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 2);
        assert!(files[0].path.ends_with("boot_a_20240101_000000.img.gz"));
    }

    #[test]
    fn test_scan_missing_dir() {
        let files = scan_files(Path::new("/nonexistent/partsafe"), |_| true).unwrap();
        assert!(files.is_empty());
    }
}
