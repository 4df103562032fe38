//! Backup operations for partsafe-helper
//! Copies a partition to a raw image, compresses it and writes a sidecar

use crate::artifacts;
use crate::manifest::{DeviceInfo, SidecarInfo, sha256_file};
use crate::shell::{PrivilegedShell, shell_quote};
use anyhow::{Context, Result, bail};
use chrono::Local;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use partsafe_common::naming::{BackupNames, STAGING_PREFIX, backup_timestamp, is_backup_artifact};
use partsafe_common::{
    BackupArtifact, BackupProgress, BackupResult, Partition, PartsafeConfig, format_bytes,
    validate_partition_label,
};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            bail!("Backup cancelled");
        }
        Ok(())
    }
}

/// Sends progress events and remembers every percentage reported
pub struct ProgressReporter {
    tx: Option<SyncSender<BackupProgress>>,
    checkpoints: Vec<u8>,
}

impl ProgressReporter {
    pub fn new(tx: Option<SyncSender<BackupProgress>>) -> Self {
        Self {
            tx,
            checkpoints: Vec::new(),
        }
    }

    pub fn report(&mut self, percent: u8, status: &str, current_file: Option<&str>) {
        let percent = percent.min(100);
        self.checkpoints.push(percent);
        log::debug!("[{percent:>3}%] {status}");

        let Some(ref tx) = self.tx else {
            return;
        };

        match tx.try_send(BackupProgress {
            percent,
            status: status.to_string(),
            current_file: current_file.map(str::to_string),
        }) {
            Ok(()) => {}
            Err(std::sync::mpsc::TrySendError::Full(_)) => {
                log::warn!("Progress channel full ({percent}%), consumer may be slow");
            }
            Err(std::sync::mpsc::TrySendError::Disconnected(_)) => {
                log::debug!("Progress channel disconnected, consumer has stopped");
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.checkpoints.last().copied()
    }

    pub fn into_checkpoints(self) -> Vec<u8> {
        self.checkpoints
    }
}

/// Position of `done` out of `total` mapped onto `start..=end`
pub(crate) fn scaled_percent(start: u8, end: u8, done: u64, total: u64) -> u8 {
    if total == 0 || end <= start {
        return start;
    }
    let span = u64::from(end - start);
    let offset = (done.min(total) * span / total) as u8;
    start + offset
}

pub(crate) fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Single-partition and batch backups into the configured backup directory
pub struct BackupPipeline<'a> {
    pub(crate) shell: &'a dyn PrivilegedShell,
    pub(crate) config: &'a PartsafeConfig,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(shell: &'a dyn PrivilegedShell, config: &'a PartsafeConfig) -> Self {
        Self { shell, config }
    }

    /// Back up one partition to `<label>_<ts>.img.gz` plus a `.info` sidecar
    ///
    /// Never returns an error: failures come back as `success = false`
    /// with every partial artifact removed.
    pub fn backup_one(
        &self,
        partition: &Partition,
        progress: Option<SyncSender<BackupProgress>>,
        cancel: &CancelToken,
    ) -> BackupResult {
        let timestamp = backup_timestamp(Local::now());
        self.backup_one_at(partition, &timestamp, progress, cancel)
    }

    pub(crate) fn backup_one_at(
        &self,
        partition: &Partition,
        timestamp: &str,
        progress: Option<SyncSender<BackupProgress>>,
        cancel: &CancelToken,
    ) -> BackupResult {
        let mut reporter = ProgressReporter::new(progress);
        let names = BackupNames::new(&partition.name, timestamp);
        let dir = &self.config.backup_dir;
        let raw = dir.join(&names.raw);

        log::info!(
            "Starting backup of {} ({}, {})",
            partition.name,
            partition.path,
            partition.formatted_size()
        );

        let outcome = self.run_single(partition, timestamp, &names, &mut reporter, cancel);

        // The uncompressed image never outlives the run
        remove_quietly(&raw);

        match outcome {
            Ok(mut result) => {
                log::info!("{}", result.message);
                result.checkpoints = reporter.into_checkpoints();
                result
            }
            Err(e) => {
                remove_quietly(&dir.join(&names.compressed));
                remove_quietly(&dir.join(&names.info));
                log::error!("Backup of {} failed: {:#}", partition.name, e);
                BackupResult::failed(
                    format!("Backup of {} failed: {:#}", partition.name, e),
                    reporter.into_checkpoints(),
                )
            }
        }
    }

    fn run_single(
        &self,
        partition: &Partition,
        timestamp: &str,
        names: &BackupNames,
        reporter: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BackupResult> {
        validate_partition_label(&partition.name)?;

        let dir = &self.config.backup_dir;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create backup directory {}", dir.display()))?;

        let raw = dir.join(&names.raw);
        let compressed = dir.join(&names.compressed);
        let info = dir.join(&names.info);

        reporter.report(10, "Reading partition", Some(&partition.name));
        let original_size = self.copy_raw(partition, &raw, reporter, cancel, (20, 60))?;

        reporter.report(70, "Compressing image", Some(&names.compressed));
        let compressed_size = self.compress(&raw, &compressed, reporter, cancel)?;
        remove_quietly(&raw);

        let sha256 = sha256_file(&compressed)?;
        let device = DeviceInfo::collect(self.shell);
        let sidecar = SidecarInfo {
            partition,
            timestamp,
            device: &device,
            original_size,
            compressed_name: &names.compressed,
            compressed_size,
            sha256: &sha256,
        };
        fs::write(&info, sidecar.render())
            .with_context(|| format!("Failed to write {}", info.display()))?;

        let ratio = sidecar.ratio();
        reporter.report(100, "Backup complete", Some(&names.compressed));

        Ok(BackupResult {
            success: true,
            message: format!(
                "Backed up {} to {} ({}, {}% smaller)",
                partition.name,
                names.compressed,
                format_bytes(compressed_size),
                ratio
            ),
            files: vec![compressed, info],
            compressed_size,
            compression_ratio: ratio,
            checkpoints: Vec::new(),
        })
    }

    /// Copy a partition's raw bytes to `dest`, reporting within `range`
    ///
    /// Tries `dd` first and falls back to a chunked privileged read. Image
    /// file entries are unpacked from their gzip backup instead.
    /// Returns the number of bytes written.
    pub(crate) fn copy_raw(
        &self,
        partition: &Partition,
        dest: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancelToken,
        range: (u8, u8),
    ) -> Result<u64> {
        cancel.check()?;

        // Existing backups are gzip streams; copy the partition bytes inside
        if partition.is_image_file {
            let file = File::open(&partition.path)
                .with_context(|| format!("Failed to open image {}", partition.path))?;
            let mut decoder = GzDecoder::new(BufReader::new(file));
            let copied = self
                .stream_copy(&mut decoder, dest, 0, reporter, cancel, range)
                .with_context(|| format!("Failed to unpack image {}", partition.path))?;
            reporter.report(range.1, "Image copied", Some(&partition.name));
            return Ok(copied);
        }

        if let Some(size) = self.copy_with_dd(partition, dest) {
            reporter.report(range.1, "Partition copied", Some(&partition.name));
            return Ok(size);
        }

        log::warn!(
            "dd copy of {} failed, falling back to streaming copy",
            partition.name
        );

        let mut reader = self
            .shell
            .open_read(Path::new(&partition.path))
            .with_context(|| format!("Failed to open {} for reading", partition.path))?;
        let copied = self.stream_copy(
            reader.as_mut(),
            dest,
            partition.size,
            reporter,
            cancel,
            range,
        )?;

        reporter.report(range.1, "Partition copied", Some(&partition.name));
        Ok(copied)
    }

    /// Run dd through the shell; `None` when it fails or writes nothing
    fn copy_with_dd(&self, partition: &Partition, dest: &Path) -> Option<u64> {
        let command = format!(
            "dd if={} of={} bs={}",
            shell_quote(&partition.path),
            shell_quote(&dest.to_string_lossy()),
            self.config.dd_block_size
        );

        let out = self.shell.execute(&command);
        let size = fs::metadata(dest).map(|m| m.len()).unwrap_or(0);

        if out.success && size > 0 {
            return Some(size);
        }

        remove_quietly(dest);
        None
    }

    fn stream_copy(
        &self,
        reader: &mut dyn Read,
        dest: &Path,
        total: u64,
        reporter: &mut ProgressReporter,
        cancel: &CancelToken,
        range: (u8, u8),
    ) -> Result<u64> {
        let file =
            File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut out = BufWriter::new(file);
        let mut buffer = vec![0u8; self.config.copy_chunk_size.max(4096)];
        let mut copied: u64 = 0;

        if total == 0 {
            let midpoint = range.0 + (range.1 - range.0) / 2;
            reporter.report(midpoint, "Copying partition data", None);
        }

        loop {
            cancel.check()?;

            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read partition data"),
            };

            out.write_all(&buffer[..read])
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            copied += read as u64;

            if total > 0 {
                let percent = scaled_percent(range.0, range.1, copied, total);
                if reporter.last() != Some(percent) {
                    reporter.report(percent, "Copying partition data", None);
                }
            }
        }

        out.flush()
            .with_context(|| format!("Failed to flush {}", dest.display()))?;

        if copied == 0 {
            bail!("No data could be read");
        }

        Ok(copied)
    }

    /// Stream `raw` through gzip into `compressed`, reporting 70 to 90
    fn compress(
        &self,
        raw: &Path,
        compressed: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut input =
            File::open(raw).with_context(|| format!("Failed to open {}", raw.display()))?;
        let total = input.metadata().map(|m| m.len()).unwrap_or(0);

        let output = File::create(compressed)
            .with_context(|| format!("Failed to create {}", compressed.display()))?;
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        let mut buffer = vec![0u8; self.config.copy_chunk_size.max(4096)];
        let mut done: u64 = 0;

        loop {
            cancel.check()?;

            let read = match input.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read raw image"),
            };

            encoder
                .write_all(&buffer[..read])
                .context("Failed to write compressed data")?;
            done += read as u64;

            let percent = scaled_percent(70, 90, done, total);
            if reporter.last() != Some(percent) {
                reporter.report(percent, "Compressing image", None);
            }
        }

        let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
        writer.flush().context("Failed to flush compressed image")?;
        drop(writer);

        let size = fs::metadata(compressed)
            .with_context(|| format!("Failed to stat {}", compressed.display()))?
            .len();
        if size == 0 {
            bail!("Compressed image is empty");
        }

        Ok(size)
    }
}

/// Backup artifacts in the backup directory, newest first
pub fn list_backups(config: &PartsafeConfig) -> Result<Vec<BackupArtifact>> {
    let prefix = config.batch_prefix.as_str();
    let mut backups = artifacts::scan_files(&config.backup_dir, |name| {
        is_backup_artifact(name, prefix)
    })?;

    backups.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(backups)
}

/// Resolve a path and make sure it is a backup artifact directly inside the backup directory
fn validate_backup_path(config: &PartsafeConfig, path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize backup path {}", path.display()))?;
    let root = config.backup_dir.canonicalize().with_context(|| {
        format!(
            "Failed to canonicalize backup directory {}",
            config.backup_dir.display()
        )
    })?;

    if canonical.parent() != Some(root.as_path()) {
        bail!(
            "Security: '{}' is not inside the backup directory {}",
            canonical.display(),
            root.display()
        );
    }

    let name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let is_staging = canonical.is_dir() && name.starts_with(STAGING_PREFIX);
    let is_artifact = canonical.is_file() && is_backup_artifact(name, &config.batch_prefix);

    if !is_staging && !is_artifact {
        bail!("Security: '{}' is not a partsafe backup artifact", name);
    }

    Ok(canonical)
}

/// Delete one backup artifact or a leftover staging directory
pub fn delete_backup(config: &PartsafeConfig, path: &Path) -> Result<()> {
    let target = validate_backup_path(config, path)?;

    if target.is_dir() {
        fs::remove_dir_all(&target)
            .with_context(|| format!("Failed to remove {}", target.display()))?;
    } else {
        fs::remove_file(&target)
            .with_context(|| format!("Failed to remove {}", target.display()))?;
    }

    log::info!("Deleted backup artifact {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::SuShell;
    use crate::shell::testing::{CancelPoint, ScriptedShell};
    use partsafe_common::config::ShellMode;
    use std::sync::mpsc::sync_channel;
    use tempfile::TempDir;

    const TS: &str = "20240101_120000";

    fn setup() -> (TempDir, PartsafeConfig, PathBuf) {
        let dir = TempDir::new().unwrap();
        let backup_dir = dir.path().join("Download");
        let device = dir.path().join("sde11");
        // Compressible but not trivial
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 7) as u8).collect();
        fs::write(&device, data).unwrap();

        let config = PartsafeConfig {
            backup_dir,
            copy_chunk_size: 16 * 1024,
            ..Default::default()
        };
        (dir, config, device)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    #[test]
    fn test_scaled_percent() {
        assert_eq!(scaled_percent(20, 60, 0, 100), 20);
        assert_eq!(scaled_percent(20, 60, 50, 100), 40);
        assert_eq!(scaled_percent(20, 60, 100, 100), 60);
        assert_eq!(scaled_percent(20, 60, 500, 100), 60);
        assert_eq!(scaled_percent(20, 60, 5, 0), 20);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.check().is_err());
    }

    #[test]
    fn test_dd_failure_falls_back_to_streaming_copy() {
        let (_dir, config, device) = setup();
        let shell = ScriptedShell::new().on_lines("getprop ro.product.model", &["Pixel"]);
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);
        let (tx, rx) = sync_channel(256);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            Some(tx),
            &CancelToken::new(),
        );

        assert!(result.success, "{}", result.message);
        assert!(shell.commands().iter().any(|c| c.starts_with("dd if=")));
        assert_eq!(
            entries(&config.backup_dir),
            vec![
                "boot_a_20240101_120000.img.gz".to_string(),
                "boot_a_20240101_120000.info".to_string()
            ]
        );

        // Decompresses back to the device contents
        let gz = File::open(&result.files[0]).unwrap();
        let mut restored = Vec::new();
        GzDecoder::new(gz).read_to_end(&mut restored).unwrap();
        assert_eq!(restored, fs::read(&device).unwrap());

        let info = fs::read_to_string(&result.files[1]).unwrap();
        assert!(info.contains("device_model: Pixel"));
        assert!(info.contains(&format!("compression_ratio: {}%", result.compression_ratio)));
        assert!(result.compression_ratio > 50);

        // Checkpoints are ordered and end at 100
        assert!(result.checkpoints.windows(2).all(|w| w[0] <= w[1]));
        assert!(result.checkpoints.contains(&60));
        assert_eq!(result.checkpoints.last(), Some(&100));

        let events: Vec<BackupProgress> = rx.try_iter().collect();
        assert_eq!(events.last().map(|e| e.percent), Some(100));
    }

    #[test]
    fn test_primary_dd_copy() {
        let (_dir, config, device) = setup();
        let shell = SuShell::new(ShellMode::Direct);
        let partition = Partition::device("misc", device.to_string_lossy(), 0);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(result.success, "{}", result.message);
        assert!(!config.backup_dir.join("misc_20240101_120000.img").exists());
        assert!(config.backup_dir.join("misc_20240101_120000.img.gz").exists());
        // dd path jumps straight to 60 without the unknown-size midpoint
        assert!(!result.checkpoints.contains(&40));
        assert!(result.checkpoints.contains(&60));
    }

    #[test]
    fn test_unknown_size_reports_midpoint() {
        let (_dir, config, device) = setup();
        let shell = ScriptedShell::new();
        let partition = Partition::device("misc", device.to_string_lossy(), 0);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(result.success);
        assert!(result.checkpoints.contains(&40));

        // Size and ratio come from the bytes actually copied
        assert!(result.compression_ratio > 0);
        let info = fs::read_to_string(&result.files[1]).unwrap();
        assert!(info.contains("partition_size: 200000"));
    }

    #[test]
    fn test_compression_failure_cleans_up() {
        let (_dir, config, device) = setup();
        fs::create_dir_all(&config.backup_dir).unwrap();
        // A directory where the archive should go makes the encoder fail
        fs::create_dir(config.backup_dir.join("boot_a_20240101_120000.img.gz")).unwrap();

        let shell = ScriptedShell::new();
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(!result.success);
        assert!(result.message.contains("boot_a"));
        assert!(!result.checkpoints.contains(&100));
        assert_eq!(
            entries(&config.backup_dir),
            vec!["boot_a_20240101_120000.img.gz".to_string()]
        );
        assert!(config.backup_dir.join("boot_a_20240101_120000.img.gz").is_dir());
    }

    #[test]
    fn test_unreadable_partition_fails_without_artifacts() {
        let (_dir, config, device) = setup();
        let shell = ScriptedShell::new().unreadable();
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(!result.success);
        assert!(entries(&config.backup_dir).is_empty());
    }

    #[test]
    fn test_cancelled_backup_cleans_up() {
        let (_dir, config, device) = setup();
        let shell = ScriptedShell::new();
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = BackupPipeline::new(&shell, &config).backup_one_at(&partition, TS, None, &cancel);

        assert!(!result.success);
        assert!(result.message.contains("cancelled"));
        assert!(entries(&config.backup_dir).is_empty());
    }

    #[test]
    fn test_cancel_mid_copy_removes_partial_image() {
        let (_dir, config, device) = setup();
        let cancel = CancelToken::new();
        let shell = ScriptedShell::new().cancel_reading(&device, &cancel, CancelPoint::FirstChunk);
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(&partition, TS, None, &cancel);

        assert!(!result.success);
        assert!(result.message.contains("cancelled"));
        assert!(result.checkpoints.contains(&10));
        assert!(!result.checkpoints.contains(&70));
        assert!(entries(&config.backup_dir).is_empty());
    }

    #[test]
    fn test_cancel_during_compression_removes_artifacts() {
        let (_dir, config, device) = setup();
        let cancel = CancelToken::new();
        let shell = ScriptedShell::new().cancel_reading(&device, &cancel, CancelPoint::EndOfFile);
        let partition = Partition::device("boot_a", device.to_string_lossy(), 200_000);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(&partition, TS, None, &cancel);

        assert!(!result.success);
        assert!(result.message.contains("cancelled"));
        // The copy finished and compression had started
        assert!(result.checkpoints.contains(&60));
        assert!(result.checkpoints.contains(&70));
        assert!(!result.checkpoints.contains(&100));
        assert!(entries(&config.backup_dir).is_empty());
    }

    #[test]
    fn test_image_entry_backs_up_partition_bytes() {
        let (_dir, config, device) = setup();
        fs::create_dir_all(&config.backup_dir).unwrap();
        let raw = fs::read(&device).unwrap();

        let earlier = config.backup_dir.join("boot_a_20230101_000000.img.gz");
        let mut encoder = GzEncoder::new(File::create(&earlier).unwrap(), Compression::default());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap();
        let size = fs::metadata(&earlier).unwrap().len();

        let shell = ScriptedShell::new();
        let partition = Partition::image("boot_a", earlier.to_string_lossy(), size);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(result.success, "{}", result.message);
        assert!(shell.commands().iter().all(|c| !c.starts_with("dd ")));

        // One gzip layer, holding the partition bytes
        let mut restored = Vec::new();
        GzDecoder::new(File::open(&result.files[0]).unwrap())
            .read_to_end(&mut restored)
            .unwrap();
        assert_eq!(restored, raw);

        let info = fs::read_to_string(&result.files[1]).unwrap();
        assert!(info.contains(&format!("partition_size: {}", raw.len())));
    }

    #[test]
    fn test_corrupt_image_entry_fails() {
        let (_dir, config, _device) = setup();
        fs::create_dir_all(&config.backup_dir).unwrap();
        let earlier = config.backup_dir.join("boot_a_20230101_000000.img.gz");
        fs::write(&earlier, b"not a gzip stream").unwrap();

        let shell = ScriptedShell::new();
        let partition = Partition::image("boot_a", earlier.to_string_lossy(), 17);

        let result = BackupPipeline::new(&shell, &config).backup_one_at(
            &partition,
            TS,
            None,
            &CancelToken::new(),
        );

        assert!(!result.success);
        assert_eq!(
            entries(&config.backup_dir),
            vec!["boot_a_20230101_000000.img.gz".to_string()]
        );
    }

    #[test]
    fn test_invalid_label_rejected() {
        let (_dir, config, device) = setup();
        let shell = ScriptedShell::new();
        let partition = Partition::device("../etc", device.to_string_lossy(), 1);

        let result = BackupPipeline::new(&shell, &config).backup_one(
            &partition,
            None,
            &CancelToken::new(),
        );
        assert!(!result.success);
        assert!(shell.commands().is_empty());
    }

    #[test]
    fn test_list_backups_newest_first() {
        let (_dir, config, _device) = setup();
        fs::create_dir_all(&config.backup_dir).unwrap();
        let old = config.backup_dir.join("boot_a_20230101_000000.img.gz");
        let new = config.backup_dir.join("partsafe_backup_20240101_000000.zip");
        fs::write(&old, b"old").unwrap();
        fs::write(&new, b"new").unwrap();
        fs::write(config.backup_dir.join("holiday.jpg"), b"x").unwrap();

        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let backups = list_backups(&config).unwrap();
        let paths: Vec<&Path> = backups.iter().map(|b| b.path.as_path()).collect();
        assert_eq!(paths, vec![new.as_path(), old.as_path()]);
    }

    #[test]
    fn test_delete_backup() {
        let (dir, config, _device) = setup();
        fs::create_dir_all(&config.backup_dir).unwrap();
        let artifact = config.backup_dir.join("boot_a_20230101_000000.img.gz");
        let staging = config.backup_dir.join("temp_backup_20230101_000000");
        fs::write(&artifact, b"gz").unwrap();
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("boot_a.img"), b"raw").unwrap();

        delete_backup(&config, &artifact).unwrap();
        delete_backup(&config, &staging).unwrap();
        assert!(!artifact.exists());
        assert!(!staging.exists());

        // Outside the backup directory
        let outside = dir.path().join("boot_a_20230101_000000.img.gz");
        fs::write(&outside, b"gz").unwrap();
        assert!(delete_backup(&config, &outside).is_err());
        assert!(outside.exists());

        // Not an artifact
        let photo = config.backup_dir.join("holiday.jpg");
        fs::write(&photo, b"x").unwrap();
        assert!(delete_backup(&config, &photo).is_err());
        assert!(photo.exists());
    }
}
