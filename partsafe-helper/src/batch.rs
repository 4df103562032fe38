//! Batch backups: several partitions in one zip archive

use crate::backup::{BackupPipeline, CancelToken, ProgressReporter, remove_quietly};
use crate::manifest::{DeviceInfo, render_batch_manifest};
use anyhow::{Context, Result, bail};
use chrono::Local;
use partsafe_common::naming::{
    MANIFEST_ENTRY, archive_entry_name, archive_name, backup_timestamp, staging_dir_name,
};
use partsafe_common::{BackupProgress, BatchResult, Partition, validate_partition_label};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::SyncSender;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Progress window shared by all partitions of a batch
const SLICE_START: usize = 5;
const SLICE_SPAN: usize = 80;

/// Start and end of partition `index` out of `count` in the batch window
fn partition_slice(index: usize, count: usize) -> (u8, u8) {
    let start = SLICE_START + index * SLICE_SPAN / count;
    let end = SLICE_START + (index + 1) * SLICE_SPAN / count;
    (start as u8, end as u8)
}

impl BackupPipeline<'_> {
    /// Raw-copy every partition into `<prefix>_<ts>.zip`
    ///
    /// Partitions that cannot be read are skipped and listed in the result
    /// and the manifest. The batch fails only when nothing was archived, on
    /// archive I/O errors, or on cancellation; the partial archive is then
    /// deleted.
    pub fn backup_batch(
        &self,
        partitions: &[Partition],
        progress: Option<SyncSender<BackupProgress>>,
        cancel: &CancelToken,
    ) -> BatchResult {
        let timestamp = backup_timestamp(Local::now());
        self.backup_batch_at(partitions, &timestamp, progress, cancel)
    }

    pub(crate) fn backup_batch_at(
        &self,
        partitions: &[Partition],
        timestamp: &str,
        progress: Option<SyncSender<BackupProgress>>,
        cancel: &CancelToken,
    ) -> BatchResult {
        let mut reporter = ProgressReporter::new(progress);
        let dir = &self.config.backup_dir;
        let archive = dir.join(archive_name(&self.config.batch_prefix, timestamp));
        let staging = dir.join(staging_dir_name(timestamp));

        log::info!("Starting batch backup of {} partitions", partitions.len());

        let outcome = self.run_batch(partitions, timestamp, &archive, &staging, &mut reporter, cancel);

        remove_staging(&staging);

        match outcome {
            Ok(result) => {
                log::info!("{}", result.message);
                result
            }
            Err(e) => {
                remove_quietly(&archive);
                log::error!("Batch backup failed: {:#}", e);
                BatchResult {
                    success: false,
                    message: format!("Batch backup failed: {e:#}"),
                    archive: None,
                    archived: Vec::new(),
                    failed: partitions.iter().map(|p| p.name.clone()).collect(),
                }
            }
        }
    }

    fn run_batch(
        &self,
        partitions: &[Partition],
        timestamp: &str,
        archive: &Path,
        staging: &Path,
        reporter: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BatchResult> {
        if partitions.is_empty() {
            bail!("No partitions selected");
        }
        for partition in partitions {
            validate_partition_label(&partition.name)?;
        }

        reporter.report(5, "Preparing batch backup", None);
        fs::create_dir_all(staging)
            .with_context(|| format!("Failed to create staging directory {}", staging.display()))?;

        let file =
            File::create(archive).with_context(|| format!("Failed to create {}", archive.display()))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);

        let count = partitions.len();
        let mut archived: Vec<(Partition, u64)> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for (index, partition) in partitions.iter().enumerate() {
            cancel.check()?;

            let (start, end) = partition_slice(index, count);
            reporter.report(
                start,
                &format!("Backing up {} ({}/{})", partition.name, index + 1, count),
                Some(&partition.name),
            );

            let entry = archive_entry_name(&partition.name);
            let staged = staging.join(&entry);

            let size = match self.copy_raw(partition, &staged, reporter, cancel, (start, end)) {
                Ok(size) => size,
                Err(e) => {
                    remove_quietly(&staged);
                    cancel.check()?;
                    log::warn!("Skipping {}: {:#}", partition.name, e);
                    failed.push(partition.name.clone());
                    continue;
                }
            };

            append_entry(&mut zip, &staged, &entry, options)?;
            remove_quietly(&staged);
            archived.push((partition.clone(), size));
        }

        if archived.is_empty() {
            bail!("None of the selected partitions could be read");
        }

        reporter.report(85, "Writing backup info", Some(MANIFEST_ENTRY));
        let device = DeviceInfo::collect(self.shell);
        let manifest = render_batch_manifest(&device, timestamp, &archived, &failed);
        zip.start_file(MANIFEST_ENTRY, options)
            .context("Failed to add backup info to archive")?;
        zip.write_all(manifest.as_bytes())
            .context("Failed to write backup info")?;

        let mut writer = zip.finish().context("Failed to finish archive")?;
        writer.flush().context("Failed to flush archive")?;
        drop(writer);

        reporter.report(95, "Cleaning up", None);
        remove_staging(staging);

        reporter.report(100, "Batch backup complete", None);

        let labels: Vec<String> = archived.iter().map(|(p, _)| p.name.clone()).collect();
        let mut message = format!(
            "Archived {} of {} partitions to {}",
            labels.len(),
            count,
            archive.display()
        );
        if !failed.is_empty() {
            message.push_str(&format!(" (failed: {})", failed.join(", ")));
        }

        Ok(BatchResult {
            success: true,
            message,
            archive: Some(PathBuf::from(archive)),
            archived: labels,
            failed,
        })
    }
}

fn append_entry(
    zip: &mut ZipWriter<BufWriter<File>>,
    staged: &Path,
    entry: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut source =
        File::open(staged).with_context(|| format!("Failed to open {}", staged.display()))?;
    zip.start_file(entry, options)
        .with_context(|| format!("Failed to add {entry} to archive"))?;
    io::copy(&mut source, zip).with_context(|| format!("Failed to write {entry} to archive"))?;
    Ok(())
}

fn remove_staging(staging: &Path) {
    if !staging.exists() {
        return;
    }
    if let Err(e) = fs::remove_dir_all(staging) {
        log::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
    }
}
