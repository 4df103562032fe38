//! Installer download with mirror fallback, and installation

use crate::network::HttpFetcher;
use crate::sources::SourceSelector;
use anyhow::{Context, Result, bail};
use partsafe_common::command::shell_quote;
use partsafe_common::{OperationResult, UpdateInfo};
use reqwest::blocking::Client;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::SyncSender;

/// Download progress event
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DownloadProgress {
    /// 0-100, `None` when the server sent no length
    pub percent: Option<u8>,
    pub downloaded: u64,
    pub total: Option<u64>,
}

/// Source of installer bytes
pub trait Downloader {
    /// Open `url`, returning the body and its length when known
    fn open(&self, url: &str) -> Result<(Box<dyn Read>, Option<u64>)>;
}

/// Streaming HTTP downloader
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: HttpFetcher::download_client()?,
        })
    }
}

impl Downloader for HttpDownloader {
    fn open(&self, url: &str) -> Result<(Box<dyn Read>, Option<u64>)> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status.as_u16());
        }

        let length = response.content_length();
        Ok((Box::new(response), length))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn send_progress(tx: &Option<SyncSender<DownloadProgress>>, downloaded: u64, total: Option<u64>) {
    let Some(tx) = tx else {
        return;
    };

    let percent = total
        .filter(|t| *t > 0)
        .map(|t| (downloaded.min(t) * 100 / t) as u8);

    match tx.try_send(DownloadProgress {
        percent,
        downloaded,
        total,
    }) {
        Ok(()) => {}
        Err(std::sync::mpsc::TrySendError::Full(_)) => {
            log::warn!("Progress channel full, consumer may be slow");
        }
        Err(std::sync::mpsc::TrySendError::Disconnected(_)) => {
            log::debug!("Progress channel disconnected, consumer has stopped");
        }
    }
}

/// Stream one URL into `part`; returns bytes written
fn fetch_to(
    downloader: &dyn Downloader,
    url: &str,
    part: &Path,
    progress: &Option<SyncSender<DownloadProgress>>,
) -> Result<u64> {
    let (mut body, total) = downloader.open(url)?;

    let file = File::create(part).with_context(|| format!("Failed to create {}", part.display()))?;
    let mut out = BufWriter::new(file);
    let mut buffer = vec![0u8; 64 * 1024];
    let mut downloaded: u64 = 0;
    let mut last_percent = None;

    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("Download interrupted"),
        };
        out.write_all(&buffer[..read])
            .with_context(|| format!("Failed to write {}", part.display()))?;
        downloaded += read as u64;

        let percent = total.filter(|t| *t > 0).map(|t| downloaded.min(t) * 100 / t);
        if percent != last_percent || percent.is_none() {
            send_progress(progress, downloaded, total);
            last_percent = percent;
        }
    }

    out.flush().context("Failed to flush download")?;

    if downloaded == 0 {
        bail!("Empty download");
    }
    if let Some(expected) = total {
        if downloaded != expected {
            bail!("Truncated download: {downloaded} of {expected} bytes");
        }
    }

    Ok(downloaded)
}

/// Download the installer for `info` to `dest`, trying each mirror in turn
///
/// A failed mirror leaves no partial file behind. The mirror that worked
/// is remembered for next time.
pub fn download_update(
    selector: &SourceSelector,
    downloader: &dyn Downloader,
    info: &UpdateInfo,
    dest: &Path,
    progress: Option<SyncSender<DownloadProgress>>,
) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let part = partial_path(dest);
    let mut last_error = String::from("no download mirrors");

    for url in selector.mirror_candidates(&info.download_url) {
        log::info!("Downloading {} from {}", info.version_name, url);

        match fetch_to(downloader, &url, &part, &progress) {
            Ok(bytes) => {
                fs::rename(&part, dest)
                    .with_context(|| format!("Failed to move download to {}", dest.display()))?;

                if let Err(e) = selector.record_successful_mirror(&url) {
                    log::warn!("Failed to remember download mirror: {e:#}");
                }

                log::info!("Downloaded {} bytes to {}", bytes, dest.display());
                return Ok(dest.to_path_buf());
            }
            Err(e) => {
                log::warn!("Mirror {} failed: {:#}", url, e);
                last_error = format!("{e:#}");
                if let Err(e) = fs::remove_file(&part) {
                    if e.kind() != io::ErrorKind::NotFound {
                        log::warn!("Failed to remove {}: {}", part.display(), e);
                    }
                }
            }
        }
    }

    bail!("All download mirrors failed. Last error: {last_error}")
}

/// Hands a package to the platform installer
pub struct Installer {
    launcher: String,
}

impl Default for Installer {
    fn default() -> Self {
        Self::new("su")
    }
}

impl Installer {
    /// `launcher` runs `-c <command>`; normally `su`
    pub fn new(launcher: impl Into<String>) -> Self {
        Self {
            launcher: launcher.into(),
        }
    }

    /// Run `pm install -r <path>`, reporting the installer's own error text
    pub fn install_package(&self, path: &Path) -> OperationResult {
        if !path.is_file() {
            return OperationResult::error(format!("Package not found: {}", path.display()));
        }

        let command = format!("pm install -r {}", shell_quote(&path.to_string_lossy()));
        log::info!("Installing {}", path.display());

        let output = match Command::new(&self.launcher).arg("-c").arg(&command).output() {
            Ok(output) => output,
            Err(e) => {
                return OperationResult::error(format!("Failed to run {}: {}", self.launcher, e));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() && !stdout.contains("Failure") {
            OperationResult::success(format!("Installed {}", path.display()))
        } else {
            let detail = [stderr, stdout]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or_else(|| output.status.to_string());
            OperationResult::error(format!("Install failed: {detail}"))
        }
    }
}
