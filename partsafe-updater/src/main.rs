// partsafe Updater - release checks, mirror-aware downloads and installs
// Prints one JSON result to stdout; progress and logs go to stderr

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partsafe_common::{NetworkEnvironment, OperationResult, PartsafeConfig, UpdateCheck};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread;

mod download;
mod network;
mod prefs;
mod release;
mod sources;

use download::{DownloadProgress, HttpDownloader, Installer};
use network::{HttpFetcher, HttpProbe};
use prefs::SourcePreferences;
use sources::SourceSelector;

const PROGRESS_CHANNEL_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "partsafe-updater", version)]
#[command(about = "Check for, download and install partsafe updates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a newer release is available
    Check,
    /// Download the latest release if it is newer than this build
    Download {
        /// Install the package after downloading
        #[arg(long)]
        install: bool,
    },
    /// Install a downloaded package
    Install {
        /// Package path (default: the configured download location)
        path: Option<PathBuf>,
    },
    /// Show the detected network environment
    Env {
        /// Ignore the cached result and probe again
        #[arg(long)]
        refresh: bool,
    },
    /// Show the update sources in the order they will be tried
    Sources,
}

#[derive(Serialize)]
struct EnvironmentReport {
    environment: NetworkEnvironment,
    description: String,
}

#[derive(Serialize)]
struct SourcesReport {
    environment: NetworkEnvironment,
    sources: Vec<String>,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = PartsafeConfig::new();

    if let Err(errors) = config.validate() {
        for error in &errors {
            log::error!("Invalid configuration: {error}");
        }
        let _ = print_json(&OperationResult::error(format!(
            "Invalid configuration ({} errors)",
            errors.len()
        )));
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e:#}");
            let _ = print_json(&OperationResult::error(format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands, config: &PartsafeConfig) -> Result<bool> {
    let prefs = SourcePreferences::new(&config.prefs_file);
    let probe = HttpProbe::new()?;
    let selector = SourceSelector::new(&prefs, &probe, config);

    match command {
        Commands::Check => {
            let check = check(&selector, config)?;
            print_json(&check)?;
            Ok(!matches!(check, UpdateCheck::Undetermined { .. }))
        }
        Commands::Download { install } => {
            let info = match check(&selector, config)? {
                UpdateCheck::Available(info) => info,
                other => {
                    print_json(&other)?;
                    return Ok(matches!(other, UpdateCheck::UpToDate));
                }
            };

            let downloader = HttpDownloader::new()?;
            let (tx, rx) = sync_channel(PROGRESS_CHANNEL_SIZE);
            let printer = spawn_progress_printer(rx);

            let outcome = download::download_update(
                &selector,
                &downloader,
                &info,
                &config.installer_path(),
                Some(tx),
            );
            let _ = printer.join();
            let path = outcome?;

            let result = if install {
                Installer::default().install_package(&path)
            } else {
                OperationResult::success(format!(
                    "Downloaded {} to {}",
                    info.version_name,
                    path.display()
                ))
            };
            print_json(&result)?;
            Ok(result.success)
        }
        Commands::Install { path } => {
            let path = path.unwrap_or_else(|| config.installer_path());
            let result = Installer::default().install_package(&path);
            print_json(&result)?;
            Ok(result.success)
        }
        Commands::Env { refresh } => {
            if refresh {
                selector.clear_cache()?;
            }
            let environment = selector.detect_environment();
            print_json(&EnvironmentReport {
                environment,
                description: environment.describe().to_string(),
            })?;
            Ok(true)
        }
        Commands::Sources => {
            let report = SourcesReport {
                environment: selector.detect_environment(),
                sources: selector.best_sources(),
            };
            print_json(&report)?;
            Ok(true)
        }
    }
}

fn check(selector: &SourceSelector, config: &PartsafeConfig) -> Result<UpdateCheck> {
    let fetcher = HttpFetcher::new().context("Failed to prepare update check")?;
    Ok(release::check_for_update(
        selector,
        &fetcher,
        env!("CARGO_PKG_VERSION"),
        &config.installer_extension,
    ))
}

/// Print download progress to stderr until the sender is dropped
fn spawn_progress_printer(rx: Receiver<DownloadProgress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for progress in rx {
            match progress.percent {
                Some(percent) => eprintln!(
                    "[{:>3}%] {}",
                    percent,
                    partsafe_common::format_bytes(progress.downloaded)
                ),
                None => eprintln!("[ ..%] {}", partsafe_common::format_bytes(progress.downloaded)),
            }
        }
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}
