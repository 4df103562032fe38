// partsafe Helper - privileged partition discovery and backup
// Prints one JSON result to stdout; progress and logs go to stderr

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use partsafe_common::{BackupProgress, OperationResult, Partition, PartitionList, PartsafeConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread;

mod artifacts;
mod audit;
mod backup;
mod batch;
mod discovery;
mod manifest;
mod root;
mod shell;

use backup::{BackupPipeline, CancelToken};
use discovery::{PartitionScanner, SizeCache};
use shell::{PrivilegedShell, SuShell};

/// Bound of the progress channel between pipeline and printer
const PROGRESS_CHANNEL_SIZE: usize = 64;

#[derive(Parser)]
#[command(name = "partsafe-helper", version)]
#[command(about = "Discover and back up Android partitions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the backup directory
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check root access and report how it is provided
    Root,
    /// List partitions from the device and existing backups
    Discover,
    /// Back up a single partition to a compressed image
    Backup {
        /// Partition label (e.g., boot_a)
        label: String,
    },
    /// Back up several partitions into one zip archive
    Batch {
        /// Partition labels
        labels: Vec<String>,
        /// Back up every partition found on the device
        #[arg(long, conflicts_with = "labels")]
        all: bool,
    },
    /// List backup artifacts, newest first
    ListBackups,
    /// Delete a backup artifact from the backup directory
    DeleteBackup {
        path: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = PartsafeConfig::new();
    if let Some(dir) = cli.backup_dir {
        config.backup_dir = dir;
    }

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

    let shell = SuShell::for_current_process(config.shell_mode);
    log::debug!("Privileged shell mode: {:?}", shell.mode());

    match run(cli.command, &config, &shell) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e:#}");
            let _ = print_json(&OperationResult::error(format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a command; `Ok(false)` means the printed result reports failure
fn run(command: Commands, config: &PartsafeConfig, shell: &dyn PrivilegedShell) -> Result<bool> {
    match command {
        Commands::Root => {
            let status = root::check_access(shell);
            print_json(&status)?;
            Ok(status.has_access)
        }
        Commands::Discover => {
            require_root(shell, "discover")?;
            let list = scan(config, shell);
            print_json(&list)?;
            Ok(true)
        }
        Commands::Backup { label } => {
            require_root(shell, "backup_partition")?;
            let partition = find_partition(&scan(config, shell), &label)?;

            let cancel = CancelToken::new();
            let (tx, rx) = sync_channel(PROGRESS_CHANNEL_SIZE);
            let printer = spawn_progress_printer(rx);

            let result = BackupPipeline::new(shell, config).backup_one(&partition, Some(tx), &cancel);
            let _ = printer.join();

            let error = (!result.success).then_some(result.message.as_str());
            audit::log_partition_backup(&label, result.success, error);

            print_json(&result)?;
            Ok(result.success)
        }
        Commands::Batch { labels, all } => {
            require_root(shell, "backup_batch")?;
            let list = scan(config, shell);

            let partitions: Vec<Partition> = if all {
                list.partitions.iter().filter(|p| !p.is_image_file).cloned().collect()
            } else {
                labels
                    .iter()
                    .map(|label| find_partition(&list, label))
                    .collect::<Result<_>>()?
            };

            let cancel = CancelToken::new();
            let (tx, rx) = sync_channel(PROGRESS_CHANNEL_SIZE);
            let printer = spawn_progress_printer(rx);

            let result = BackupPipeline::new(shell, config).backup_batch(&partitions, Some(tx), &cancel);
            let _ = printer.join();

            let names: Vec<String> = partitions.iter().map(|p| p.name.clone()).collect();
            let error = (!result.success).then_some(result.message.as_str());
            audit::log_batch_backup(&names, result.success, error);

            print_json(&result)?;
            Ok(result.success)
        }
        Commands::ListBackups => {
            let backups = backup::list_backups(config)?;
            print_json(&backups)?;
            Ok(true)
        }
        Commands::DeleteBackup { path } => {
            let shown = path.display().to_string();
            let result = match backup::delete_backup(config, &path) {
                Ok(()) => {
                    audit::log_backup_delete(&shown, true, None);
                    OperationResult::success(format!("Deleted {shown}"))
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    audit::log_backup_delete(&shown, false, Some(&message));
                    OperationResult::error(message)
                }
            };
            print_json(&result)?;
            Ok(result.success)
        }
        Commands::Config => {
            print_json(config)?;
            Ok(true)
        }
    }
}

fn require_root(shell: &dyn PrivilegedShell, operation: &str) -> Result<()> {
    let status = root::check_access(shell);
    if !status.has_access {
        audit::log_auth_failure(operation, "root access not available");
        bail!("Root access is required for {operation}");
    }
    Ok(())
}

fn scan(config: &PartsafeConfig, shell: &dyn PrivilegedShell) -> PartitionList {
    let sizes = SizeCache::new();
    PartitionScanner::new(shell, config, &sizes).discover()
}

fn find_partition(list: &PartitionList, label: &str) -> Result<Partition> {
    partsafe_common::validate_partition_label(label)?;
    list.find(label)
        .cloned()
        .with_context(|| format!("Partition '{label}' was not found"))
}

/// Print progress events to stderr until the pipeline drops its sender
fn spawn_progress_printer(rx: Receiver<BackupProgress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for progress in rx {
            match progress.current_file {
                Some(file) => eprintln!("[{:>3}%] {} ({})", progress.percent, progress.status, file),
                None => eprintln!("[{:>3}%] {}", progress.percent, progress.status),
            }
        }
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}
