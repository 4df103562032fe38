// Centralized configuration for partsafe

use crate::validation::ValidationError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the optional TOML configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/data/local/tmp/partsafe/partsafe.toml";

/// How privileged commands are launched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShellMode {
    /// Wrap every command in `su -c`
    #[default]
    Su,
    /// Run commands with `sh -c` (process already has uid 0)
    Direct,
}

impl ShellMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "su" => Some(Self::Su),
            "direct" | "sh" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// partsafe configuration with support for file and environment overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartsafeConfig {
    /// Public downloads directory where backups are written
    pub backup_dir: PathBuf,

    /// Synchronized reference list (one `<label>.img` per line)
    pub reference_list: PathBuf,

    /// by-name symlink directories, scanned in priority order
    pub by_name_dirs: Vec<PathBuf>,

    /// Block size passed to dd
    pub dd_block_size: usize,

    /// Chunk size for streaming copies and compression
    pub copy_chunk_size: usize,

    /// File name prefix for batch archives
    pub batch_prefix: String,

    /// How privileged commands are launched
    pub shell_mode: ShellMode,

    /// Directory the installer package is downloaded into
    pub update_dir: PathBuf,

    /// Preference store for the update source selector
    pub prefs_file: PathBuf,

    /// Release repository in `owner/name` form
    pub release_repo: String,

    /// Extension identifying the installer asset of a release
    pub installer_extension: String,
}

impl Default for PartsafeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|dir| dir.join("partsafe"))
            .unwrap_or_else(|| PathBuf::from("/data/local/tmp/partsafe"));

        Self {
            backup_dir: PathBuf::from("/storage/emulated/0/Download"),
            reference_list: PathBuf::from("/sdcard/pc_reference/reference_list.txt"),
            by_name_dirs: vec![
                PathBuf::from("/dev/block/bootdevice/by-name"),
                PathBuf::from("/dev/block/platform/soc/1d84000.ufshc/by-name"),
                PathBuf::from("/dev/block/platform/soc/7c4000.sdhci/by-name"),
                PathBuf::from("/dev/block/by-name"),
            ],
            dd_block_size: 4096,
            copy_chunk_size: 1024 * 1024, // 1 MiB
            batch_prefix: "partsafe_backup".to_string(),
            shell_mode: ShellMode::Su,
            update_dir: data_dir.join("updates"),
            prefs_file: data_dir.join("update-sources.json"),
            release_repo: "ghhhch60-star/xy".to_string(),
            installer_extension: ".apk".to_string(),
        }
    }
}

impl PartsafeConfig {
    /// Create a new configuration from the config file and environment
    ///
    /// The file named by `PARTSAFE_CONFIG` (or [`DEFAULT_CONFIG_FILE`]) is
    /// read when it exists; a broken file is ignored with the defaults kept.
    ///
    /// Supported environment variables:
    /// - PARTSAFE_BACKUP_DIR: Override backup directory
    /// - PARTSAFE_REFERENCE_LIST: Override reference list path
    /// - PARTSAFE_BY_NAME_DIRS: Colon-separated by-name directories
    /// - PARTSAFE_SHELL_MODE: `su` or `direct`
    /// - PARTSAFE_UPDATE_DIR: Override installer download directory
    /// - PARTSAFE_PREFS_FILE: Override update source preference store
    pub fn new() -> Self {
        let path = std::env::var("PARTSAFE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            Self::load(&path).unwrap_or_default()
        } else {
            Self::default()
        };

        config.apply_env();
        config
    }

    /// Load configuration from a TOML file; missing fields keep defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("PARTSAFE_BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }

        if let Ok(file) = std::env::var("PARTSAFE_REFERENCE_LIST") {
            self.reference_list = PathBuf::from(file);
        }

        if let Ok(dirs) = std::env::var("PARTSAFE_BY_NAME_DIRS") {
            let parsed: Vec<PathBuf> = dirs
                .split(':')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
            if !parsed.is_empty() {
                self.by_name_dirs = parsed;
            }
        }

        if let Ok(mode) = std::env::var("PARTSAFE_SHELL_MODE") {
            if let Some(mode) = ShellMode::parse(&mode) {
                self.shell_mode = mode;
            }
        }

        if let Ok(dir) = std::env::var("PARTSAFE_UPDATE_DIR") {
            self.update_dir = PathBuf::from(dir);
        }

        if let Ok(file) = std::env::var("PARTSAFE_PREFS_FILE") {
            self.prefs_file = PathBuf::from(file);
        }
    }

    /// Check every field and report all problems at once
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.backup_dir.is_absolute() {
            errors.push(ValidationError::new(
                "backup_dir",
                "Backup directory must be an absolute path",
            ));
        }

        if self.by_name_dirs.is_empty() {
            errors.push(ValidationError::new(
                "by_name_dirs",
                "At least one by-name directory is required",
            ));
        }

        if self.dd_block_size == 0 {
            errors.push(ValidationError::new("dd_block_size", "Must be greater than 0"));
        }

        if self.copy_chunk_size == 0 {
            errors.push(ValidationError::new(
                "copy_chunk_size",
                "Must be greater than 0",
            ));
        }

        if self.batch_prefix.is_empty() || self.batch_prefix.contains('/') {
            errors.push(ValidationError::new(
                "batch_prefix",
                "Prefix must be non-empty and cannot contain '/'",
            ));
        }

        if !self.release_repo.contains('/') {
            errors.push(ValidationError::new(
                "release_repo",
                "Repository must be in owner/name form",
            ));
        }

        if !self.installer_extension.starts_with('.') {
            errors.push(ValidationError::new(
                "installer_extension",
                "Extension must start with '.'",
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Release metadata endpoint of the configured repository
    pub fn release_api_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/releases/latest",
            self.release_repo
        )
    }

    /// jsDelivr-hosted release descriptor of the configured repository
    pub fn release_cdn_url(&self) -> String {
        format!(
            "https://cdn.jsdelivr.net/gh/{}@main/release-info.json",
            self.release_repo
        )
    }

    /// Path of the downloaded installer package
    pub fn installer_path(&self) -> PathBuf {
        self.update_dir
            .join(format!("partsafe-update{}", self.installer_extension))
    }
}
