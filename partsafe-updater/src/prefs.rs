//! Persistent update source state
//!
//! Remembers the last source and mirror that worked and the cached network
//! environment, in a small JSON file shared between invocations.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use partsafe_common::NetworkEnvironment;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// State kept between update checks
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SourceState {
    #[serde(default)]
    pub last_successful_source: Option<String>,

    /// Mirror prefix; an empty string means the direct URL worked
    #[serde(default)]
    pub last_successful_mirror: Option<String>,

    #[serde(default)]
    pub network_environment: Option<NetworkEnvironment>,

    #[serde(default)]
    pub last_test_time: Option<DateTime<Utc>>,
}

/// JSON-backed store for [`SourceState`]
pub struct SourcePreferences {
    preferences_file: PathBuf,
}

impl SourcePreferences {
    pub fn new(preferences_file: impl Into<PathBuf>) -> Self {
        Self {
            preferences_file: preferences_file.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.preferences_file
    }

    /// Load the stored state
    ///
    /// Returns the default state if the file doesn't exist (not an error).
    pub fn load(&self) -> Result<SourceState> {
        if !self.preferences_file.exists() {
            return Ok(SourceState::default());
        }

        let lock = self.lock(false)?;
        let state = self.read_state();
        fs2::FileExt::unlock(&lock).ok();
        state
    }

    /// Save the state atomically
    pub fn save(&self, state: &SourceState) -> Result<()> {
        let lock = self.lock(true)?;
        let saved = self.write_state(state);
        fs2::FileExt::unlock(&lock).ok();
        saved
    }

    /// Load, modify and save under one exclusive lock
    ///
    /// An unreadable file is replaced rather than failing the update.
    pub fn update<F>(&self, change: F) -> Result<SourceState>
    where
        F: FnOnce(&mut SourceState),
    {
        let lock = self.lock(true)?;

        let mut state = self.read_state().unwrap_or_else(|e| {
            log::warn!("Discarding unreadable preferences: {e:#}");
            SourceState::default()
        });
        change(&mut state);
        let saved = self.write_state(&state);

        fs2::FileExt::unlock(&lock).ok();
        saved.map(|()| state)
    }

    /// Lock file beside the preferences; the rename in `write_state` never replaces it
    fn lock_path(&self) -> PathBuf {
        let mut name = self.path().as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn lock(&self, exclusive: bool) -> Result<File> {
        if let Some(parent) = self.preferences_file.parent() {
            fs::create_dir_all(parent).context("Failed to create preferences directory")?;
        }

        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&file)
                .context("Failed to lock preferences for writing")?;
        } else {
            fs2::FileExt::lock_shared(&file).context("Failed to lock preferences for reading")?;
        }

        Ok(file)
    }

    /// Caller holds the lock
    fn read_state(&self) -> Result<SourceState> {
        let content = match fs::read_to_string(&self.preferences_file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SourceState::default()),
            Err(e) => return Err(e).context("Failed to read update source preferences"),
        };

        if content.trim().is_empty() {
            return Ok(SourceState::default());
        }

        serde_json::from_str(&content).context("Failed to parse update source preferences")
    }

    /// Caller holds the exclusive lock
    fn write_state(&self, state: &SourceState) -> Result<()> {
        let content = serde_json::to_string_pretty(state)
            .context("Failed to serialize update source preferences")?;
        let tmp_path = self.preferences_file.with_extension("tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!(
                        "Failed to open temporary preferences file {}",
                        tmp_path.display()
                    )
                })?;
            file.write_all(content.as_bytes())
                .context("Failed to write update source preferences")?;
            file.sync_all()
                .context("Failed to sync update source preferences")?;
        }

        fs::rename(&tmp_path, &self.preferences_file)
            .with_context(|| format!("Failed to replace {}", self.preferences_file.display()))?;

        Ok(())
    }
}
