//! # Configuration Module
//!
//! Data directory setup and user settings for smartlist.
//!
//! ## Data Storage
//!
//! The snapshot database and the settings file live in the platform-standard
//! data directory:
//! - Linux: `~/.local/share/smartlist/`
//! - macOS: `~/Library/Application Support/smartlist/`
//! - Windows: `%APPDATA%\smartlist\`
//!
//! ## Settings
//!
//! `config.json` in that directory is optional. Every field has a default,
//! so a file only needs the values it changes:
//!
//! ```json
//! { "clustering": { "k": 30 }, "playlist": { "min_popularity": 5.0 } }
//! ```

use crate::clustering::{KMeansConfig, DEFAULT_CLUSTER_COUNT};
use crate::engine::{EngineOptions, DEFAULT_TIMEZONE, DEFAULT_TOP_ARTISTS, DEFAULT_TOP_SONGS};
use crate::error::Error;
use crate::sampler::SamplerConfig;
use crate::summary::TimeOfDayBoundaries;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "smartlist";
const DB_FILE: &str = "smartlist.db";
const CONFIG_FILE: &str = "config.json";

/// Returns the platform-appropriate data directory for smartlist, creating
/// it if needed.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The smartlist subdirectory cannot be created due to permissions
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create smartlist data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Default location of the snapshot database.
///
/// # Examples
///
/// ```no_run
/// use smartlist::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Same as [`get_data_dir`].
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Default location of the settings file.
///
/// # Errors
///
/// Same as [`get_data_dir`].
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CONFIG_FILE))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringSettings {
    /// Number of clusters built when none is given on the command line.
    pub k: usize,
    #[serde(flatten)]
    pub kmeans: KMeansConfig,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            k: DEFAULT_CLUSTER_COUNT,
            kmeans: KMeansConfig::default(),
        }
    }
}

/// User settings, as read from `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides the default database location.
    pub db_path: Option<PathBuf>,
    /// IANA zone name such as `"Europe/Berlin"`.
    pub timezone: Tz,
    pub clustering: ClusteringSettings,
    pub playlist: SamplerConfig,
    pub time_of_day: TimeOfDayBoundaries,
    pub top_songs: usize,
    pub top_artists: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: None,
            timezone: DEFAULT_TIMEZONE,
            clustering: ClusteringSettings::default(),
            playlist: SamplerConfig::default(),
            time_of_day: TimeOfDayBoundaries::default(),
            top_songs: DEFAULT_TOP_SONGS,
            top_artists: DEFAULT_TOP_ARTISTS,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `path`
    /// is `None`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or parsed, or holds
    /// invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => get_config_path()?,
        };

        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for the first invalid value.
    pub fn validate(&self) -> crate::Result<()> {
        if self.clustering.k == 0 {
            return Err(Error::configuration("cluster count must be greater than 0"));
        }
        self.clustering.kmeans.validate()?;
        self.playlist.validate()?;
        self.time_of_day.validate()?;
        if self.top_songs == 0 {
            return Err(Error::configuration("top song count must be greater than 0"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            timezone: self.timezone,
            boundaries: self.time_of_day,
            sampler: self.playlist,
            top_songs: self.top_songs,
            top_artists: self.top_artists,
        }
    }

    /// Database path from the settings, falling back to the default one.
    ///
    /// # Errors
    ///
    /// Fails if the default data directory is needed and unavailable.
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => get_db_path(),
        }
    }
}
