//! Session source for streaming-history exports.
//!
//! An export is a directory of JSON files, each holding an array of play
//! records. Records are folded into per-track aggregates and a flat list of
//! play events, which is all the clustering core consumes.

use crate::track::{ListeningLog, PlayEvent, Track};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Anything that can hand the core a listening log.
pub trait SessionSource {
    /// Load tracks and play events.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying data cannot be read or parsed.
    fn load(&self) -> Result<ListeningLog>;
}

/// One entry of a streaming-history export.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub ms_played: u64,
    #[serde(default)]
    pub master_metadata_track_name: Option<String>,
    #[serde(default)]
    pub master_metadata_album_artist_name: Option<String>,
    #[serde(default)]
    pub master_metadata_album_album_name: Option<String>,
    #[serde(default)]
    pub spotify_track_uri: Option<String>,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(default)]
    pub shuffle: Option<bool>,
}

impl StreamRecord {
    /// Track uri, if this record is a music play at all.
    fn track_uri(&self) -> Option<&str> {
        self.spotify_track_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// Directory of `*.json` export files.
#[derive(Debug, Clone)]
pub struct StreamingHistoryDir {
    path: PathBuf,
}

impl StreamingHistoryDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every export file in name order.
    ///
    /// # Errors
    ///
    /// Fails if the directory or a file cannot be read, or a file is not a
    /// JSON array of records.
    pub fn read_records(&self) -> Result<Vec<StreamRecord>> {
        let entries = fs::read_dir(&self.path)
            .with_context(|| format!("Failed to read history directory {}", self.path.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to list history directory {}", self.path.display()))?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();

        let mut records = Vec::new();
        for file in &files {
            let mut batch = read_file(file)?;
            debug!("Read {} records from {}", batch.len(), file.display());
            records.append(&mut batch);
        }

        info!("Loaded {} play records from {} files", records.len(), files.len());
        Ok(records)
    }
}

impl SessionSource for StreamingHistoryDir {
    fn load(&self) -> Result<ListeningLog> {
        let records = self.read_records()?;
        Ok(aggregate(&records))
    }
}

fn read_file(path: &Path) -> Result<Vec<StreamRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse history file {}", path.display()))
}

/// Fold raw records into track aggregates and play events.
///
/// Records without a track uri (podcasts, local files without metadata) are
/// ignored. Tracks come back ordered by play count, most played first.
#[must_use]
pub fn aggregate(records: &[StreamRecord]) -> ListeningLog {
    let mut tracks: HashMap<&str, Track> = HashMap::new();
    let mut events = Vec::with_capacity(records.len());
    let mut ignored = 0usize;

    for record in records {
        let Some(uri) = record.track_uri() else {
            ignored += 1;
            continue;
        };

        let track = tracks.entry(uri).or_insert_with(|| Track {
            uri: uri.to_string(),
            artist: record
                .master_metadata_album_artist_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            title: record
                .master_metadata_track_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            album: record
                .master_metadata_album_album_name
                .clone()
                .unwrap_or_default(),
            play_count: 0,
            minutes_listened: 0.0,
            skip_count: 0,
        });

        track.play_count += 1;
        #[allow(clippy::cast_precision_loss)]
        let minutes = record.ms_played as f64 / 60_000.0;
        track.minutes_listened += minutes;
        if record.skipped == Some(true) {
            track.skip_count += 1;
        }

        events.push(PlayEvent {
            track_uri: uri.to_string(),
            played_at: record.ts,
        });
    }

    if ignored > 0 {
        debug!("Ignored {ignored} records without a track uri");
    }

    let mut tracks = tracks.into_values().collect::<Vec<_>>();
    tracks.sort_by(|a, b| b.play_count.cmp(&a.play_count).then_with(|| a.uri.cmp(&b.uri)));

    ListeningLog { tracks, events }
}
