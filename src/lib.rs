//! Temporal listening clusters and playlist sampling.
//!
//! smartlist groups listening sessions by when they happen (weekday and
//! time of day), names each group, and samples playlists that fit it.
//!
//! Core modules:
//! - [`features`] - Cyclical encoding of weekday and time of day
//! - [`clustering`] - k-means over session features, silhouette score
//! - [`summary`] - Cluster names, time windows, top songs and artists
//! - [`scoring`] - Track popularity scores
//! - [`sampler`] - Three-stage playlist sampling
//! - [`engine`] - Snapshot building and the public entry points
//!
//! ### Supporting Modules
//!
//! - [`track`] - Validated track, play event and session records
//! - [`history`] - Streaming-history export reader
//! - [`db`] - SQLite snapshot storage
//! - [`config`] - Settings file and data directory management
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use smartlist::clustering::KMeansConfig;
//! use smartlist::engine::{EngineOptions, SmartList};
//! use smartlist::history::{SessionSource, StreamingHistoryDir};
//!
//! let log = StreamingHistoryDir::new("my_spotify_data").load()?;
//!
//! let engine = SmartList::with_kmeans(EngineOptions::default(), KMeansConfig::default())?;
//! let snapshot = engine.build_clusters(&log, 50)?;
//! println!("silhouette: {:?}", snapshot.silhouette_score());
//!
//! let summary = engine.get_cluster_summary(0)?;
//! println!("{} ({})", summary.name, summary.time_range);
//!
//! let playlist = engine.generate_playlist(0, 10.0, &mut rand::thread_rng())?;
//! for entry in &playlist.entries {
//!     println!("{} - {}", entry.track.artist, entry.track.title);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Playlist Sampling
//!
//! A playlist of 30 is drawn as three independent quotas of 10:
//!
//! - **Curated favorites**: the cluster's most played tracks
//! - **Cluster hits**: the 100 best scored tracks of the cluster
//! - **Contextual fill**: any cluster track scoring at least `min_popularity`
//!
//! where `score = 0.6 * plays + 0.3 * minutes - 0.1 * skips`. No uri and no
//! artist appears twice. A stage that runs out of candidates leaves the
//! playlist short; its [`sampler::StageReport`] shows by how much.
//!
//! ## Error Handling
//!
//! Core operations return [`Result`] with the typed [`Error`]; I/O, storage
//! and the CLI use `anyhow` with context.

pub mod cli;
pub mod clustering;
pub mod completion;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod features;
pub mod history;
pub mod sampler;
pub mod scoring;
pub mod summary;
pub mod track;

pub use error::{Error, Result};
