//! Three-stage playlist sampling for one cluster.
//!
//! A playlist is drawn in fixed stages, each from its own candidate pool:
//!
//! 1. **Curated favorites**: the cluster's most played tracks.
//! 2. **Cluster hits**: the best scored tracks of the cluster pool.
//! 3. **Contextual fill**: any pool track at or above a popularity floor.
//!
//! Every stage shuffles its candidates with the caller's random source and
//! draws until its quota is met, skipping tracks whose uri or artist is
//! already in the playlist. Quotas are independent: a stage that comes up
//! short leaves the playlist short rather than handing its remainder to a
//! later stage.

use crate::error::{Error, Result};
use crate::scoring::ScoredTrack;
use crate::summary::SongCount;
use crate::track::Track;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_PLAYLIST_SIZE: usize = 30;
pub const DEFAULT_HITS_POOL_SIZE: usize = 100;
pub const DEFAULT_MIN_POPULARITY: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub playlist_size: usize,
    /// How many of the best scored tracks the hits stage draws from.
    pub hits_pool_size: usize,
    pub min_popularity: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            playlist_size: DEFAULT_PLAYLIST_SIZE,
            hits_pool_size: DEFAULT_HITS_POOL_SIZE,
            min_popularity: DEFAULT_MIN_POPULARITY,
        }
    }
}

impl SamplerConfig {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty playlist or hits pool,
    /// or a NaN popularity floor.
    pub fn validate(&self) -> Result<()> {
        if self.playlist_size == 0 {
            return Err(Error::configuration("playlist size must be greater than 0"));
        }
        if self.hits_pool_size == 0 {
            return Err(Error::configuration("hits pool size must be greater than 0"));
        }
        if self.min_popularity.is_nan() {
            return Err(Error::configuration("minimum popularity must be a number"));
        }
        Ok(())
    }

    /// Per-stage quotas, in stage order. The size is split evenly and any
    /// remainder goes to the earliest stages.
    #[must_use]
    pub const fn quotas(&self) -> [usize; 3] {
        let base = self.playlist_size / 3;
        let remainder = self.playlist_size % 3;
        [
            base + if remainder > 0 { 1 } else { 0 },
            base + if remainder > 1 { 1 } else { 0 },
            base,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    CuratedFavorites,
    ClusterHits,
    ContextualFill,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CuratedFavorites => "curated favorites",
            Self::ClusterHits => "cluster hits",
            Self::ContextualFill => "contextual fill",
        };
        f.write_str(label)
    }
}

/// What the sampler needs to know about one cluster.
#[derive(Debug, Clone, Copy)]
pub struct ClusterPool<'a> {
    pub cluster_id: usize,
    /// Most played tracks of the cluster, best first.
    pub top_songs: &'a [SongCount],
    /// Every track of the cluster, ranked by popularity score.
    pub track_pool: &'a [ScoredTrack],
}

/// Candidate selection for one stage.
pub trait StageStrategy {
    fn stage(&self) -> Stage;

    /// Candidates in a deterministic order, before shuffling.
    fn candidates(&self, pool: &ClusterPool<'_>) -> Vec<ScoredTrack>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CuratedFavoritesStrategy;

impl StageStrategy for CuratedFavoritesStrategy {
    fn stage(&self) -> Stage {
        Stage::CuratedFavorites
    }

    fn candidates(&self, pool: &ClusterPool<'_>) -> Vec<ScoredTrack> {
        pool.top_songs
            .iter()
            .map(|song| ScoredTrack::new(Arc::clone(&song.track)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterHitsStrategy {
    pool_size: usize,
}

impl ClusterHitsStrategy {
    #[must_use]
    pub const fn new(pool_size: usize) -> Self {
        Self { pool_size }
    }
}

impl StageStrategy for ClusterHitsStrategy {
    fn stage(&self) -> Stage {
        Stage::ClusterHits
    }

    fn candidates(&self, pool: &ClusterPool<'_>) -> Vec<ScoredTrack> {
        pool.track_pool.iter().take(self.pool_size).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextualFillStrategy {
    min_popularity: f64,
}

impl ContextualFillStrategy {
    #[must_use]
    pub const fn new(min_popularity: f64) -> Self {
        Self { min_popularity }
    }
}

impl StageStrategy for ContextualFillStrategy {
    fn stage(&self) -> Stage {
        Stage::ContextualFill
    }

    fn candidates(&self, pool: &ClusterPool<'_>) -> Vec<ScoredTrack> {
        pool.track_pool
            .iter()
            .filter(|scored| scored.popularity_score >= self.min_popularity)
            .cloned()
            .collect()
    }
}

/// How one stage went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub quota: usize,
    /// Size of the stage's pool before uniqueness filtering.
    pub candidates: usize,
    pub drawn: usize,
}

impl StageReport {
    /// Tracks missing from this stage's quota.
    #[must_use]
    pub const fn shortfall(&self) -> usize {
        self.quota.saturating_sub(self.drawn)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub track: Arc<Track>,
    pub popularity_score: f64,
    pub stage: Stage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub cluster_id: usize,
    pub entries: Vec<PlaylistEntry>,
    pub stages: Vec<StageReport>,
}

impl Playlist {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.track.uri.as_str())
    }

    /// Total tracks missing across all stages.
    #[must_use]
    pub fn shortfall(&self) -> usize {
        self.stages.iter().map(StageReport::shortfall).sum()
    }

    /// Stages that could not meet their quota.
    pub fn short_stages(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|report| report.shortfall() > 0)
    }
}

/// Runs the three stages with a fixed configuration.
pub struct PlaylistSampler {
    config: SamplerConfig,
    strategies: Vec<Box<dyn StageStrategy + Send + Sync>>,
}

impl fmt::Debug for PlaylistSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaylistSampler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PlaylistSampler {
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            strategies: vec![
                Box::new(CuratedFavoritesStrategy),
                Box::new(ClusterHitsStrategy::new(config.hits_pool_size)),
                Box::new(ContextualFillStrategy::new(config.min_popularity)),
            ],
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Draw a playlist from one cluster.
    ///
    /// Stages run in order. Each one shuffles its candidates with `rng` and
    /// draws until its quota is met or the candidates run out, skipping any
    /// track whose uri or artist is already in the playlist.
    ///
    /// # Arguments
    ///
    /// * `pool` - Top songs and ranked track pool of the cluster
    /// * `rng` - Random source; a seeded one makes the draw reproducible
    ///
    /// # Returns
    ///
    /// * `Playlist` - At most `playlist_size` unique entries, plus one
    ///   [`StageReport`] per stage. An empty pool yields a short playlist,
    ///   never an error.
    pub fn sample<R: Rng + ?Sized>(&self, pool: &ClusterPool<'_>, rng: &mut R) -> Playlist {
        let quotas = self.config.quotas();
        let mut entries = Vec::with_capacity(self.config.playlist_size);
        let mut used_uris: HashSet<String> = HashSet::new();
        let mut used_artists: HashSet<String> = HashSet::new();
        let mut stages = Vec::with_capacity(self.strategies.len());

        for (strategy, quota) in self.strategies.iter().zip(quotas) {
            let mut candidates = strategy.candidates(pool);
            let pool_size = candidates.len();
            candidates.shuffle(rng);

            let mut drawn = 0;
            for candidate in candidates {
                if drawn == quota {
                    break;
                }
                if used_uris.contains(&candidate.track.uri) || used_artists.contains(&candidate.track.artist) {
                    continue;
                }
                used_uris.insert(candidate.track.uri.clone());
                used_artists.insert(candidate.track.artist.clone());
                entries.push(PlaylistEntry {
                    track: candidate.track,
                    popularity_score: candidate.popularity_score,
                    stage: strategy.stage(),
                });
                drawn += 1;
            }

            let report = StageReport {
                stage: strategy.stage(),
                quota,
                candidates: pool_size,
                drawn,
            };
            if report.shortfall() > 0 {
                warn!(
                    "Cluster {}: {} drew {}/{} tracks from {} candidates",
                    pool.cluster_id, report.stage, report.drawn, report.quota, report.candidates
                );
            } else {
                debug!("Cluster {}: {} drew {} tracks", pool.cluster_id, report.stage, drawn);
            }
            stages.push(report);
        }

        Playlist {
            cluster_id: pool.cluster_id,
            entries,
            stages,
        }
    }
}

/// Draw a playlist with the default hits pool size.
///
/// # Arguments
///
/// * `pool` - The cluster to draw from
/// * `min_popularity` - Score floor of the contextual fill stage
/// * `playlist_size` - Upper bound on the playlist length, split over three stages
/// * `rng` - Random source for the per-stage shuffles
///
/// # Examples
///
/// ```
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use smartlist::sampler::{self, ClusterPool};
/// use smartlist::scoring::rank_tracks;
/// use smartlist::summary::top_songs;
/// use smartlist::track::Track;
/// use std::sync::Arc;
///
/// let plays = (0..40)
///     .map(|i| {
///         Arc::new(Track {
///             uri: format!("spotify:track:{i}"),
///             artist: format!("Artist {i}"),
///             title: format!("Song {i}"),
///             album: "Album".to_string(),
///             play_count: 10 + i,
///             minutes_listened: 30.0,
///             skip_count: 0,
///         })
///     })
///     .collect::<Vec<_>>();
/// let track_pool = rank_tracks(&plays);
/// let favorites = top_songs(&plays, 50);
/// let pool = ClusterPool { cluster_id: 0, top_songs: &favorites, track_pool: &track_pool };
///
/// let playlist = sampler::sample(&pool, 10.0, 30, &mut StdRng::seed_from_u64(7))?;
/// assert_eq!(playlist.len(), 30);
/// assert_eq!(playlist.shortfall(), 0);
/// # Ok::<(), smartlist::Error>(())
/// ```
///
/// # Errors
///
/// Returns [`Error::Configuration`] when `playlist_size` is 0 or
/// `min_popularity` is NaN.
pub fn sample<R: Rng + ?Sized>(
    pool: &ClusterPool<'_>,
    min_popularity: f64,
    playlist_size: usize,
    rng: &mut R,
) -> Result<Playlist> {
    let config = SamplerConfig {
        playlist_size,
        min_popularity,
        ..SamplerConfig::default()
    };
    Ok(PlaylistSampler::new(config)?.sample(pool, rng))
}
