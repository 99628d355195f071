//! The engine behind every entry point: builds cluster snapshots and serves
//! summaries and playlists from the current one.
//!
//! A snapshot is immutable once built. It is published through an
//! `RwLock<Arc<_>>`, so a playlist request holds whichever snapshot was
//! current when it started, never a half-built one.
//!
//! ## Lifecycle
//!
//! 1. [`SmartList::build_clusters`] resolves plays against the track
//!    catalog, places each session in feature space in the listener's time
//!    zone, and fits `k` clusters.
//! 2. [`assemble_snapshot`] groups sessions per cluster and derives summaries,
//!    ranked track pools and top lists, one cluster per rayon task.
//! 3. Readers call [`SmartList::get_cluster_summary`] and
//!    [`SmartList::generate_playlist`] against the published snapshot.
//!
//! A stored snapshot goes through step 2 again on load, so summaries always
//! reflect the current settings.

use crate::clustering::{self, ClusterFitter, Clustering, KMeansConfig, KMeansFitter};
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::sampler::{ClusterPool, Playlist, PlaylistSampler, SamplerConfig};
use crate::scoring::statistics::{self, ScoreStatistics};
use crate::scoring::{self, ScoredTrack};
use crate::summary::{self, ArtistCount, ClusterSummary, SongCount, TimeOfDay, TimeOfDayBoundaries, TimeRange};
use crate::track::{ListeningLog, Session, TrackCatalog};
use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;
use log::{debug, info};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_TOP_SONGS: usize = 50;
pub const DEFAULT_TOP_ARTISTS: usize = 5;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// Knobs that shape a snapshot and the playlists drawn from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Listener's time zone; weekday and time of day are read in it.
    pub timezone: Tz,
    pub boundaries: TimeOfDayBoundaries,
    pub sampler: SamplerConfig,
    pub top_songs: usize,
    pub top_artists: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            boundaries: TimeOfDayBoundaries::default(),
            sampler: SamplerConfig::default(),
            top_songs: DEFAULT_TOP_SONGS,
            top_artists: DEFAULT_TOP_ARTISTS,
        }
    }
}

/// Run-level facts about a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub k: usize,
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
    /// `None` when fewer than two clusters are populated.
    pub silhouette_score: Option<f64>,
    pub session_count: usize,
    /// Sessions dropped because their track is unknown.
    pub unresolved_sessions: usize,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: usize,
    pub centroid: FeatureVector,
    pub summary: ClusterSummary,
    pub sessions: Vec<Session>,
    /// Every distinct track played in this cluster, best score first.
    pub track_pool: Vec<ScoredTrack>,
    pub top_songs: Vec<SongCount>,
    pub top_artists: Vec<ArtistCount>,
}

impl Cluster {
    #[must_use]
    pub fn pool(&self) -> ClusterPool<'_> {
        ClusterPool {
            cluster_id: self.id,
            top_songs: &self.top_songs,
            track_pool: &self.track_pool,
        }
    }
}

/// One clustering run and everything derived from it.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub clusters: Vec<Cluster>,
    pub catalog: TrackCatalog,
    pub meta: Option<SnapshotMeta>,
}

impl ClusterSnapshot {
    /// The snapshot served before anything was built.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            clusters: Vec::new(),
            catalog: TrackCatalog::default(),
            meta: None,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::UnknownCluster`] for an id outside this snapshot.
    pub fn cluster(&self, cluster_id: usize) -> Result<&Cluster> {
        self.clusters
            .get(cluster_id)
            .ok_or(Error::UnknownCluster(cluster_id))
    }

    #[must_use]
    pub fn silhouette_score(&self) -> Option<f64> {
        self.meta.as_ref().and_then(|meta| meta.silhouette_score)
    }

    /// Every session with its cluster id, in cluster order.
    pub fn assignments(&self) -> impl Iterator<Item = (&Session, usize)> {
        self.clusters
            .iter()
            .flat_map(|cluster| cluster.sessions.iter().map(move |session| (session, cluster.id)))
    }
}

/// Display-ready view of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummaryView {
    pub cluster_id: usize,
    pub dominant_day: Weekday,
    pub time_range: TimeRange,
    pub time_of_day: TimeOfDay,
    pub name: String,
    pub session_count: usize,
    pub track_count: usize,
    pub silhouette_score: Option<f64>,
    /// Popularity scores of the cluster's track pool; `None` when it is empty.
    pub score_statistics: Option<ScoreStatistics>,
    pub top_artists: Vec<ArtistCount>,
    pub top_songs: Vec<SongCount>,
}

/// Group sessions by cluster and derive summaries and ranked pools.
///
/// `assignments[i]` is the cluster of `sessions[i]`; every id must be below
/// `centroids.len()`.
#[must_use]
pub fn assemble_snapshot(
    catalog: TrackCatalog,
    sessions: Vec<Session>,
    assignments: &[usize],
    centroids: &[FeatureVector],
    meta: SnapshotMeta,
    options: &EngineOptions,
) -> ClusterSnapshot {
    let mut grouped: Vec<Vec<Session>> = vec![Vec::new(); centroids.len()];
    for (session, &cluster) in sessions.into_iter().zip(assignments) {
        if let Some(members) = grouped.get_mut(cluster) {
            members.push(session);
        }
    }

    let clusters = grouped
        .into_par_iter()
        .zip(centroids.par_iter())
        .enumerate()
        .map(|(id, (members, centroid))| build_cluster(id, *centroid, members, &catalog, options))
        .collect::<Vec<_>>();

    ClusterSnapshot {
        clusters,
        catalog,
        meta: Some(meta),
    }
}

fn build_cluster(
    id: usize,
    centroid: FeatureVector,
    sessions: Vec<Session>,
    catalog: &TrackCatalog,
    options: &EngineOptions,
) -> Cluster {
    let points = sessions.iter().map(|s| s.features).collect::<Vec<_>>();
    let summary = summary::summarize(id, &points, &options.boundaries);

    let plays = sessions
        .iter()
        .filter_map(|session| catalog.get(&session.track_uri).cloned())
        .collect::<Vec<_>>();

    let mut seen = HashSet::new();
    let distinct = plays.iter().filter(|&track| seen.insert(track.uri.as_str()));
    let track_pool = scoring::rank_tracks(distinct);

    let top_songs = summary::top_songs(&plays, options.top_songs);
    let top_artists = summary::top_artists(&plays, options.top_artists);

    debug!(
        "Cluster {id} \"{}\": {} sessions, {} tracks",
        summary.name,
        sessions.len(),
        track_pool.len()
    );

    Cluster {
        id,
        centroid,
        summary,
        sessions,
        track_pool,
        top_songs,
        top_artists,
    }
}

/// Clusters listening history and serves playlists from the result.
pub struct SmartList {
    options: EngineOptions,
    fitter: Box<dyn ClusterFitter>,
    current: RwLock<Arc<ClusterSnapshot>>,
}

impl std::fmt::Debug for SmartList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartList")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SmartList {
    pub fn new(options: EngineOptions, fitter: impl ClusterFitter + 'static) -> Self {
        Self {
            options,
            fitter: Box::new(fitter),
            current: RwLock::new(Arc::new(ClusterSnapshot::empty())),
        }
    }

    /// Engine backed by k-means.
    ///
    /// # Errors
    ///
    /// Fails if the k-means or sampler configuration is invalid.
    pub fn with_kmeans(options: EngineOptions, config: KMeansConfig) -> Result<Self> {
        config.validate()?;
        options.boundaries.validate()?;
        options.sampler.validate()?;
        Ok(Self::new(options, KMeansFitter::new(config)))
    }

    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The snapshot currently being served.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ClusterSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the served snapshot.
    pub fn publish(&self, snapshot: ClusterSnapshot) -> Arc<ClusterSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::clone(&snapshot);
        snapshot
    }

    /// Cluster a listening log into `k` groups and publish the result.
    ///
    /// # Arguments
    ///
    /// * `log` - Track aggregates and raw plays; plays of unknown tracks are
    ///   skipped and counted in [`SnapshotMeta::unresolved_sessions`]
    /// * `k` - Number of clusters, at most the number of distinct session times
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<ClusterSnapshot>)` - The new snapshot, already being served
    /// * `Err(Error)` - The previous snapshot stays in place
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use smartlist::clustering::KMeansConfig;
    /// use smartlist::engine::{EngineOptions, SmartList};
    /// use smartlist::history::{SessionSource, StreamingHistoryDir};
    ///
    /// let engine = SmartList::with_kmeans(EngineOptions::default(), KMeansConfig::default())?;
    /// let log = StreamingHistoryDir::new("my_spotify_data").load()?;
    /// let snapshot = engine.build_clusters(&log, 50)?;
    /// for cluster in &snapshot.clusters {
    ///     println!("{}: {}", cluster.id, cluster.summary.name);
    /// }
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on an invalid track record, or when `k` is 0 or exceeds the
    /// number of distinct session times.
    pub fn build_clusters(&self, log: &ListeningLog, k: usize) -> Result<Arc<ClusterSnapshot>> {
        let catalog = TrackCatalog::new(log.tracks.iter().cloned())?;
        let (sessions, report) = catalog.resolve(&log.events, self.options.timezone);
        let points = sessions.iter().map(|s| s.features).collect::<Vec<_>>();

        info!(
            "Clustering {} sessions over {} tracks into {k} clusters",
            sessions.len(),
            catalog.len()
        );
        let Clustering {
            assignments,
            centroids,
            inertia,
            iterations,
            converged,
        } = self.fitter.fit(&points, k)?;
        let silhouette_score = clustering::silhouette_score(&points, &assignments, k);

        let meta = SnapshotMeta {
            k,
            inertia,
            iterations,
            converged,
            silhouette_score,
            session_count: sessions.len(),
            unresolved_sessions: report.unresolved,
            built_at: Utc::now(),
        };
        let snapshot = assemble_snapshot(catalog, sessions, &assignments, &centroids, meta, &self.options);

        match snapshot.silhouette_score() {
            Some(score) => info!("Built {k} clusters, silhouette score {score:.3}"),
            None => info!("Built {k} clusters, silhouette score undefined"),
        }
        Ok(self.publish(snapshot))
    }

    /// # Errors
    ///
    /// Returns [`Error::UnknownCluster`] if the id is not in the current
    /// snapshot.
    pub fn get_cluster_summary(&self, cluster_id: usize) -> Result<ClusterSummaryView> {
        let snapshot = self.snapshot();
        let cluster = snapshot.cluster(cluster_id)?;
        let summary = &cluster.summary;

        Ok(ClusterSummaryView {
            cluster_id,
            dominant_day: summary.dominant_day,
            time_range: summary.time_range,
            time_of_day: summary.time_of_day,
            name: summary.name.clone(),
            session_count: summary.session_count,
            track_count: cluster.track_pool.len(),
            silhouette_score: snapshot.silhouette_score(),
            score_statistics: statistics::analyze_score_distribution(&cluster.track_pool),
            top_artists: cluster.top_artists.clone(),
            top_songs: cluster.top_songs.clone(),
        })
    }

    /// Draw a playlist with the configured size.
    ///
    /// # Arguments
    ///
    /// * `cluster_id` - Id of a cluster in the current snapshot
    /// * `min_popularity` - Score floor of the contextual fill stage
    /// * `rng` - Random source; pass `thread_rng()` for a fresh draw each time
    ///
    /// # Returns
    ///
    /// * `Ok(Playlist)` - Unique tracks with one report per stage
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use smartlist::clustering::KMeansConfig;
    /// # use smartlist::engine::{EngineOptions, SmartList};
    /// # let engine = SmartList::with_kmeans(EngineOptions::default(), KMeansConfig::default())?;
    /// let playlist = engine.generate_playlist(3, 10.0, &mut rand::thread_rng())?;
    /// for report in playlist.short_stages() {
    ///     println!("{} came up {} short", report.stage, report.shortfall());
    /// }
    /// # Ok::<(), smartlist::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCluster`] for an unknown id and
    /// [`Error::Configuration`] for a NaN `min_popularity`.
    pub fn generate_playlist<R: Rng + ?Sized>(
        &self,
        cluster_id: usize,
        min_popularity: f64,
        rng: &mut R,
    ) -> Result<Playlist> {
        let config = SamplerConfig {
            min_popularity,
            ..self.options.sampler
        };
        self.generate_playlist_with(cluster_id, config, rng)
    }

    /// Draw a playlist with an explicit sampler configuration.
    ///
    /// # Errors
    ///
    /// Same as [`SmartList::generate_playlist`], plus any invalid
    /// configuration value.
    pub fn generate_playlist_with<R: Rng + ?Sized>(
        &self,
        cluster_id: usize,
        config: SamplerConfig,
        rng: &mut R,
    ) -> Result<Playlist> {
        let sampler = PlaylistSampler::new(config)?;
        let snapshot = self.snapshot();
        let cluster = snapshot.cluster(cluster_id)?;

        let playlist = sampler.sample(&cluster.pool(), rng);
        info!(
            "Generated {} track playlist for cluster {cluster_id} \"{}\"",
            playlist.len(),
            cluster.summary.name
        );
        Ok(playlist)
    }
}
