//! # smartlist
//!
//! Clusters a listening history by weekday and time of day and samples
//! playlists that fit each listening habit.
//!
//! ## Usage
//!
//! ```bash
//! # Build clusters from a streaming-history export
//! smartlist build ~/Downloads/my_spotify_data
//!
//! # Browse them
//! smartlist clusters
//! smartlist summary 3
//!
//! # Sample a playlist
//! smartlist playlist 3 --min-popularity 10
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use smartlist::cli::{Args, Command};
use smartlist::config::Settings;
use smartlist::engine::{ClusterSnapshot, ClusterSummaryView, SmartList};
use smartlist::features;
use smartlist::history::{SessionSource, StreamingHistoryDir};
use smartlist::sampler::{Playlist, SamplerConfig};
use smartlist::{completion, db};
use std::path::PathBuf;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug smartlist build ...` - Enable debug logging
/// - `RUST_LOG=smartlist::sampler=debug smartlist playlist 3` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::Completion { shell } => {
            let mut cmd = Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
            Ok(())
        }
        Command::Build { history, clusters, seed } => {
            let settings = Settings::load(args.config.as_deref())?;
            build(&settings, args.db, history, clusters, seed)
        }
        Command::Clusters => {
            let settings = Settings::load(args.config.as_deref())?;
            let engine = open_engine(&settings, args.db)?;
            print_clusters(&engine.snapshot());
            Ok(())
        }
        Command::Summary { id } => {
            let settings = Settings::load(args.config.as_deref())?;
            let engine = open_engine(&settings, args.db)?;
            print_summary(&engine.get_cluster_summary(id)?);
            Ok(())
        }
        Command::Playlist { id, min_popularity, size, seed, json } => {
            let settings = Settings::load(args.config.as_deref())?;
            let engine = open_engine(&settings, args.db)?;

            let config = SamplerConfig {
                min_popularity: min_popularity.unwrap_or(settings.playlist.min_popularity),
                playlist_size: size.unwrap_or(settings.playlist.playlist_size),
                ..settings.playlist
            };
            let playlist = match seed {
                Some(seed) => engine.generate_playlist_with(id, config, &mut StdRng::seed_from_u64(seed))?,
                None => engine.generate_playlist_with(id, config, &mut rand::thread_rng())?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&playlist)?);
            } else {
                print_playlist(&engine, &playlist)?;
            }
            Ok(())
        }
    }
}

fn build(
    settings: &Settings,
    db_path: Option<PathBuf>,
    history: PathBuf,
    clusters: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let k = clusters.unwrap_or(settings.clustering.k);
    let mut kmeans = settings.clustering.kmeans;
    if let Some(seed) = seed {
        kmeans.seed = seed;
    }

    let engine = SmartList::with_kmeans(settings.engine_options(), kmeans)?;
    info!("Reading streaming history from {}", history.display());
    let log = StreamingHistoryDir::new(history).load()?;
    let snapshot = engine
        .build_clusters(&log, k)
        .context("Failed to build clusters")?;

    let db_path = resolve_db_path(settings, db_path)?;
    let mut conn = db::connect(&db_path)?;
    db::save_snapshot(&mut conn, &snapshot)?;

    let meta = snapshot.meta.as_ref();
    println!(
        "Built {} clusters from {} sessions over {} tracks",
        snapshot.clusters.len(),
        meta.map_or(0, |m| m.session_count),
        snapshot.catalog.len()
    );
    if let Some(meta) = meta {
        if meta.unresolved_sessions > 0 {
            println!("Skipped {} sessions with unknown tracks", meta.unresolved_sessions);
        }
        if !meta.converged {
            println!("Clustering stopped at the iteration cap before converging");
        }
    }
    println!("Silhouette score: {}", format_silhouette(snapshot.silhouette_score()));
    println!("Saved to {}", db_path.display());
    Ok(())
}

fn resolve_db_path(settings: &Settings, db_path: Option<PathBuf>) -> Result<PathBuf> {
    match db_path {
        Some(path) => Ok(path),
        None => settings.db_path(),
    }
}

/// Engine serving the stored snapshot.
fn open_engine(settings: &Settings, db_path: Option<PathBuf>) -> Result<SmartList> {
    let db_path = resolve_db_path(settings, db_path)?;
    debug!("Loading snapshot from {}", db_path.display());

    let options = settings.engine_options();
    let conn = db::connect(&db_path)?;
    let snapshot = db::load_snapshot(&conn, &options)?.ok_or_else(|| {
        anyhow::anyhow!("No clusters built yet. Run `smartlist build <history-dir>` first.")
    })?;

    let engine = SmartList::with_kmeans(options, settings.clustering.kmeans)?;
    engine.publish(snapshot);
    Ok(engine)
}

fn format_silhouette(score: Option<f64>) -> String {
    score.map_or_else(|| "undefined".to_string(), |s| format!("{s:.3}"))
}

fn print_clusters(snapshot: &ClusterSnapshot) {
    println!("Silhouette score: {}", format_silhouette(snapshot.silhouette_score()));

    for day in 0..features::DAYS_PER_WEEK {
        let weekday = features::weekday_from_index(day);
        let mut clusters = snapshot
            .clusters
            .iter()
            .filter(|c| c.summary.dominant_day == weekday)
            .collect::<Vec<_>>();
        if clusters.is_empty() {
            continue;
        }
        clusters.sort_by_key(|c| (c.summary.time_range.start, c.id));

        println!();
        println!("{}", features::day_name(weekday));
        for cluster in clusters {
            println!(
                "  [{:>3}] {:<11} {:<32} {:>5} sessions",
                cluster.id,
                cluster.summary.time_range.to_string(),
                cluster.summary.name,
                cluster.summary.session_count
            );
        }
    }
}

fn print_summary(view: &ClusterSummaryView) {
    println!("Cluster {}: {}", view.cluster_id, view.name);
    println!("  Day:        {}", features::day_name(view.dominant_day));
    println!("  Window:     {} ({})", view.time_range, view.time_of_day.label());
    println!("  Sessions:   {}", view.session_count);
    println!("  Tracks:     {}", view.track_count);
    println!("  Silhouette: {}", format_silhouette(view.silhouette_score));
    if let Some(scores) = &view.score_statistics {
        println!(
            "  Scores:     mean {:.1} (sd {:.1}), range {:.1} to {:.1}",
            scores.mean, scores.std_deviation, scores.min, scores.max
        );
    }

    println!("  Top artists:");
    for artist in view.top_artists.iter().take(3) {
        println!("    {} ({} plays)", artist.artist, artist.listens);
    }
    println!("  Top songs:");
    for song in view.top_songs.iter().take(3) {
        println!("    {} - {} ({} plays)", song.track.artist, song.track.title, song.listens);
    }
}

fn print_playlist(engine: &SmartList, playlist: &Playlist) -> Result<()> {
    let snapshot = engine.snapshot();
    let cluster = snapshot.cluster(playlist.cluster_id)?;
    println!("{} ({} tracks)", cluster.summary.name, playlist.len());

    for (i, entry) in playlist.entries.iter().enumerate() {
        println!(
            "  {:>2}. {} - {} (score: {:.2}, {})",
            i + 1,
            entry.track.artist,
            entry.track.title,
            entry.popularity_score,
            entry.stage
        );
    }

    for report in playlist.short_stages() {
        println!(
            "Note: {} found {} of {} tracks ({} candidates)",
            report.stage, report.drawn, report.quota, report.candidates
        );
    }
    Ok(())
}
