//! # smartlist Performance Benchmarks
//!
//! ## Benchmark Categories
//!
//! - **Features**: Timestamp encoding
//! - **Clustering**: k-means fitting and silhouette scoring
//! - **Scoring**: Ranking track pools
//! - **Sampling**: Playlist generation from a built snapshot
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench clustering
//! ```

use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smartlist::clustering::{self, ClusterFitter, KMeansConfig, KMeansFitter};
use smartlist::engine::{EngineOptions, SmartList};
use smartlist::features::{self, FeatureVector};
use smartlist::scoring;
use smartlist::track::{ListeningLog, PlayEvent, Track};
use std::hint::black_box;
use std::sync::Arc;

fn create_tracks(count: usize) -> Vec<Track> {
    (0..count)
        .map(|i| Track {
            uri: format!("spotify:track:{i:05}"),
            artist: format!("Artist {}", i / 3),
            title: format!("Song {i:05}"),
            album: format!("Album {}", i / 10),
            play_count: (i % 97) as u32,
            minutes_listened: (i % 211) as f64 * 0.75,
            skip_count: (i % 13) as u32,
        })
        .collect()
}

/// Random plays over a year, biased towards a few daily habits.
fn create_log(tracks: usize, events: usize) -> ListeningLog {
    let mut rng = StdRng::seed_from_u64(7);
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    let habits: [(i64, i64); 3] = [(8 * 60, 40), (13 * 60, 60), (21 * 60, 90)];

    let tracks = create_tracks(tracks);
    let events = (0..events)
        .map(|_| {
            let (center, spread) = habits[rng.gen_range(0..habits.len())];
            let minute = center + rng.gen_range(-spread..=spread);
            let played_at = start + Duration::days(rng.gen_range(0..365)) + Duration::minutes(minute);
            PlayEvent {
                track_uri: tracks[rng.gen_range(0..tracks.len())].uri.clone(),
                played_at,
            }
        })
        .collect();

    ListeningLog { tracks, events }
}

fn random_points(count: usize) -> Vec<FeatureVector> {
    let mut rng = StdRng::seed_from_u64(3);
    (0..count)
        .map(|_| FeatureVector::from_parts(rng.gen_range(0..7), rng.gen_range(0..1440)))
        .collect()
}

fn benchmark_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("features");
    let at = Utc.with_ymd_and_hms(2024, 5, 17, 18, 45, 0).unwrap();
    let zone = chrono_tz::America::New_York;

    group.bench_function("transform", |b| {
        b.iter(|| features::transform(&features::to_local(black_box(&at), zone)))
    });
    group.finish();
}

fn benchmark_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    group.sample_size(10);

    let fitter = KMeansFitter::new(KMeansConfig::default());
    for size in [1_000, 10_000] {
        let points = random_points(size);
        group.bench_with_input(BenchmarkId::new("kmeans_k50", size), &points, |b, points| {
            b.iter(|| fitter.fit(black_box(points), 50))
        });
    }

    let points = random_points(10_000);
    let fitted = fitter.fit(&points, 50).expect("fit");
    group.bench_function("silhouette_10000", |b| {
        b.iter(|| clustering::silhouette_score(black_box(&points), &fitted.assignments, 50))
    });
    group.finish();
}

fn benchmark_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    for size in [100, 1_000, 10_000] {
        let tracks = create_tracks(size).into_iter().map(Arc::new).collect::<Vec<_>>();
        group.bench_with_input(BenchmarkId::new("rank_tracks", size), &tracks, |b, tracks| {
            b.iter(|| scoring::rank_tracks(black_box(tracks)))
        });
    }
    group.finish();
}

fn benchmark_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampling");

    let engine = SmartList::with_kmeans(EngineOptions::default(), KMeansConfig::default()).expect("engine");
    let snapshot = engine.build_clusters(&create_log(2_000, 20_000), 20).expect("build");
    let largest = snapshot
        .clusters
        .iter()
        .max_by_key(|c| c.sessions.len())
        .map_or(0, |c| c.id);

    let mut rng = StdRng::seed_from_u64(11);
    group.bench_function("generate_playlist", |b| {
        b.iter(|| engine.generate_playlist(black_box(largest), 10.0, &mut rng))
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_features,
    benchmark_clustering,
    benchmark_scoring,
    benchmark_sampling
);
criterion_main!(benches);
