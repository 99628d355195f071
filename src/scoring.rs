//! Popularity scoring for tracks.
//!
//! The score is a fixed linear blend of how often and how long a track was
//! played, minus a penalty for skips:
//!
//! ```text
//! score(track) = 0.6 * play_count + 0.3 * minutes_listened - 0.1 * skip_count
//! ```
//!
//! Scores are not clamped; a heavily skipped track can go negative.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

pub const PLAY_WEIGHT: f64 = 0.6;
pub const MINUTES_WEIGHT: f64 = 0.3;
pub const SKIP_WEIGHT: f64 = 0.1;

/// Score one track.
///
/// # Examples
///
/// ```
/// use smartlist::scoring::popularity_score;
/// use smartlist::track::Track;
///
/// let track = Track {
///     uri: "spotify:track:x".to_string(),
///     artist: "Artist".to_string(),
///     title: "Song".to_string(),
///     album: "Album".to_string(),
///     play_count: 10,
///     minutes_listened: 30.0,
///     skip_count: 5,
/// };
///
/// assert!((popularity_score(&track) - 14.5).abs() < 1e-9);
/// ```
#[must_use]
pub fn popularity_score(track: &Track) -> f64 {
    PLAY_WEIGHT * f64::from(track.play_count) + MINUTES_WEIGHT * track.minutes_listened
        - SKIP_WEIGHT * f64::from(track.skip_count)
}

/// A track paired with its popularity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTrack {
    pub track: Arc<Track>,
    pub popularity_score: f64,
}

impl ScoredTrack {
    #[must_use]
    pub fn new(track: Arc<Track>) -> Self {
        let popularity_score = popularity_score(&track);
        Self {
            track,
            popularity_score,
        }
    }
}

/// Lazily score a batch of tracks.
#[must_use = "Iterator should be consumed to calculate scores"]
pub fn score_tracks<'a, I>(tracks: I) -> impl Iterator<Item = ScoredTrack> + 'a
where
    I: IntoIterator<Item = &'a Arc<Track>>,
    I::IntoIter: 'a,
{
    tracks.into_iter().map(|track| ScoredTrack::new(Arc::clone(track)))
}

/// Order used for every ranked pool: score descending, then uri ascending.
#[must_use]
pub fn rank_order(a: &ScoredTrack, b: &ScoredTrack) -> Ordering {
    b.popularity_score
        .partial_cmp(&a.popularity_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.track.uri.cmp(&b.track.uri))
}

/// Score and rank a cluster's tracks, best first.
///
/// The input is expected to hold each track once.
#[must_use]
pub fn rank_tracks<'a, I>(tracks: I) -> Vec<ScoredTrack>
where
    I: IntoIterator<Item = &'a Arc<Track>>,
    I::IntoIter: 'a,
{
    let mut ranked = score_tracks(tracks).collect::<Vec<_>>();
    ranked.sort_by(rank_order);
    ranked
}

/// Score distribution of a track pool, for diagnostics.
pub mod statistics {
    use super::ScoredTrack;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    pub struct ScoreStatistics {
        pub mean: f64,
        pub std_deviation: f64,
        pub min: f64,
        pub max: f64,
        pub count: usize,
    }

    /// Returns `None` for an empty pool.
    #[must_use]
    pub fn analyze_score_distribution(pool: &[ScoredTrack]) -> Option<ScoreStatistics> {
        if pool.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let n = pool.len() as f64;
        let scores = pool.iter().map(|s| s.popularity_score);
        let mean = scores.clone().sum::<f64>() / n;
        let variance = scores.clone().map(|score| (score - mean).powi(2)).sum::<f64>() / n;

        Some(ScoreStatistics {
            mean,
            std_deviation: variance.sqrt(),
            min: scores.clone().fold(f64::INFINITY, f64::min),
            max: scores.fold(f64::NEG_INFINITY, f64::max),
            count: pool.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::statistics::analyze_score_distribution;
    use super::*;
    use crate::track::tests::track;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_score_formula() {
        assert!((popularity_score(&track("a", "x", 10, 30.0, 5)) - 14.5).abs() < EPS);
        assert!(popularity_score(&track("b", "x", 0, 0.0, 0)).abs() < EPS);
        // Skips alone drive the score below zero.
        assert!((popularity_score(&track("c", "x", 0, 0.0, 20)) + 2.0).abs() < EPS);
    }

    #[test]
    fn test_score_is_monotonic() {
        let base = track("a", "x", 10, 30.0, 5);
        let score = popularity_score(&base);

        let more_plays = Track { play_count: 11, ..base.clone() };
        let more_minutes = Track { minutes_listened: 30.5, ..base.clone() };
        let more_skips = Track { skip_count: 6, ..base.clone() };

        assert!(popularity_score(&more_plays) > score);
        assert!(popularity_score(&more_minutes) > score);
        assert!(popularity_score(&more_skips) < score);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let t = track("a", "x", 7, 12.25, 3);
        assert_eq!(popularity_score(&t).to_bits(), popularity_score(&t).to_bits());
    }

    #[test]
    fn test_rank_tracks_orders_by_score_then_uri() {
        let tracks = vec![
            Arc::new(track("c", "x", 1, 0.0, 0)),
            Arc::new(track("b", "x", 5, 0.0, 0)),
            Arc::new(track("a", "x", 1, 0.0, 0)),
            Arc::new(track("d", "x", 0, 0.0, 3)),
        ];

        let ranked = rank_tracks(&tracks);
        let uris = ranked.iter().map(|s| s.track.uri.as_str()).collect::<Vec<_>>();
        assert_eq!(uris, ["b", "a", "c", "d"]);
        assert!(ranked.windows(2).all(|w| w[0].popularity_score >= w[1].popularity_score));
    }

    #[test]
    fn test_batch_matches_individual() {
        let tracks = (0..50)
            .map(|i| Arc::new(track(&format!("t{i}"), "x", i, f64::from(i) * 1.5, i % 7)))
            .collect::<Vec<_>>();

        for scored in score_tracks(&tracks) {
            assert_eq!(scored.popularity_score, popularity_score(&scored.track));
            assert!(scored.popularity_score.is_finite());
        }
    }

    #[test]
    fn test_statistics() {
        assert!(analyze_score_distribution(&[]).is_none());

        let tracks = vec![
            Arc::new(track("a", "x", 10, 0.0, 0)),
            Arc::new(track("b", "x", 0, 0.0, 0)),
        ];
        let stats = analyze_score_distribution(&rank_tracks(&tracks)).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.mean - 3.0).abs() < EPS);
        assert!((stats.std_deviation - 3.0).abs() < EPS);
        assert!((stats.max - 6.0).abs() < EPS);
        assert!(stats.min.abs() < EPS);
    }
}
